//! Survey access decisions.

use crate::model::account::Viewer;
use crate::model::survey::Survey;
use std::fmt::{Display, Formatter};

/// Why access was refused. Callers map this to 401 / 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// An organization-restricted survey was requested anonymously.
    Unauthenticated,
    /// The viewer is authenticated but outside the survey's organization.
    Forbidden,
}

impl DenialReason {
    /// Stable message used in error payloads.
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Authentication required for this survey",
            Self::Forbidden => "You don't have access to this survey",
        }
    }
}

impl Display for DenialReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Decides whether `viewer` may view or submit to `survey`.
///
/// Unrestricted surveys are open to everyone, including anonymous viewers.
/// Restricted surveys need an authenticated viewer whose profile
/// organization equals the survey organization; a survey without an
/// organization therefore admits nobody.
pub fn can_access(viewer: &Viewer, survey: &Survey) -> AccessDecision {
    if !survey.requires_organization {
        return AccessDecision::Granted;
    }

    let Some(user) = viewer.authenticated() else {
        return AccessDecision::Denied(DenialReason::Unauthenticated);
    };

    match (user.organization_id, survey.organization_id) {
        (Some(member_of), Some(scoped_to)) if member_of == scoped_to => AccessDecision::Granted,
        _ => AccessDecision::Denied(DenialReason::Forbidden),
    }
}

/// Returns whether `viewer` is the survey creator or staff.
pub fn can_manage(viewer: &Viewer, survey: &Survey) -> bool {
    viewer
        .authenticated()
        .is_some_and(|user| user.is_staff || user.user_id == survey.creator_id)
}

#[cfg(test)]
mod tests {
    use super::{can_access, can_manage, AccessDecision, DenialReason};
    use crate::model::account::{AuthenticatedUser, Viewer};
    use crate::model::survey::Survey;

    fn survey(requires_organization: bool, organization_id: Option<i64>) -> Survey {
        Survey {
            id: 1,
            title: "Offsite".to_string(),
            description: String::new(),
            creator_id: 10,
            organization_id,
            is_active: true,
            requires_organization,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn member(user_id: i64, organization_id: Option<i64>) -> Viewer {
        Viewer::User(AuthenticatedUser {
            user_id,
            is_staff: false,
            organization_id,
        })
    }

    #[test]
    fn unrestricted_survey_admits_anonymous_viewer() {
        assert_eq!(
            can_access(&Viewer::Anonymous, &survey(false, Some(3))),
            AccessDecision::Granted
        );
    }

    #[test]
    fn restricted_survey_rejects_anonymous_as_unauthenticated() {
        assert_eq!(
            can_access(&Viewer::Anonymous, &survey(true, Some(3))),
            AccessDecision::Denied(DenialReason::Unauthenticated)
        );
    }

    #[test]
    fn restricted_survey_requires_matching_membership() {
        let restricted = survey(true, Some(3));
        assert_eq!(
            can_access(&member(2, Some(3)), &restricted),
            AccessDecision::Granted
        );
        assert_eq!(
            can_access(&member(2, Some(4)), &restricted),
            AccessDecision::Denied(DenialReason::Forbidden)
        );
        assert_eq!(
            can_access(&member(2, None), &restricted),
            AccessDecision::Denied(DenialReason::Forbidden)
        );
    }

    #[test]
    fn restricted_survey_without_organization_admits_nobody() {
        assert_eq!(
            can_access(&member(2, None), &survey(true, None)),
            AccessDecision::Denied(DenialReason::Forbidden)
        );
    }

    #[test]
    fn staff_flag_does_not_bypass_membership() {
        let staff = Viewer::User(AuthenticatedUser {
            user_id: 99,
            is_staff: true,
            organization_id: None,
        });
        assert!(!can_access(&staff, &survey(true, Some(3))).is_granted());
        assert!(can_manage(&staff, &survey(true, Some(3))));
    }

    #[test]
    fn only_creator_or_staff_can_manage() {
        let restricted = survey(false, None);
        assert!(can_manage(&member(10, None), &restricted));
        assert!(!can_manage(&member(11, None), &restricted));
        assert!(!can_manage(&Viewer::Anonymous, &restricted));
    }
}
