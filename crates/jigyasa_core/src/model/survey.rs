//! Survey catalog and response domain model.
//!
//! # Responsibility
//! - Define surveys, questions, choices, responses and answers.
//! - Define the draft payloads used to create or replace a survey.
//! - Define the immutable submission record persisted by the response
//!   workflow.
//!
//! # Invariants
//! - A question belongs to exactly one survey; a choice to exactly one
//!   question.
//! - Only choice-type questions carry choices.
//! - An answer holds either text or selected choices, never both.

use crate::model::account::{OrganizationId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SurveyId = i64;
pub type QuestionId = i64;
pub type ChoiceId = i64;
pub type ResponseId = i64;
pub type AnswerId = i64;

/// Question type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Free-text answer.
    Text,
    /// Exactly one choice is expected by clients; storage accepts a set.
    SingleChoice,
    /// Any number of choices.
    MultipleChoice,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::SingleChoice => "single_choice",
            Self::MultipleChoice => "multiple_choice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "single_choice" => Some(Self::SingleChoice),
            "multiple_choice" => Some(Self::MultipleChoice),
            _ => None,
        }
    }

    /// Returns whether answers are expressed as selected choices.
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

/// Survey header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Survey {
    pub id: SurveyId,
    pub title: String,
    pub description: String,
    pub creator_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub is_active: bool,
    pub requires_organization: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub id: ChoiceId,
    #[serde(skip)]
    pub question_id: QuestionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(skip)]
    pub survey_id: SurveyId,
    pub text: String,
    pub question_type: QuestionType,
    pub required: bool,
    /// Insertion order.
    pub choices: Vec<Choice>,
}

impl Question {
    pub fn has_choice(&self, choice_id: ChoiceId) -> bool {
        self.choices.iter().any(|choice| choice.id == choice_id)
    }
}

/// Survey with its questions and choices eagerly loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyDetail {
    pub survey: Survey,
    /// Insertion order.
    pub questions: Vec<Question>,
}

impl SurveyDetail {
    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions
            .iter()
            .find(|question| question.id == question_id)
    }

    /// Required question ids in creation order.
    pub fn required_question_ids(&self) -> Vec<QuestionId> {
        self.questions
            .iter()
            .filter(|question| question.required)
            .map(|question| question.id)
            .collect()
    }
}

/// Survey create/replace payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SurveyDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub requires_organization: bool,
    #[serde(default, alias = "organization")]
    pub organization_id: Option<OrganizationId>,
    /// `None` on replace keeps the current question set.
    #[serde(default)]
    pub questions: Option<Vec<QuestionDraft>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<ChoiceDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChoiceDraft {
    pub text: String,
}

fn default_true() -> bool {
    true
}

impl SurveyDraft {
    /// Validates the draft header and every question draft.
    pub fn validate(&self) -> Result<(), SurveyValidationError> {
        if self.title.trim().is_empty() {
            return Err(SurveyValidationError::EmptyTitle);
        }
        if self.requires_organization && self.organization_id.is_none() {
            return Err(SurveyValidationError::MissingOrganization);
        }
        for (index, question) in self.questions.iter().flatten().enumerate() {
            question.validate(index)?;
        }
        Ok(())
    }
}

impl QuestionDraft {
    fn validate(&self, index: usize) -> Result<(), SurveyValidationError> {
        if self.text.trim().is_empty() {
            return Err(SurveyValidationError::EmptyQuestionText { index });
        }
        if self.question_type.is_choice() {
            if self.choices.is_empty() {
                return Err(SurveyValidationError::MissingChoices { index });
            }
            if self.choices.iter().any(|choice| choice.text.trim().is_empty()) {
                return Err(SurveyValidationError::EmptyChoiceText { index });
            }
        } else if !self.choices.is_empty() {
            return Err(SurveyValidationError::UnexpectedChoices { index });
        }
        Ok(())
    }
}

/// Partial survey update. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SurveyPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub requires_organization: Option<bool>,
    #[serde(
        default,
        alias = "organization",
        deserialize_with = "super::explicit_null"
    )]
    pub organization_id: Option<Option<OrganizationId>>,
}

impl SurveyPatch {
    /// Applies the patch onto a survey header copy.
    pub fn apply_to(&self, survey: &Survey) -> Survey {
        let mut patched = survey.clone();
        if let Some(title) = self.title.as_ref() {
            patched.title = title.clone();
        }
        if let Some(description) = self.description.as_ref() {
            patched.description = description.clone();
        }
        if let Some(is_active) = self.is_active {
            patched.is_active = is_active;
        }
        if let Some(requires_organization) = self.requires_organization {
            patched.requires_organization = requires_organization;
        }
        if let Some(organization_id) = self.organization_id {
            patched.organization_id = organization_id;
        }
        patched
    }
}

/// Survey draft validation errors. `index` is the zero-based question index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyValidationError {
    EmptyTitle,
    MissingOrganization,
    EmptyQuestionText { index: usize },
    MissingChoices { index: usize },
    EmptyChoiceText { index: usize },
    UnexpectedChoices { index: usize },
}

impl Display for SurveyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "survey title must not be empty"),
            Self::MissingOrganization => write!(
                f,
                "an organization is required when requires_organization is set"
            ),
            Self::EmptyQuestionText { index } => {
                write!(f, "question {} text must not be empty", index + 1)
            }
            Self::MissingChoices { index } => {
                write!(f, "question {} needs at least one choice", index + 1)
            }
            Self::EmptyChoiceText { index } => {
                write!(f, "question {} has a choice with empty text", index + 1)
            }
            Self::UnexpectedChoices { index } => {
                write!(f, "question {} is a text question and cannot have choices", index + 1)
            }
        }
    }
}

impl Error for SurveyValidationError {}

/// One answer entry as supplied by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerInput {
    #[serde(alias = "question_id")]
    pub question: QuestionId,
    #[serde(default)]
    pub text_answer: Option<String>,
    #[serde(default, alias = "selected_choice_ids")]
    pub selected_choices: Option<Vec<ChoiceId>>,
}

impl AnswerInput {
    pub fn text(question: QuestionId, text: impl Into<String>) -> Self {
        Self {
            question,
            text_answer: Some(text.into()),
            selected_choices: None,
        }
    }

    pub fn choices(question: QuestionId, choices: Vec<ChoiceId>) -> Self {
        Self {
            question,
            text_answer: None,
            selected_choices: Some(choices),
        }
    }

    pub(crate) fn selected(&self) -> &[ChoiceId] {
        self.selected_choices.as_deref().unwrap_or(&[])
    }
}

/// Submission payload for `POST /survey-responses/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmissionPayload {
    #[serde(alias = "survey_id")]
    pub survey: SurveyId,
    #[serde(default)]
    pub answers: Vec<AnswerInput>,
}

/// Answer content normalized by question type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerContent {
    Text(Option<String>),
    Choices(Vec<ChoiceId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub question_id: QuestionId,
    pub content: AnswerContent,
}

/// Immutable submission record built from validated answers and trusted
/// request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    survey_id: SurveyId,
    respondent_id: Option<UserId>,
    answers: Vec<NewAnswer>,
}

impl NewSubmission {
    pub fn new(survey_id: SurveyId, respondent_id: Option<UserId>, answers: Vec<NewAnswer>) -> Self {
        Self {
            survey_id,
            respondent_id,
            answers,
        }
    }

    /// Normalizes client answers against the survey's question types.
    ///
    /// Text questions keep only text, choice questions keep only the
    /// deduplicated selection in client order. Entries whose question is not
    /// part of `survey` are skipped; callers validate before building.
    pub fn from_answers(
        survey: &SurveyDetail,
        respondent_id: Option<UserId>,
        answers: &[AnswerInput],
    ) -> Self {
        let answers = answers
            .iter()
            .filter_map(|input| {
                let question = survey.question(input.question)?;
                let content = if question.question_type.is_choice() {
                    let mut seen = BTreeSet::new();
                    AnswerContent::Choices(
                        input
                            .selected()
                            .iter()
                            .copied()
                            .filter(|choice_id| seen.insert(*choice_id))
                            .collect(),
                    )
                } else {
                    AnswerContent::Text(input.text_answer.clone())
                };
                Some(NewAnswer {
                    question_id: question.id,
                    content,
                })
            })
            .collect();

        Self::new(survey.survey.id, respondent_id, answers)
    }

    pub fn survey_id(&self) -> SurveyId {
        self.survey_id
    }

    pub fn respondent_id(&self) -> Option<UserId> {
        self.respondent_id
    }

    pub fn answers(&self) -> &[NewAnswer] {
        &self.answers
    }
}

/// Persisted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub id: AnswerId,
    #[serde(rename = "question")]
    pub question_id: QuestionId,
    pub text_answer: Option<String>,
    pub selected_choices: Vec<ChoiceId>,
}

/// Persisted response with its answers in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyResponse {
    pub id: ResponseId,
    #[serde(rename = "survey")]
    pub survey_id: SurveyId,
    #[serde(rename = "respondent")]
    pub respondent_id: Option<UserId>,
    pub submitted_at: i64,
    pub answers: Vec<Answer>,
}
