//! Two-pass validation of proposed survey answers.
//!
//! # Responsibility
//! - Report every missing required question at once.
//! - Check answer content of required questions against their type.
//! - Reject structurally invalid payloads (foreign questions or choices)
//!   before any field-level reporting.
//!
//! # Invariants
//! - Pure: no storage access, input is never mutated.
//! - Error keys are `question_{id}`; the first message per question wins.

use crate::model::survey::{AnswerInput, ChoiceId, QuestionId, QuestionType, SurveyDetail};
use crate::service::error::FieldErrors;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MSG_REQUIRED: &str = "This field is required";
pub const MSG_TEXT_MISSING: &str = "Please provide an answer";
pub const MSG_CHOICE_MISSING: &str = "Please select at least one choice";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(FieldErrors),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Structural payload errors. These are not field messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAbort {
    /// Answer references a question outside the survey.
    ForeignQuestion(QuestionId),
    /// Selection references a choice outside the answered question.
    ForeignChoice {
        question_id: QuestionId,
        choice_id: ChoiceId,
    },
}

impl Display for ValidationAbort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForeignQuestion(question_id) => {
                write!(f, "question {question_id} does not belong to this survey")
            }
            Self::ForeignChoice {
                question_id,
                choice_id,
            } => write!(
                f,
                "choice {choice_id} does not belong to question {question_id}"
            ),
        }
    }
}

impl Error for ValidationAbort {}

pub fn field_key(question_id: QuestionId) -> String {
    format!("question_{question_id}")
}

/// Validates `answers` against `survey`.
pub fn validate(
    survey: &SurveyDetail,
    answers: &[AnswerInput],
) -> Result<ValidationOutcome, ValidationAbort> {
    let mut errors = FieldErrors::new();

    let answered: BTreeSet<QuestionId> = answers.iter().map(|answer| answer.question).collect();
    for question_id in survey.required_question_ids() {
        if !answered.contains(&question_id) {
            errors.insert(field_key(question_id), MSG_REQUIRED.to_string());
        }
    }

    for answer in answers {
        let question = survey
            .question(answer.question)
            .ok_or(ValidationAbort::ForeignQuestion(answer.question))?;

        if question.question_type.is_choice() {
            if let Some(choice_id) = answer
                .selected()
                .iter()
                .copied()
                .find(|choice_id| !question.has_choice(*choice_id))
            {
                return Err(ValidationAbort::ForeignChoice {
                    question_id: question.id,
                    choice_id,
                });
            }
        }

        if !question.required {
            continue;
        }
        let problem = match question.question_type {
            QuestionType::Text => {
                let blank = answer
                    .text_answer
                    .as_deref()
                    .map_or(true, |text| text.trim().is_empty());
                blank.then_some(MSG_TEXT_MISSING)
            }
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                answer.selected().is_empty().then_some(MSG_CHOICE_MISSING)
            }
        };
        if let Some(message) = problem {
            errors
                .entry(field_key(question.id))
                .or_insert_with(|| message.to_string());
        }
    }

    if errors.is_empty() {
        Ok(ValidationOutcome::Accepted)
    } else {
        Ok(ValidationOutcome::Rejected(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        validate, ValidationAbort, ValidationOutcome, MSG_CHOICE_MISSING, MSG_REQUIRED,
        MSG_TEXT_MISSING,
    };
    use crate::model::survey::{
        AnswerInput, Choice, Question, QuestionType, Survey, SurveyDetail,
    };

    fn question(id: i64, question_type: QuestionType, required: bool, choices: &[i64]) -> Question {
        Question {
            id,
            survey_id: 1,
            text: format!("Q{id}"),
            question_type,
            required,
            choices: choices
                .iter()
                .map(|choice_id| Choice {
                    id: *choice_id,
                    question_id: id,
                    text: format!("C{choice_id}"),
                })
                .collect(),
        }
    }

    fn survey(questions: Vec<Question>) -> SurveyDetail {
        SurveyDetail {
            survey: Survey {
                id: 1,
                title: "Pulse".to_string(),
                description: String::new(),
                creator_id: 1,
                organization_id: None,
                is_active: true,
                requires_organization: false,
                created_at: 0,
                updated_at: 0,
            },
            questions,
        }
    }

    fn rejected(outcome: ValidationOutcome) -> Vec<(String, String)> {
        match outcome {
            ValidationOutcome::Rejected(errors) => errors.into_iter().collect(),
            ValidationOutcome::Accepted => panic!("expected rejection"),
        }
    }

    #[test]
    fn accepts_complete_answers() {
        let survey = survey(vec![
            question(1, QuestionType::Text, true, &[]),
            question(2, QuestionType::SingleChoice, true, &[20, 21]),
        ]);
        let answers = vec![AnswerInput::text(1, "fine"), AnswerInput::choices(2, vec![21])];
        assert_eq!(validate(&survey, &answers), Ok(ValidationOutcome::Accepted));
    }

    #[test]
    fn reports_every_missing_required_question_at_once() {
        let survey = survey(vec![
            question(1, QuestionType::Text, true, &[]),
            question(2, QuestionType::MultipleChoice, true, &[20]),
            question(3, QuestionType::Text, false, &[]),
        ]);
        let errors = rejected(validate(&survey, &[]).unwrap());
        assert_eq!(
            errors,
            vec![
                ("question_1".to_string(), MSG_REQUIRED.to_string()),
                ("question_2".to_string(), MSG_REQUIRED.to_string()),
            ]
        );
    }

    #[test]
    fn blank_text_and_empty_selection_get_content_messages() {
        let survey = survey(vec![
            question(1, QuestionType::Text, true, &[]),
            question(2, QuestionType::MultipleChoice, true, &[20]),
        ]);
        let answers = vec![AnswerInput::text(1, "   "), AnswerInput::choices(2, vec![])];
        let errors = rejected(validate(&survey, &answers).unwrap());
        assert_eq!(
            errors,
            vec![
                ("question_1".to_string(), MSG_TEXT_MISSING.to_string()),
                ("question_2".to_string(), MSG_CHOICE_MISSING.to_string()),
            ]
        );
    }

    #[test]
    fn optional_questions_accept_empty_content() {
        let survey = survey(vec![question(1, QuestionType::Text, false, &[])]);
        let answers = vec![AnswerInput {
            question: 1,
            text_answer: None,
            selected_choices: None,
        }];
        assert!(validate(&survey, &answers).unwrap().is_accepted());
    }

    #[test]
    fn missing_and_blank_are_reported_together() {
        let survey = survey(vec![
            question(1, QuestionType::Text, true, &[]),
            question(2, QuestionType::Text, true, &[]),
        ]);
        let errors = rejected(validate(&survey, &[AnswerInput::text(1, "")]).unwrap());
        assert_eq!(
            errors,
            vec![
                ("question_1".to_string(), MSG_TEXT_MISSING.to_string()),
                ("question_2".to_string(), MSG_REQUIRED.to_string()),
            ]
        );
    }

    #[test]
    fn first_message_per_question_wins_for_duplicates() {
        let survey = survey(vec![question(1, QuestionType::Text, true, &[])]);
        let answers = vec![AnswerInput::text(1, ""), AnswerInput::text(1, "ok")];
        let errors = rejected(validate(&survey, &answers).unwrap());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn foreign_question_aborts() {
        let survey = survey(vec![question(1, QuestionType::Text, true, &[])]);
        let answers = vec![AnswerInput::text(1, "ok"), AnswerInput::text(99, "x")];
        assert_eq!(
            validate(&survey, &answers),
            Err(ValidationAbort::ForeignQuestion(99))
        );
    }

    #[test]
    fn foreign_choice_aborts_even_for_optional_question() {
        let survey = survey(vec![
            question(1, QuestionType::SingleChoice, false, &[10]),
            question(2, QuestionType::SingleChoice, false, &[20]),
        ]);
        let answers = vec![AnswerInput::choices(1, vec![20])];
        assert_eq!(
            validate(&survey, &answers),
            Err(ValidationAbort::ForeignChoice {
                question_id: 1,
                choice_id: 20,
            })
        );
    }
}
