//! Survey catalog persistence: surveys, questions and choices.
//!
//! # Responsibility
//! - Create and replace surveys together with their nested question set.
//! - Eager-load questions and choices for one or many surveys with one
//!   query per level.
//!
//! # Invariants
//! - Tombstoned surveys (`is_deleted=1`) are invisible to every read.
//! - Questions and choices are returned in ascending id (creation) order.
//! - A question set is only replaced while the survey has no responses.

use crate::model::account::{OrganizationId, UserId};
use crate::model::survey::{
    Choice, Question, QuestionDraft, QuestionType, Survey, SurveyDetail, SurveyDraft, SurveyId,
};
use crate::repo::organization_repo::organization_exists;
use crate::repo::{bool_to_int, int_to_bool, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

const SURVEY_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    creator_id,
    organization_id,
    is_active,
    requires_organization,
    created_at,
    updated_at
FROM surveys";

/// Filter options for survey listing. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyListQuery {
    pub creator_id: Option<UserId>,
    pub organization_id: Option<OrganizationId>,
    pub exclude_creator_id: Option<UserId>,
}

pub trait SurveyRepository {
    /// Creates a survey with its questions and choices; returns the new id.
    fn create_survey(&self, creator_id: UserId, draft: &SurveyDraft) -> RepoResult<SurveyId>;
    /// Loads one visible survey with questions and choices.
    fn get_survey(&self, survey_id: SurveyId) -> RepoResult<Option<SurveyDetail>>;
    /// Lists visible surveys in creation order.
    fn list_surveys(&self, query: &SurveyListQuery) -> RepoResult<Vec<SurveyDetail>>;
    /// Writes survey header fields and optionally replaces the question set.
    fn update_survey(&self, survey: &Survey, questions: Option<&[QuestionDraft]>)
        -> RepoResult<()>;
    fn tombstone_survey(&self, survey_id: SurveyId) -> RepoResult<()>;
    fn count_responses(&self, survey_id: SurveyId) -> RepoResult<u64>;
}

pub struct SqliteSurveyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSurveyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SurveyRepository for SqliteSurveyRepository<'_> {
    fn create_survey(&self, creator_id: UserId, draft: &SurveyDraft) -> RepoResult<SurveyId> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_organization(&tx, draft.organization_id)?;
        tx.execute(
            "INSERT INTO surveys (
                title,
                description,
                creator_id,
                organization_id,
                is_active,
                requires_organization
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                draft.title.trim(),
                draft.description.as_str(),
                creator_id,
                draft.organization_id,
                bool_to_int(draft.is_active),
                bool_to_int(draft.requires_organization),
            ],
        )?;
        let survey_id = tx.last_insert_rowid();
        insert_questions(&tx, survey_id, draft.questions.as_deref().unwrap_or(&[]))?;
        tx.commit()?;
        Ok(survey_id)
    }

    fn get_survey(&self, survey_id: SurveyId) -> RepoResult<Option<SurveyDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SURVEY_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([survey_id])?;
        let survey = match rows.next()? {
            Some(row) => parse_survey_row(row)?,
            None => return Ok(None),
        };
        let mut details = attach_questions(self.conn, vec![survey])?;
        Ok(details.pop())
    }

    fn list_surveys(&self, query: &SurveyListQuery) -> RepoResult<Vec<SurveyDetail>> {
        let mut sql = format!("{SURVEY_SELECT_SQL} WHERE is_deleted = 0");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(creator_id) = query.creator_id {
            sql.push_str(" AND creator_id = ?");
            bind_values.push(Value::Integer(creator_id));
        }
        if let Some(organization_id) = query.organization_id {
            sql.push_str(" AND organization_id = ?");
            bind_values.push(Value::Integer(organization_id));
        }
        if let Some(excluded) = query.exclude_creator_id {
            sql.push_str(" AND creator_id <> ?");
            bind_values.push(Value::Integer(excluded));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut surveys = Vec::new();
        while let Some(row) = rows.next()? {
            surveys.push(parse_survey_row(row)?);
        }
        attach_questions(self.conn, surveys)
    }

    fn update_survey(
        &self,
        survey: &Survey,
        questions: Option<&[QuestionDraft]>,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_organization(&tx, survey.organization_id)?;
        let changed = tx.execute(
            "UPDATE surveys
             SET
                title = ?2,
                description = ?3,
                organization_id = ?4,
                is_active = ?5,
                requires_organization = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                survey.id,
                survey.title.trim(),
                survey.description.as_str(),
                survey.organization_id,
                bool_to_int(survey.is_active),
                bool_to_int(survey.requires_organization),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "survey",
                id: survey.id,
            });
        }

        if let Some(questions) = questions {
            if count_responses_in(&tx, survey.id)? > 0 {
                return Err(RepoError::Conflict(format!(
                    "survey {} already has responses; its questions cannot be replaced",
                    survey.id
                )));
            }
            tx.execute("DELETE FROM questions WHERE survey_id = ?1;", [survey.id])?;
            insert_questions(&tx, survey.id, questions)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn tombstone_survey(&self, survey_id: SurveyId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE surveys
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [survey_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "survey",
                id: survey_id,
            });
        }
        Ok(())
    }

    fn count_responses(&self, survey_id: SurveyId) -> RepoResult<u64> {
        count_responses_in(self.conn, survey_id)
    }
}

fn ensure_organization(conn: &Connection, organization_id: Option<OrganizationId>) -> RepoResult<()> {
    if let Some(id) = organization_id {
        if !organization_exists(conn, id)? {
            return Err(RepoError::NotFound {
                entity: "organization",
                id,
            });
        }
    }
    Ok(())
}

fn insert_questions(
    tx: &Transaction<'_>,
    survey_id: SurveyId,
    questions: &[QuestionDraft],
) -> RepoResult<()> {
    let mut insert_question = tx.prepare(
        "INSERT INTO questions (survey_id, text, question_type, required)
         VALUES (?1, ?2, ?3, ?4);",
    )?;
    let mut insert_choice =
        tx.prepare("INSERT INTO choices (question_id, text) VALUES (?1, ?2);")?;

    for question in questions {
        insert_question.execute(params![
            survey_id,
            question.text.trim(),
            question.question_type.as_str(),
            bool_to_int(question.required),
        ])?;
        let question_id = tx.last_insert_rowid();
        if question.question_type.is_choice() {
            for choice in &question.choices {
                insert_choice.execute(params![question_id, choice.text.trim()])?;
            }
        }
    }
    Ok(())
}

fn count_responses_in(conn: &Connection, survey_id: SurveyId) -> RepoResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM survey_responses WHERE survey_id = ?1;",
        [survey_id],
        |row| row.get(0),
    )?;
    u64::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("negative response count {count}")))
}

/// Loads questions and choices for `surveys` with one query per level.
fn attach_questions(conn: &Connection, surveys: Vec<Survey>) -> RepoResult<Vec<SurveyDetail>> {
    if surveys.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; surveys.len()].join(", ");
    let survey_ids = surveys
        .iter()
        .map(|survey| Value::Integer(survey.id))
        .collect::<Vec<_>>();

    let mut choices_by_question: BTreeMap<i64, Vec<Choice>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT c.id, c.question_id, c.text
             FROM choices c
             INNER JOIN questions q ON q.id = c.question_id
             WHERE q.survey_id IN ({placeholders})
             ORDER BY c.id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(survey_ids.iter()))?;
        while let Some(row) = rows.next()? {
            let choice = Choice {
                id: row.get("id")?,
                question_id: row.get("question_id")?,
                text: row.get("text")?,
            };
            choices_by_question
                .entry(choice.question_id)
                .or_default()
                .push(choice);
        }
    }

    let mut questions_by_survey: BTreeMap<SurveyId, Vec<Question>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, survey_id, text, question_type, required
             FROM questions
             WHERE survey_id IN ({placeholders})
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(survey_ids.iter()))?;
        while let Some(row) = rows.next()? {
            let mut question = parse_question_row(row)?;
            question.choices = choices_by_question.remove(&question.id).unwrap_or_default();
            questions_by_survey
                .entry(question.survey_id)
                .or_default()
                .push(question);
        }
    }

    Ok(surveys
        .into_iter()
        .map(|survey| {
            let questions = questions_by_survey.remove(&survey.id).unwrap_or_default();
            SurveyDetail { survey, questions }
        })
        .collect())
}

fn parse_survey_row(row: &Row<'_>) -> RepoResult<Survey> {
    Ok(Survey {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        creator_id: row.get("creator_id")?,
        organization_id: row.get("organization_id")?,
        is_active: int_to_bool(row.get("is_active")?, "surveys.is_active")?,
        requires_organization: int_to_bool(
            row.get("requires_organization")?,
            "surveys.requires_organization",
        )?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_question_row(row: &Row<'_>) -> RepoResult<Question> {
    let type_text: String = row.get("question_type")?;
    let question_type = QuestionType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid question type `{type_text}` in questions.question_type"
        ))
    })?;
    Ok(Question {
        id: row.get("id")?,
        survey_id: row.get("survey_id")?,
        text: row.get("text")?,
        question_type,
        required: int_to_bool(row.get("required")?, "questions.required")?,
        choices: Vec::new(),
    })
}
