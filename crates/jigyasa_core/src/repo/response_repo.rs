//! Survey response persistence.
//!
//! # Responsibility
//! - Persist one submission (response + answers + selected choices) as a
//!   single atomic unit.
//! - Read responses back with their answers in insertion order.
//!
//! # Invariants
//! - `create_response` either writes every row or none.
//! - Selected choices are returned in ascending choice id order.

use crate::model::account::UserId;
use crate::model::survey::{
    Answer, AnswerContent, NewSubmission, ResponseId, SurveyId, SurveyResponse,
};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

const RESPONSE_SELECT_SQL: &str = "SELECT id, survey_id, respondent_id, submitted_at
FROM survey_responses";

pub trait ResponseRepository {
    /// Writes the submission atomically and returns the new response id.
    fn create_response(&self, submission: &NewSubmission) -> RepoResult<ResponseId>;
    fn get_response(&self, response_id: ResponseId) -> RepoResult<Option<SurveyResponse>>;
    /// Lists responses of one survey in submission order.
    fn list_for_survey(&self, survey_id: SurveyId) -> RepoResult<Vec<SurveyResponse>>;
    /// Lists responses authored by one user in submission order.
    fn list_for_respondent(&self, respondent_id: UserId) -> RepoResult<Vec<SurveyResponse>>;
    fn count_for_survey(&self, survey_id: SurveyId) -> RepoResult<u64>;
}

pub struct SqliteResponseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResponseRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ResponseRepository for SqliteResponseRepository<'_> {
    fn create_response(&self, submission: &NewSubmission) -> RepoResult<ResponseId> {
        // Dropping `tx` on any early return rolls the whole submission back.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO survey_responses (survey_id, respondent_id) VALUES (?1, ?2);",
            params![submission.survey_id(), submission.respondent_id()],
        )?;
        let response_id = tx.last_insert_rowid();

        {
            let mut insert_answer = tx.prepare(
                "INSERT INTO answers (response_id, question_id, text_answer)
                 VALUES (?1, ?2, ?3);",
            )?;
            let mut insert_choice = tx.prepare(
                "INSERT INTO answer_choices (answer_id, choice_id) VALUES (?1, ?2);",
            )?;

            for answer in submission.answers() {
                match &answer.content {
                    AnswerContent::Text(text) => {
                        insert_answer.execute(params![
                            response_id,
                            answer.question_id,
                            text.as_deref()
                        ])?;
                    }
                    AnswerContent::Choices(choice_ids) => {
                        insert_answer.execute(params![
                            response_id,
                            answer.question_id,
                            Option::<&str>::None
                        ])?;
                        let answer_id = tx.last_insert_rowid();
                        for choice_id in choice_ids {
                            insert_choice.execute(params![answer_id, choice_id])?;
                        }
                    }
                }
            }
        }

        tx.commit()?;
        Ok(response_id)
    }

    fn get_response(&self, response_id: ResponseId) -> RepoResult<Option<SurveyResponse>> {
        let mut responses = self.load(
            &format!("{RESPONSE_SELECT_SQL} WHERE id = ?1;"),
            response_id,
        )?;
        Ok(responses.pop())
    }

    fn list_for_survey(&self, survey_id: SurveyId) -> RepoResult<Vec<SurveyResponse>> {
        self.load(
            &format!("{RESPONSE_SELECT_SQL} WHERE survey_id = ?1 ORDER BY id ASC;"),
            survey_id,
        )
    }

    fn list_for_respondent(&self, respondent_id: UserId) -> RepoResult<Vec<SurveyResponse>> {
        self.load(
            &format!("{RESPONSE_SELECT_SQL} WHERE respondent_id = ?1 ORDER BY id ASC;"),
            respondent_id,
        )
    }

    fn count_for_survey(&self, survey_id: SurveyId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM survey_responses WHERE survey_id = ?1;",
            [survey_id],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative response count {count}")))
    }
}

impl SqliteResponseRepository<'_> {
    fn load(&self, sql: &str, key: i64) -> RepoResult<Vec<SurveyResponse>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        let mut responses = Vec::new();
        while let Some(row) = rows.next()? {
            responses.push(parse_response_row(row)?);
        }
        attach_answers(self.conn, &mut responses)?;
        Ok(responses)
    }
}

fn attach_answers(conn: &Connection, responses: &mut [SurveyResponse]) -> RepoResult<()> {
    if responses.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; responses.len()].join(", ");
    let response_ids = responses
        .iter()
        .map(|response| Value::Integer(response.id))
        .collect::<Vec<_>>();

    let mut choices_by_answer: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT ac.answer_id, ac.choice_id
             FROM answer_choices ac
             INNER JOIN answers a ON a.id = ac.answer_id
             WHERE a.response_id IN ({placeholders})
             ORDER BY ac.answer_id ASC, ac.choice_id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(response_ids.iter()))?;
        while let Some(row) = rows.next()? {
            let answer_id: i64 = row.get("answer_id")?;
            choices_by_answer
                .entry(answer_id)
                .or_default()
                .push(row.get("choice_id")?);
        }
    }

    let mut answers_by_response: BTreeMap<ResponseId, Vec<Answer>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, response_id, question_id, text_answer
             FROM answers
             WHERE response_id IN ({placeholders})
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(response_ids.iter()))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get("id")?;
            let response_id: ResponseId = row.get("response_id")?;
            answers_by_response
                .entry(response_id)
                .or_default()
                .push(Answer {
                    id,
                    question_id: row.get("question_id")?,
                    text_answer: row.get("text_answer")?,
                    selected_choices: choices_by_answer.remove(&id).unwrap_or_default(),
                });
        }
    }

    for response in responses.iter_mut() {
        response.answers = answers_by_response.remove(&response.id).unwrap_or_default();
    }
    Ok(())
}

fn parse_response_row(row: &Row<'_>) -> RepoResult<SurveyResponse> {
    Ok(SurveyResponse {
        id: row.get("id")?,
        survey_id: row.get("survey_id")?,
        respondent_id: row.get("respondent_id")?,
        submitted_at: row.get("submitted_at")?,
        answers: Vec::new(),
    })
}
