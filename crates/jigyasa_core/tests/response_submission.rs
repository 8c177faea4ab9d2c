use jigyasa_core::db::{open_db, open_db_in_memory};
use jigyasa_core::model::account::{OrganizationDraft, ProfileUpdate, Registration, Viewer};
use jigyasa_core::model::survey::{
    AnswerContent, AnswerInput, ChoiceDraft, NewAnswer, NewSubmission, QuestionDraft,
    QuestionType, SubmissionPayload, SurveyDraft, SurveyId,
};
use jigyasa_core::repo::account_repo::SqliteAccountRepository;
use jigyasa_core::repo::organization_repo::SqliteOrganizationRepository;
use jigyasa_core::repo::response_repo::{ResponseRepository, SqliteResponseRepository};
use jigyasa_core::repo::survey_repo::SqliteSurveyRepository;
use jigyasa_core::service::auth_service::{AuthService, TokenPolicy};
use jigyasa_core::service::organization_service::OrganizationService;
use jigyasa_core::service::response_service::ResponseService;
use jigyasa_core::service::survey_service::{OwnerSurveyView, SurveyService};
use jigyasa_core::ServiceError;
use rusqlite::Connection;
use std::sync::{Arc, Barrier};
use std::thread;

fn register(conn: &Connection, username: &str) -> Viewer {
    let auth = AuthService::new(SqliteAccountRepository::new(conn), TokenPolicy::default());
    let user = auth
        .register(&Registration {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "s3cret-pass".to_string(),
            password2: None,
            first_name: String::new(),
            last_name: String::new(),
        })
        .unwrap();
    auth.viewer_for(user.id).unwrap()
}

fn responses(
    conn: &Connection,
) -> ResponseService<SqliteSurveyRepository<'_>, SqliteResponseRepository<'_>> {
    ResponseService::new(
        SqliteSurveyRepository::new(conn),
        SqliteResponseRepository::new(conn),
    )
}

/// Q1: required text, Q2: required single choice, Q3: optional text.
fn create_survey(conn: &Connection, owner: &Viewer, draft: SurveyDraft) -> OwnerSurveyView {
    SurveyService::new(SqliteSurveyRepository::new(conn))
        .create_survey(owner, &draft)
        .unwrap()
}

fn pulse_draft() -> SurveyDraft {
    SurveyDraft {
        title: "Pulse".to_string(),
        description: String::new(),
        is_active: true,
        requires_organization: false,
        organization_id: None,
        questions: Some(vec![
            QuestionDraft {
                text: "What went well?".to_string(),
                question_type: QuestionType::Text,
                required: true,
                choices: Vec::new(),
            },
            QuestionDraft {
                text: "Mood?".to_string(),
                question_type: QuestionType::SingleChoice,
                required: true,
                choices: vec![
                    ChoiceDraft {
                        text: "Good".to_string(),
                    },
                    ChoiceDraft {
                        text: "Bad".to_string(),
                    },
                ],
            },
            QuestionDraft {
                text: "Anything else?".to_string(),
                question_type: QuestionType::Text,
                required: false,
                choices: Vec::new(),
            },
        ]),
    }
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn payload(survey: SurveyId, answers: Vec<AnswerInput>) -> SubmissionPayload {
    SubmissionPayload { survey, answers }
}

#[test]
fn blank_and_missing_answers_are_reported_then_fixed_submission_succeeds() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let respondent = register(&conn, "respondent");
    let survey = create_survey(&conn, &owner, pulse_draft());
    let q1 = survey.questions[0].id;
    let q2 = survey.questions[1].id;
    let good = survey.questions[1].choices[0].id;
    let service = responses(&conn);

    let rejected = service
        .submit(&respondent, &payload(survey.id, vec![AnswerInput::text(q1, "   ")]))
        .unwrap_err();
    match rejected {
        ServiceError::ValidationFailed(fields) => {
            assert_eq!(fields.len(), 2);
            assert_eq!(fields[&format!("question_{q1}")], "Please provide an answer");
            assert_eq!(fields[&format!("question_{q2}")], "This field is required");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&conn, "survey_responses"), 0);

    let response_id = service
        .submit(
            &respondent,
            &payload(
                survey.id,
                vec![
                    AnswerInput::text(q1, "Shipping on time"),
                    AnswerInput::choices(q2, vec![good]),
                ],
            ),
        )
        .unwrap();
    assert_eq!(count(&conn, "survey_responses"), 1);
    assert_eq!(count(&conn, "answers"), 2);

    let stored = service.get_response(&respondent, response_id).unwrap();
    assert_eq!(stored.respondent_id, respondent.user_id());
    assert_eq!(stored.answers.len(), 2);
    assert_eq!(stored.answers[0].text_answer.as_deref(), Some("Shipping on time"));
    assert_eq!(stored.answers[1].text_answer, None);
    assert_eq!(stored.answers[1].selected_choices, vec![good]);
}

#[test]
fn two_missing_required_questions_yield_exactly_two_keys() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let survey = create_survey(&conn, &owner, pulse_draft());
    let optional = survey.questions[2].id;

    let err = responses(&conn)
        .submit(
            &owner,
            &payload(survey.id, vec![AnswerInput::text(optional, "fine")]),
        )
        .unwrap_err();
    match err {
        ServiceError::ValidationFailed(fields) => {
            let keys = fields.keys().cloned().collect::<Vec<_>>();
            assert_eq!(
                keys,
                vec![
                    format!("question_{}", survey.questions[0].id),
                    format!("question_{}", survey.questions[1].id),
                ]
            );
            assert!(fields.values().all(|message| message == "This field is required"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn anonymous_submission_to_open_survey_is_stored_without_respondent() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let survey = create_survey(&conn, &owner, pulse_draft());
    let q1 = survey.questions[0].id;
    let q2 = survey.questions[1].id;
    let bad = survey.questions[1].choices[1].id;
    let service = responses(&conn);

    let response_id = service
        .submit(
            &Viewer::Anonymous,
            &payload(
                survey.id,
                vec![
                    AnswerInput::text(q1, "ok"),
                    AnswerInput::choices(q2, vec![bad, bad]),
                ],
            ),
        )
        .unwrap();

    let stored = service.get_response(&owner, response_id).unwrap();
    assert_eq!(stored.respondent_id, None);
    assert_eq!(stored.answers[1].selected_choices, vec![bad]);
}

#[test]
fn foreign_questions_and_choices_abort_without_writes() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let survey = create_survey(&conn, &owner, pulse_draft());
    let other = create_survey(&conn, &owner, pulse_draft());
    let q1 = survey.questions[0].id;
    let q2 = survey.questions[1].id;
    let service = responses(&conn);

    let foreign_question = service.submit(
        &owner,
        &payload(
            survey.id,
            vec![
                AnswerInput::text(q1, "ok"),
                AnswerInput::text(other.questions[0].id, "wrong survey"),
            ],
        ),
    );
    assert!(matches!(foreign_question, Err(ServiceError::BadRequest(_))));

    let foreign_choice = service.submit(
        &owner,
        &payload(
            survey.id,
            vec![
                AnswerInput::text(q1, "ok"),
                AnswerInput::choices(q2, vec![other.questions[1].choices[0].id]),
            ],
        ),
    );
    assert!(matches!(foreign_choice, Err(ServiceError::BadRequest(_))));
    assert_eq!(count(&conn, "survey_responses"), 0);
}

#[test]
fn failed_answer_insert_rolls_back_the_whole_submission() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let survey = create_survey(&conn, &owner, pulse_draft());

    // The second answer points at a choice row that does not exist, so the
    // foreign key check fails after the response and first answer are written.
    let submission = NewSubmission::new(
        survey.id,
        owner.user_id(),
        vec![
            NewAnswer {
                question_id: survey.questions[0].id,
                content: AnswerContent::Text(Some("ok".to_string())),
            },
            NewAnswer {
                question_id: survey.questions[1].id,
                content: AnswerContent::Choices(vec![987_654]),
            },
        ],
    );
    assert!(SqliteResponseRepository::new(&conn)
        .create_response(&submission)
        .is_err());

    assert_eq!(count(&conn, "survey_responses"), 0);
    assert_eq!(count(&conn, "answers"), 0);
    assert_eq!(count(&conn, "answer_choices"), 0);
}

#[test]
fn restricted_surveys_apply_the_access_policy() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let member = register(&conn, "member");
    let outsider = register(&conn, "outsider");
    let auth = AuthService::new(SqliteAccountRepository::new(&conn), TokenPolicy::default());

    let org = OrganizationService::new(SqliteOrganizationRepository::new(&conn))
        .create(
            &owner,
            &OrganizationDraft {
                name: "Acme".to_string(),
                description: String::new(),
            },
        )
        .unwrap();
    auth.update_profile(
        &member,
        &ProfileUpdate {
            organization_id: Some(Some(org.id)),
            ..ProfileUpdate::default()
        },
    )
    .unwrap();
    let member = auth.viewer_for(member.user_id().unwrap()).unwrap();

    let survey = create_survey(
        &conn,
        &owner,
        SurveyDraft {
            requires_organization: true,
            organization_id: Some(org.id),
            ..pulse_draft()
        },
    );
    let answers = vec![
        AnswerInput::text(survey.questions[0].id, "ok"),
        AnswerInput::choices(
            survey.questions[1].id,
            vec![survey.questions[1].choices[0].id],
        ),
    ];
    let service = responses(&conn);

    match service.submit(&Viewer::Anonymous, &payload(survey.id, answers.clone())) {
        Err(ServiceError::Unauthenticated(message)) => {
            assert_eq!(message, "Authentication required for this survey");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match service.submit(&outsider, &payload(survey.id, answers.clone())) {
        Err(ServiceError::Forbidden(message)) => {
            assert_eq!(message, "You don't have access to this survey");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    service
        .submit(&member, &payload(survey.id, answers))
        .unwrap();
    assert_eq!(count(&conn, "survey_responses"), 1);

    let surveys = SurveyService::new(SqliteSurveyRepository::new(&conn));
    assert!(surveys.public_survey(&member, survey.id).is_ok());
    assert!(matches!(
        surveys.public_survey(&outsider, survey.id),
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        surveys.creator_survey(&member, outsider.user_id().unwrap(), survey.id),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn response_listing_respects_roles() {
    let conn = open_db_in_memory().unwrap();
    let owner = register(&conn, "owner");
    let respondent = register(&conn, "respondent");
    let stranger = register(&conn, "stranger");
    let survey = create_survey(&conn, &owner, pulse_draft());
    let service = responses(&conn);

    let response_id = service
        .submit(
            &respondent,
            &payload(
                survey.id,
                vec![
                    AnswerInput::text(survey.questions[0].id, "ok"),
                    AnswerInput::choices(
                        survey.questions[1].id,
                        vec![survey.questions[1].choices[0].id],
                    ),
                ],
            ),
        )
        .unwrap();

    assert_eq!(service.list_responses(&owner, Some(survey.id)).unwrap().len(), 1);
    assert_eq!(service.list_responses(&respondent, None).unwrap().len(), 1);
    assert!(service.list_responses(&stranger, None).unwrap().is_empty());
    assert!(matches!(
        service.list_responses(&stranger, Some(survey.id)),
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        service.get_response(&stranger, response_id),
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        service.list_responses(&Viewer::Anonymous, None),
        Err(ServiceError::Unauthenticated(_))
    ));
}

#[test]
fn concurrent_submissions_to_one_survey_do_not_interfere() {
    const RESPONDENTS: usize = 12;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.sqlite3");

    let conn = open_db(&path).unwrap();
    let owner = register(&conn, "owner");
    let survey = create_survey(
        &conn,
        &owner,
        SurveyDraft {
            questions: Some(vec![QuestionDraft {
                text: "One word for this week?".to_string(),
                question_type: QuestionType::Text,
                required: true,
                choices: Vec::new(),
            }]),
            ..pulse_draft()
        },
    );
    let survey_id = survey.id;
    let question = survey.questions[0].id;

    let path = Arc::new(path);
    let start = Arc::new(Barrier::new(RESPONDENTS));
    let handles = (0..RESPONDENTS)
        .map(|index| {
            let path = Arc::clone(&path);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let conn = open_db(path.as_path()).unwrap();
                start.wait();
                let response_id = responses(&conn)
                    .submit(
                        &Viewer::Anonymous,
                        &payload(
                            survey_id,
                            vec![AnswerInput::text(question, format!("word {index}"))],
                        ),
                    )
                    .unwrap();
                (index, response_id)
            })
        })
        .collect::<Vec<_>>();
    let submitted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(count(&conn, "survey_responses"), RESPONDENTS as i64);
    assert_eq!(count(&conn, "answers"), RESPONDENTS as i64);
    for (index, response_id) in submitted {
        let texts = conn
            .prepare("SELECT text_answer FROM answers WHERE response_id = ?1;")
            .unwrap()
            .query_map([response_id], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(texts, vec![format!("word {index}")]);
    }
}
