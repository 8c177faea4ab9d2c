use jigyasa_api::{Api, ApiRequest, ApiResponse, Method};
use jigyasa_core::{open_db_in_memory, AppConfig};
use rusqlite::Connection;
use serde_json::{json, Value};

struct Harness {
    api: Api,
    conn: Connection,
}

impl Harness {
    fn new() -> Self {
        Self {
            api: Api::new(AppConfig::default()),
            conn: open_db_in_memory().unwrap(),
        }
    }

    fn send(&self, request: ApiRequest) -> ApiResponse {
        self.api.dispatch_with(&self.conn, &request)
    }

    /// Registers `username` and returns its access token.
    fn sign_up(&self, username: &str) -> String {
        let registered = self.send(ApiRequest::new(Method::Post, "/api/auth/register").with_json(
            &json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "s3cret-pass",
                "password2": "s3cret-pass",
            }),
        ));
        assert_eq!(registered.status, 201);

        let login = self.send(ApiRequest::new(Method::Post, "/api/auth/login").with_json(
            &json!({ "email": format!("{username}@example.com"), "password": "s3cret-pass" }),
        ));
        assert_eq!(login.status, 200);
        login.json_body()["access"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

fn pulse_survey() -> Value {
    json!({
        "title": "Pulse",
        "questions": [
            {"text": "What went well?", "question_type": "text", "required": true},
            {
                "text": "Mood?",
                "question_type": "single_choice",
                "required": true,
                "choices": [{"text": "Good"}, {"text": "Bad"}]
            }
        ]
    })
}

#[test]
fn register_login_and_profile_round_trip() {
    let harness = Harness::new();
    let token = harness.sign_up("ada");

    let profile = harness.send(ApiRequest::new(Method::Get, "/api/auth/profile").with_bearer(&token));
    assert_eq!(profile.status, 200);
    assert_eq!(profile.json_body()["username"], "ada");

    let anonymous = harness.send(ApiRequest::new(Method::Get, "/api/auth/profile"));
    assert_eq!(anonymous.status, 401);

    let bogus = harness.send(
        ApiRequest::new(Method::Get, "/api/surveys").with_bearer("not-a-real-token"),
    );
    assert_eq!(bogus.status, 401);
    assert!(bogus.header("WWW-Authenticate").is_some());
}

#[test]
fn survey_submission_reports_field_errors_then_succeeds() {
    let harness = Harness::new();
    let owner = harness.sign_up("owner");
    let respondent = harness.sign_up("respondent");

    let created = harness.send(
        ApiRequest::new(Method::Post, "/api/surveys")
            .with_bearer(&owner)
            .with_json(&pulse_survey()),
    );
    assert_eq!(created.status, 201);
    let survey = created.json_body();
    let survey_id = survey["id"].as_i64().unwrap();
    let q1 = survey["questions"][0]["id"].as_i64().unwrap();
    let q2 = survey["questions"][1]["id"].as_i64().unwrap();
    let good = survey["questions"][1]["choices"][0]["id"].as_i64().unwrap();

    let rejected = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-responses")
            .with_bearer(&respondent)
            .with_json(&json!({
                "survey": survey_id,
                "answers": [{"question": q1, "text_answer": ""}]
            })),
    );
    assert_eq!(rejected.status, 400);
    assert_eq!(
        rejected.json_body(),
        json!({
            format!("question_{q1}"): "Please provide an answer",
            format!("question_{q2}"): "This field is required",
        })
    );

    let accepted = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-responses")
            .with_bearer(&respondent)
            .with_json(&json!({
                "survey": survey_id,
                "answers": [
                    {"question": q1, "text_answer": "Shipping"},
                    {"question": q2, "selected_choices": [good]}
                ]
            })),
    );
    assert_eq!(accepted.status, 201);
    assert_eq!(
        accepted.json_body(),
        json!({ "detail": "Response submitted successfully" })
    );

    let listed = harness.send(
        ApiRequest::new(Method::Get, "/api/survey-responses")
            .with_query("survey", survey_id.to_string())
            .with_bearer(&owner),
    );
    assert_eq!(listed.status, 200);
    assert_eq!(listed.json_body().as_array().map(Vec::len), Some(1));

    let malformed = harness.send(
        ApiRequest::new(Method::Get, "/api/survey-responses")
            .with_query("survey", "abc")
            .with_bearer(&owner),
    );
    assert_eq!(malformed.status, 400);
}

#[test]
fn public_and_creator_routes_share_the_public_shape() {
    let harness = Harness::new();
    let owner = harness.sign_up("owner");
    let created = harness
        .send(
            ApiRequest::new(Method::Post, "/api/create-survey")
                .with_bearer(&owner)
                .with_json(&pulse_survey()),
        )
        .json_body();
    let survey_id = created["id"].as_i64().unwrap();
    let creator_id = created["creator"].as_i64().unwrap();

    let public = harness.send(ApiRequest::new(
        Method::Get,
        format!("/api/surveys/{survey_id}/public"),
    ));
    assert_eq!(public.status, 200);
    let by_creator = harness.send(ApiRequest::new(
        Method::Get,
        format!("/surveys/{creator_id}/{survey_id}"),
    ));
    assert_eq!(by_creator.status, 200);
    assert_eq!(public.json_body(), by_creator.json_body());
    assert!(public.json_body().get("creator").is_none());

    let hidden = harness.send(ApiRequest::new(
        Method::Get,
        format!("/api/surveys/{}/{survey_id}", creator_id + 1),
    ));
    assert_eq!(hidden.status, 404);
}

#[test]
fn unknown_paths_and_methods_are_rejected() {
    let harness = Harness::new();

    let missing = harness.send(ApiRequest::new(Method::Get, "/api/nothing-here"));
    assert_eq!(missing.status, 404);
    assert_eq!(missing.json_body(), json!({ "detail": "Not found." }));

    let wrong_method = harness.send(ApiRequest::new(Method::Delete, "/api/surveys"));
    assert_eq!(wrong_method.status, 405);

    let health = harness.send(ApiRequest::new(Method::Get, "/health"));
    assert_eq!(health.status, 200);
    assert_eq!(health.json_body()["status"], "ok");
}

#[test]
fn published_analysis_downloads_as_attachment() {
    let harness = Harness::new();
    let analyst = harness.sign_up("analyst");

    let upload = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-analyzer/csv-uploads")
            .with_query("file_name", "sales.csv")
            .with_bearer(&analyst)
            .with_body(b"region,revenue\nnorth,10\nsouth,4\n".to_vec()),
    );
    assert_eq!(upload.status, 201);
    let upload_id = upload.json_body()["id"].as_i64().unwrap();

    let figure = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-analyzer/plot-data")
            .with_bearer(&analyst)
            .with_json(&json!({
                "plot_type": "bar",
                "x_axis": "region",
                "y_axes": ["revenue"],
                "csv_upload_id": upload_id
            })),
    );
    assert_eq!(figure.status, 200);

    let analysis = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-analyzer/analyses")
            .with_bearer(&analyst)
            .with_json(&json!({
                "title": "Q3",
                "author_name": "Analyst",
                "date": "2026-10-01",
                "plots": [{"title": "Revenue", "data": figure.json_body()}]
            })),
    );
    assert_eq!(analysis.status, 201);
    let analysis_id = analysis.json_body()["id"].as_i64().unwrap();

    let report = harness.send(
        ApiRequest::new(Method::Post, "/api/survey-analyzer/publish-analysis")
            .with_bearer(&analyst)
            .with_json(&json!({ "analysis_id": analysis_id })),
    );
    assert_eq!(report.status, 200);
    assert_eq!(report.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(
        report.header("Content-Disposition"),
        Some("attachment; filename=\"Q3.pdf\"")
    );
    assert!(report.body.starts_with(b"%PDF-"));
}

#[test]
fn file_backed_dispatch_opens_the_configured_database() {
    let dir = tempfile::tempdir().unwrap();
    let api = Api::new(AppConfig {
        database_path: dir.path().join("jigyasa.sqlite3"),
        ..AppConfig::default()
    });

    let registered = api.dispatch(&ApiRequest::new(Method::Post, "/api/auth/register").with_json(
        &json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "s3cret-pass",
        }),
    ));
    assert_eq!(registered.status, 201);

    let duplicate = api.dispatch(&ApiRequest::new(Method::Post, "/api/auth/register").with_json(
        &json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "s3cret-pass",
        }),
    ));
    assert_eq!(duplicate.status, 409);
}
