use jigyasa_core::db::open_db_in_memory;
use jigyasa_core::model::account::{Registration, Viewer};
use jigyasa_core::model::analysis::{
    AnalysisDraft, GroupByRequest, PlotRequest, PlotType, SavedPlot,
};
use jigyasa_core::repo::account_repo::SqliteAccountRepository;
use jigyasa_core::repo::analysis_repo::SqliteAnalysisRepository;
use jigyasa_core::service::analyzer_service::AnalyzerService;
use jigyasa_core::service::auth_service::{AuthService, TokenPolicy};
use jigyasa_core::{PdfReportRenderer, ServiceError};
use regex::bytes::Regex;
use rusqlite::Connection;
use serde_json::json;

const SALES_CSV: &[u8] = b"region,quarter,revenue\nnorth,Q1,10\nsouth,Q1,4\nnorth,Q2,6\n";

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

fn analyzer(conn: &Connection) -> AnalyzerService<SqliteAnalysisRepository<'_>> {
    AnalyzerService::new(SqliteAnalysisRepository::new(conn), 1024 * 1024)
}

#[test]
fn upload_then_plot_and_group() {
    let conn = open_db_in_memory().unwrap();
    let analyst = register(&conn, "analyst");
    let service = analyzer(&conn);

    let upload = service
        .upload_csv(&analyst, Some("sales.csv"), SALES_CSV)
        .unwrap();
    assert_eq!(upload.file_name, "sales.csv");
    assert_eq!(upload.columns, vec!["region", "quarter", "revenue"]);
    assert_eq!(service.list_uploads(&analyst).unwrap().len(), 1);

    let figure = service
        .plot_data(
            &analyst,
            &PlotRequest {
                plot_type: PlotType::Bar,
                x_axis: Some("region".to_string()),
                y_axes: vec!["revenue".to_string()],
                csv_upload_id: upload.id,
            },
        )
        .unwrap();
    assert_eq!(figure.data.len(), 1);
    assert_eq!(figure.data[0]["type"], "bar");
    assert_eq!(figure.data[0]["x"], json!(["north", "south", "north"]));
    assert_eq!(figure.data[0]["y"], json!([10, 4, 6]));
    assert_eq!(figure.layout["title"], "revenue vs region");

    let grouped = service
        .group_by(
            &analyst,
            &GroupByRequest {
                columns: vec!["region".to_string()],
                csv_upload_id: Some(upload.id),
            },
        )
        .unwrap();
    assert_eq!(
        grouped,
        json!({
            "region": [
                {"region": "north", "count": 2},
                {"region": "south", "count": 1},
            ]
        })
    );
}

#[test]
fn bad_uploads_and_axes_are_bad_requests() {
    let conn = open_db_in_memory().unwrap();
    let analyst = register(&conn, "analyst");
    let service = analyzer(&conn);

    assert!(matches!(
        service.upload_csv(&analyst, Some("empty.csv"), b""),
        Err(ServiceError::BadRequest(_))
    ));
    let tiny = AnalyzerService::new(SqliteAnalysisRepository::new(&conn), 8);
    assert!(matches!(
        tiny.upload_csv(&analyst, Some("sales.csv"), SALES_CSV),
        Err(ServiceError::BadRequest(_))
    ));

    let upload = service.upload_csv(&analyst, None, SALES_CSV).unwrap();
    assert!(matches!(
        service.plot_data(
            &analyst,
            &PlotRequest {
                plot_type: PlotType::Line,
                x_axis: Some("region".to_string()),
                y_axes: vec!["profit".to_string()],
                csv_upload_id: upload.id,
            },
        ),
        Err(ServiceError::BadRequest(_))
    ));
    assert!(matches!(
        service.group_by(&analyst, &GroupByRequest::default()),
        Err(ServiceError::BadRequest(_))
    ));
}

#[test]
fn uploads_and_analyses_are_private_to_their_owner() {
    let conn = open_db_in_memory().unwrap();
    let analyst = register(&conn, "analyst");
    let intruder = register(&conn, "intruder");
    let service = analyzer(&conn);
    let upload = service
        .upload_csv(&analyst, Some("sales.csv"), SALES_CSV)
        .unwrap();

    match service.plot_data(
        &intruder,
        &PlotRequest {
            plot_type: PlotType::Pie,
            x_axis: Some("region".to_string()),
            y_axes: Vec::new(),
            csv_upload_id: upload.id,
        },
    ) {
        Err(ServiceError::NotFound(message)) => assert_eq!(message, "CSV file not found."),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(service.list_uploads(&intruder).unwrap().is_empty());
    assert!(matches!(
        service.list_uploads(&Viewer::Anonymous),
        Err(ServiceError::Unauthenticated(_))
    ));
}

#[test]
fn saved_analysis_publishes_as_pdf() {
    let conn = open_db_in_memory().unwrap();
    let analyst = register(&conn, "analyst");
    let intruder = register(&conn, "intruder");
    let service = analyzer(&conn);
    let upload = service
        .upload_csv(&analyst, Some("sales.csv"), SALES_CSV)
        .unwrap();
    let figure = service
        .plot_data(
            &analyst,
            &PlotRequest {
                plot_type: PlotType::Pie,
                x_axis: Some("region".to_string()),
                y_axes: Vec::new(),
                csv_upload_id: upload.id,
            },
        )
        .unwrap();
    let bars = service
        .plot_data(
            &analyst,
            &PlotRequest {
                plot_type: PlotType::Bar,
                x_axis: Some("quarter".to_string()),
                y_axes: vec!["revenue".to_string()],
                csv_upload_id: upload.id,
            },
        )
        .unwrap();

    let analysis = service
        .create_analysis(
            &analyst,
            &AnalysisDraft {
                title: "Q3 Review".to_string(),
                author_name: "Analyst".to_string(),
                date: "2026-10-01".to_string(),
                description: "Regional split".to_string(),
                plots: vec![
                    SavedPlot {
                        title: Some("Regions".to_string()),
                        description: None,
                        data: Some(figure.clone()),
                    },
                    SavedPlot {
                        title: Some("Draft without data".to_string()),
                        description: None,
                        data: None,
                    },
                    SavedPlot {
                        title: Some("Выручка по кварталам".to_string()),
                        description: Some("Revenue by quarter".to_string()),
                        data: Some(bars),
                    },
                ],
            },
        )
        .unwrap();
    assert_eq!(analysis.plots[0].data.as_ref(), Some(&figure));
    assert_eq!(service.list_analyses(&analyst).unwrap().len(), 1);
    assert!(service.list_analyses(&intruder).unwrap().is_empty());

    let report = service
        .publish_analysis(&analyst, analysis.id, &PdfReportRenderer::default())
        .unwrap();
    assert_eq!(report.file_name, "Q3 Review.pdf");
    assert_eq!(report.content_type, "application/pdf");
    assert!(report.bytes.starts_with(b"%PDF-"));
    let embedded_images = Regex::new(r"/Subtype\s*/Image")
        .unwrap()
        .find_iter(&report.bytes)
        .count();
    assert_eq!(embedded_images, 2);

    assert!(matches!(
        service.publish_analysis(&intruder, analysis.id, &PdfReportRenderer::default()),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn analysis_drafts_are_validated() {
    let conn = open_db_in_memory().unwrap();
    let analyst = register(&conn, "analyst");
    let service = analyzer(&conn);

    let draft = AnalysisDraft {
        title: "Review".to_string(),
        author_name: "Analyst".to_string(),
        date: "01/10/2026".to_string(),
        description: String::new(),
        plots: Vec::new(),
    };
    assert!(matches!(
        service.create_analysis(&analyst, &draft),
        Err(ServiceError::BadRequest(_))
    ));
    let impossible = AnalysisDraft {
        date: "2026-02-29".to_string(),
        ..draft
    };
    assert!(matches!(
        service.create_analysis(&analyst, &impossible),
        Err(ServiceError::BadRequest(_))
    ));
    assert!(service.list_analyses(&analyst).unwrap().is_empty());
}
