//! End-to-end statement flow tests.
//!
//! Runs the full wiring (store → consumer → bus → processor → service)
//! behind the real HTTP router and drives it through `axum_test`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ledgerflow::bus::{
    ChannelConfig, ChannelEventBus, EventBus, EventType, ReconciliationConsumer,
};
use ledgerflow::domain::{Repository, UploadStatus};
use ledgerflow::http::{router, AppState};
use ledgerflow::services::{StatementService, StreamingCsvProcessor};
use ledgerflow::storage::MemoryStore;
use ledgerflow::utils::retry::RetryConfig;

struct TestApp {
    server: TestServer,
    repo: Arc<MemoryStore>,
    bus: Arc<ChannelEventBus>,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryStore::new());

    let bus = Arc::new(ChannelEventBus::new(ChannelConfig {
        channel_buffer: 100,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    }));

    let consumer = Arc::new(ReconciliationConsumer::new(repo.clone(), 5));
    bus.subscribe(EventType::Reconciliation, consumer)
        .await
        .unwrap();
    bus.start().await.unwrap();

    let processor = Arc::new(StreamingCsvProcessor::new(bus.clone(), repo.clone()));
    let service = Arc::new(StatementService::new(
        repo.clone(),
        processor,
        bus.cancellation_token().child_token(),
    ));

    let server = TestServer::new(router(AppState::new(service))).unwrap();

    TestApp { server, repo, bus }
}

async fn upload_csv(app: &TestApp, csv: &str) -> Uuid {
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(csv.as_bytes().to_vec())
            .file_name("statement.csv")
            .mime_type("text/csv"),
    );

    let response = app.server.post("/statements").multipart(form).await;
    response.assert_status(StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert_eq!(body["status"], "processing");
    body["upload_id"].as_str().unwrap().parse().unwrap()
}

/// Wait until the upload is finalized and `processed_rows` reaches the
/// expected count, i.e. the queue has drained.
async fn wait_for_drain(app: &TestApp, upload_id: Uuid, expected_rows: u64) {
    for _ in 0..500 {
        if let Ok(upload) = app.repo.get_upload(upload_id).await {
            if upload.status != UploadStatus::Processing && upload.processed_rows >= expected_rows
            {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upload {upload_id} did not drain to {expected_rows} rows");
}

const MIXED_CSV: &str = "\
1674507883,JOHN DOE,DEBIT,250000,SUCCESS,restaurant
1674507884,JANE DOE,CREDIT,500000,SUCCESS,salary
1674507885,BOB SMITH,DEBIT,100000,FAILED,invalid transaction
1674507886,ALICE WONDER,CREDIT,300000,PENDING,pending payment
";

#[tokio::test]
async fn test_statement_upload_flow() {
    let app = spawn_app().await;

    let upload_id = upload_csv(&app, MIXED_CSV).await;
    wait_for_drain(&app, upload_id, 4).await;

    // Balance counts only SUCCESS rows: +500000 -250000
    let response = app
        .server
        .get("/balance")
        .add_query_param("upload_id", upload_id.to_string())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["upload_id"], upload_id.to_string());
    assert_eq!(body["balance"], 250000);

    // Issues are the FAILED and PENDING rows, in row order
    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", upload_id.to_string())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["per_page"], 10);

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let mut by_line: Vec<_> = items.iter().collect();
    by_line.sort_by_key(|item| item["line_number"].as_u64().unwrap());
    assert_eq!(by_line[0]["counterparty"], "BOB SMITH");
    assert_eq!(by_line[0]["status"], "FAILED");
    assert_eq!(by_line[0]["line_number"], 3);
    assert_eq!(by_line[1]["counterparty"], "ALICE WONDER");
    assert_eq!(by_line[1]["status"], "PENDING");
    assert_eq!(by_line[1]["line_number"], 4);
}

#[tokio::test]
async fn test_issues_status_filter() {
    let app = spawn_app().await;

    let upload_id = upload_csv(&app, MIXED_CSV).await;
    wait_for_drain(&app, upload_id, 4).await;

    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", upload_id.to_string())
        .add_query_param("status", "FAILED")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 1);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["counterparty"], "BOB SMITH");
    assert_eq!(items[0]["line_number"], 3);

    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", upload_id.to_string())
        .add_query_param("status", "PENDING")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["counterparty"], "ALICE WONDER");
}

#[tokio::test]
async fn test_issues_pagination() {
    let app = spawn_app().await;

    let csv = "\
1674507883,USER1,DEBIT,100000,FAILED,error1
1674507884,USER2,DEBIT,100000,FAILED,error2
1674507885,USER3,DEBIT,100000,FAILED,error3
1674507886,USER4,DEBIT,100000,FAILED,error4
1674507887,USER5,DEBIT,100000,FAILED,error5
";
    let upload_id = upload_csv(&app, csv).await;
    wait_for_drain(&app, upload_id, 5).await;

    let mut seen = Vec::new();
    for (page, expected_len) in [(1, 2), (2, 2), (3, 1)] {
        let response = app
            .server
            .get("/transactions/issues")
            .add_query_param("upload_id", upload_id.to_string())
            .add_query_param("page", page.to_string())
            .add_query_param("per_page", "2")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 5);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), expected_len);
        seen.extend(
            items
                .iter()
                .map(|item| item["line_number"].as_u64().unwrap()),
        );
    }

    // Pages concatenate to the full set without duplicates or gaps
    seen.sort_unstable();
    assert_eq!(seen, [1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_query_param_defaults() {
    let app = spawn_app().await;

    let upload_id = upload_csv(&app, MIXED_CSV).await;
    wait_for_drain(&app, upload_id, 4).await;

    // Unparseable paging values fall back to defaults rather than failing
    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", upload_id.to_string())
        .add_query_param("page", "zero")
        .add_query_param("per_page", "-1")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["page"], 1);
    assert_eq!(body["per_page"], 10);
}

#[tokio::test]
async fn test_unknown_upload_is_404() {
    let app = spawn_app().await;

    let response = app
        .server
        .get("/balance")
        .add_query_param("upload_id", "nonexistent")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .get("/balance")
        .add_query_param("upload_id", Uuid::new_v4().to_string())
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", Uuid::new_v4().to_string())
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_requests() {
    let app = spawn_app().await;

    // Missing upload_id
    let response = app.server.get("/balance").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app.server.get("/transactions/issues").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // Bad status filter
    let upload_id = upload_csv(&app, MIXED_CSV).await;
    let response = app
        .server
        .get("/transactions/issues")
        .add_query_param("upload_id", upload_id.to_string())
        .add_query_param("status", "SUCCESS")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // Missing file field
    let response = app
        .server
        .post("/statements")
        .multipart(MultipartForm::new())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "file is required");
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(!body["timestamp"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_row_skipped_and_upload_completes() {
    let app = spawn_app().await;

    let csv = "\
1674507883,JOHN DOE,DEBIT,250000,SUCCESS,restaurant
1674507884,JANE DOE,CREDIT,500000,SUCCESS
1674507885,BOB SMITH,CREDIT,100000,SUCCESS,refund
";
    let upload_id = upload_csv(&app, csv).await;
    wait_for_drain(&app, upload_id, 2).await;

    let upload = app.repo.get_upload(upload_id).await.unwrap();
    assert_eq!(upload.status, UploadStatus::Completed);
    assert_eq!(upload.processed_rows, 2);

    let response = app
        .server
        .get("/balance")
        .add_query_param("upload_id", upload_id.to_string())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["balance"], -250000 + 100000);
}

#[tokio::test]
async fn test_upload_status_is_terminal_after_drain() {
    let app = spawn_app().await;

    let upload_id = upload_csv(&app, MIXED_CSV).await;
    wait_for_drain(&app, upload_id, 4).await;

    let upload = app.repo.get_upload(upload_id).await.unwrap();
    assert_eq!(upload.status, UploadStatus::Completed);
    assert!(upload.completed_at.is_some());

    // Shutdown drains cleanly and stops all workers
    app.bus.shutdown(Duration::from_secs(2)).await.unwrap();

    // No further mutation after shutdown returned
    let before = app.repo.get_upload(upload_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = app.repo.get_upload(upload_id).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_duplicate_event_ids_apply_once() {
    // Publish two events with the same id straight onto the bus: exactly
    // one ledger apply is observed.
    let app = spawn_app().await;
    let upload_id = Uuid::new_v4();
    app.repo.create_upload(upload_id).await.unwrap();

    use ledgerflow::bus::{Event, EventPayload, ReconciliationEvent};
    use ledgerflow::domain::{Transaction, TransactionStatus, TransactionType};

    let make = |amount: i64| {
        Event::new(
            format!("{upload_id}-1"),
            EventPayload::Reconciliation(ReconciliationEvent {
                upload_id,
                transaction: Transaction {
                    timestamp: 1674507883,
                    counterparty: "JOHN DOE".to_string(),
                    kind: TransactionType::Credit,
                    amount,
                    status: TransactionStatus::Success,
                    description: "salary".to_string(),
                },
                line_number: 1,
            }),
        )
    };

    let cancel = CancellationToken::new();
    app.bus.publish(&cancel, make(500000)).await.unwrap();

    // Wait for the first apply before publishing the duplicate so the
    // idempotency check observes a committed event id.
    for _ in 0..500 {
        if app.repo.get_upload(upload_id).await.unwrap().processed_rows == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    app.bus.publish(&cancel, make(999999)).await.unwrap();
    // Give the duplicate a chance to (incorrectly) apply
    tokio::time::sleep(Duration::from_millis(100)).await;

    let upload = app.repo.get_upload(upload_id).await.unwrap();
    assert_eq!(upload.processed_rows, 1);

    let response = app
        .server
        .get("/balance")
        .add_query_param("upload_id", upload_id.to_string())
        .await;
    let body: Value = response.json();
    assert_eq!(body["balance"], 500000);
}
