use contact_sync_client::{SheetColumnLedger, SheetExmailQueue, SheetRecordStore, SheetsClient};
use contact_sync_core::models::{EnrichmentRow, ExmailRequest, StagedBatch};
use contact_sync_core::traits::{ExmailQueue, RecordSource, ResultSink, UnsubscribeLedger};
use contact_sync_core::AppError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::fast_transport;

fn sheets(server: &MockServer) -> SheetsClient {
    SheetsClient::with_base_url(
        fast_transport(),
        "ya29.token",
        "sheet123",
        &format!("{}/v4/spreadsheets", server.uri()),
    )
}

#[tokio::test]
async fn pending_records_use_header_and_row_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet123/values/Sheet1"))
        .and(header("Authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Sheet1!A1:E5",
            "majorDimension": "ROWS",
            "values": [
                ["Username", "User ID", "Profile URL", "Repo", "Done?"],
                ["alice", "1", "https://github.com/alice", "alice/app", "Yes"],
                ["bob", "2", "https://github.com/bob", "bob/lib"],
                ["carol", "3", "https://github.com/carol", "carol/cli", ""],
                ["dave", "4", "", "dave/x"],
                ["erin", "5", "https://github.com/erin", "erin/y", " "]
            ]
        })))
        .mount(&server)
        .await;

    let store = SheetRecordStore::new(sheets(&server));
    let records = store.pending_records().await.unwrap();

    let rows: Vec<_> = records.iter().map(|r| (r.row, r.username.as_str())).collect();
    assert_eq!(rows, vec![(3, "bob"), (4, "carol"), (5, "dave")]);
    assert_eq!(records[0].reference, "https://github.com/bob");
    assert_eq!(records[0].user_id, "2");
    assert_eq!(records[2].reference, "");
}

#[tokio::test]
async fn misplaced_done_column_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet123/values/Sheet1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["Username", "Done?", "User ID", "Profile URL", "Repo"]]
        })))
        .mount(&server)
        .await;

    let err = SheetRecordStore::new(sheets(&server))
        .pending_records()
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfigError(_)));
}

#[tokio::test]
async fn flush_marks_rows_and_appends_in_two_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values:batchUpdate"))
        .and(body_json(json!({
            "valueInputOption": "USER_ENTERED",
            "data": [
                {"range": "Sheet1!E2", "values": [["Yes"]]},
                {"range": "Sheet1!E4", "values": [["Yes"]]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalUpdatedCells": 2})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values/Sheet2!A:E:append"))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .and(body_json(json!({
            "values": [["alice", "1", "https://github.com/alice", "alice@example.com", "alice/app"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updates": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let batch = StagedBatch {
        done_rows: vec![2, 4],
        enrichment_rows: vec![EnrichmentRow {
            username: "alice".into(),
            user_id: "1".into(),
            profile_url: "https://github.com/alice".into(),
            email: "alice@example.com".into(),
            repo: "alice/app".into(),
        }],
    };
    SheetRecordStore::new(sheets(&server))
        .flush(&batch)
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_mark_surfaces_as_sink_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values:batchUpdate"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let batch = StagedBatch {
        done_rows: vec![2],
        enrichment_rows: vec![],
    };
    let err = SheetRecordStore::new(sheets(&server))
        .flush(&batch)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SinkError(_)));
}

#[tokio::test]
async fn failed_append_leaves_rows_unmarked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values/Sheet2!A:E:append"))
        .respond_with(ResponseTemplate::new(504))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values:batchUpdate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let batch = StagedBatch {
        done_rows: vec![2],
        enrichment_rows: vec![EnrichmentRow {
            username: "alice".into(),
            user_id: "1".into(),
            profile_url: "https://github.com/alice".into(),
            email: "alice@example.com".into(),
            repo: "alice/app".into(),
        }],
    };
    let err = SheetRecordStore::new(sheets(&server))
        .flush(&batch)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SinkError(_)));
}

#[tokio::test]
async fn ledger_reads_and_appends_first_column() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet123/values/Unsub!A:A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["known@example.com"], [], ["Other@Example.com"]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values/Unsub!A:A:append"))
        .and(body_json(json!({"values": [["new@example.com"]]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = SheetColumnLedger::new(sheets(&server), "Unsub");
    assert_eq!(
        ledger.emails().await.unwrap(),
        vec!["known@example.com", "", "Other@Example.com"]
    );
    ledger.append("new@example.com").await.unwrap();
}

#[tokio::test]
async fn exmail_queue_skips_done_rows_and_marks_column_b() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet123/values/Exmailing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["recA"],
                ["recB", "Done"],
                [],
                ["recC", "DONE"],
                ["recD", ""]
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet123/values:batchUpdate"))
        .and(body_json(json!({
            "valueInputOption": "USER_ENTERED",
            "data": [{"range": "Exmailing!B5", "values": [["Done"]]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let queue = SheetExmailQueue::new(sheets(&server), "Exmailing");
    assert_eq!(
        queue.pending().await.unwrap(),
        vec![
            ExmailRequest {
                row: 1,
                record_id: "recA".into()
            },
            ExmailRequest {
                row: 5,
                record_id: "recD".into()
            },
        ]
    );
    queue.mark_done(5).await.unwrap();
}
