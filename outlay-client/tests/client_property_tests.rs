use bytes::Bytes;
use outlay_client::config::{AuthConfig, CacheSettings, ClientConfig, LogConfig, UploadConfig};
use outlay_client::expenses::{detail_key, list_key};
use outlay_client::upload::{LocalFile, Stage, UploadError, UploadPhase, UploadSettings};
use outlay_client::{ClientError, ExpenseClient};
use outlay_core::{ExpenseDraft, ExpenseList, RequestFailed, ValidationError};
use outlay_sync::{CacheConfig, Freshness};
use outlay_test_utils::strategies::{arb_amount, arb_expense_id, arb_title};
use outlay_test_utils::{
    expense, expense_envelope_value, expense_list_value, sign_response, Method, MockFetcher,
    MockObjectStore,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://localhost:3000/api".to_string(),
        request_timeout_ms: 5_000,
        auth: AuthConfig {
            session_cookie: Some("session=test".to_string()),
            bearer_token: None,
        },
        cache: CacheSettings {
            stale_time_ms: 5_000,
            read_retries: 0,
            event_capacity: 16,
        },
        upload: UploadConfig {
            default_content_type: "application/octet-stream".to_string(),
            max_file_bytes: 1024,
        },
        log: LogConfig {
            filter: "outlay=debug".to_string(),
            json: false,
        },
    }
}

fn client(fetcher: &Arc<MockFetcher>, store: &Arc<MockObjectStore>) -> ExpenseClient {
    ExpenseClient::from_parts(
        fetcher.clone(),
        store.clone(),
        CacheConfig::default(),
        UploadSettings {
            default_content_type: "application/octet-stream".to_string(),
            max_file_bytes: 1024,
        },
    )
}

fn receipt() -> LocalFile {
    LocalFile::new("lunch.png", Bytes::from_static(b"png-bytes"))
}

fn signing_fetcher() -> MockFetcher {
    MockFetcher::new().with_post(
        "/upload/sign",
        sign_response("https://store.example/put/abc", "receipts/abc.png"),
    )
}

#[test]
fn config_requires_base_url() {
    let mut config = base_config();
    config.api_base_url = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn config_requires_event_capacity() {
    let mut config = base_config();
    config.cache.event_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_connects() {
    let config = base_config();
    assert!(config.validate().is_ok());
    assert!(ExpenseClient::connect(&config).is_ok());
}

#[tokio::test]
async fn sign_failure_never_transfers() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_post_error("/upload/sign", RequestFailed::status(401, "unauthorized")),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let mut session = client.uploads().start(7, Some(receipt())).unwrap();
    let err = client.uploads().run(&mut session).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Sign));
    assert_eq!(store.put_count(), 0);
    assert!(fetcher.calls_to(Method::Patch, "/expenses/7").is_empty());
    assert!(matches!(
        session.phase(),
        UploadPhase::Failed { stage: Stage::Sign, .. }
    ));
}

#[tokio::test]
async fn incomplete_signing_response_is_a_sign_failure() {
    let fetcher = Arc::new(
        MockFetcher::new().with_post("/upload/sign", json!({ "uploadUrl": "https://store/x" })),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let err = client.uploads().upload(7, Some(receipt())).await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::Sign {
            source: RequestFailed::MalformedResponse { .. },
            ..
        }
    ));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn transfer_failure_never_attaches() {
    let fetcher = Arc::new(signing_fetcher());
    let store = Arc::new(MockObjectStore::failing(RequestFailed::status(403, "expired")));
    let client = client(&fetcher, &store);

    let err = client.uploads().upload(7, Some(receipt())).await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Transfer));
    assert_eq!(err.object_key(), Some("receipts/abc.png"));
    assert!(!err.is_orphan());
    assert!(fetcher.calls_to(Method::Patch, "/expenses/7").is_empty());
}

#[tokio::test]
async fn attach_failure_reports_orphan() {
    let fetcher = Arc::new(
        signing_fetcher().with_patch_error("/expenses/7", RequestFailed::status(500, "db down")),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);
    client
        .cache()
        .set(&detail_key(7), json!({ "expense": expense(7, "Lunch", 12.5) }));

    let mut session = client.uploads().start(7, Some(receipt())).unwrap();
    let err = client.uploads().run(&mut session).await.unwrap_err();

    assert!(err.is_orphan());
    assert_eq!(err.object_key(), Some("receipts/abc.png"));
    assert_eq!(err.destination(), Some("https://store.example/put/abc"));
    assert_eq!(session.object_key(), Some("receipts/abc.png"));
    assert_eq!(store.put_count(), 1);

    // The speculative reference was rolled back.
    assert_eq!(
        client.cache().get(&detail_key(7)),
        Some(json!({ "expense": expense(7, "Lunch", 12.5) }))
    );
}

#[tokio::test]
async fn retry_attach_links_orphan_without_reupload() {
    let fetcher = Arc::new(
        signing_fetcher()
            .with_patch_error("/expenses/7", RequestFailed::transport("reset"))
            .with_patch("/expenses/7", json!({ "expense": {
                "id": 7, "title": "Lunch", "amount": 12.5, "fileReference": "receipts/abc.png"
            }})),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let orphan = match client.uploads().upload(7, Some(receipt())).await {
        Err(UploadError::Attach(orphan)) => orphan,
        other => panic!("expected orphan, got {:?}", other),
    };
    let receipt = client.uploads().retry_attach(&orphan).await.unwrap();

    assert_eq!(receipt.object_key, "receipts/abc.png");
    assert_eq!(
        receipt.expense.and_then(|e| e.file_reference),
        Some("receipts/abc.png".to_string())
    );
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn successful_upload_attaches_and_invalidates() {
    let fetcher = Arc::new(signing_fetcher().with_patch("/expenses/7", json!({ "expense": {
        "id": 7, "title": "Lunch", "amount": 12.5, "fileUrl": "receipts/abc.png"
    }})));
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);
    client
        .cache()
        .set(&list_key(), expense_list_value(&[expense(7, "Lunch", 12.5)]));

    let receipt = client
        .uploads()
        .upload(7, Some(receipt().with_content_type("image/png")))
        .await
        .unwrap();
    assert_eq!(receipt.expense.unwrap().file_reference.as_deref(), Some("receipts/abc.png"));

    let put = &store.puts()[0];
    assert_eq!(put.destination, "https://store.example/put/abc");
    assert_eq!(put.content_type, "image/png");
    assert_eq!(put.body, Bytes::from_static(b"png-bytes"));

    let sign = &fetcher.calls_to(Method::Post, "/upload/sign")[0];
    assert_eq!(sign.body, json!({ "filename": "lunch.png", "contentType": "image/png" }));
    let patch = &fetcher.calls_to(Method::Patch, "/expenses/7")[0];
    assert_eq!(patch.body, json!({ "fileReference": "receipts/abc.png" }));

    assert!(client.cache().entry(&list_key()).unwrap().is_stale());
}

#[tokio::test]
async fn missing_file_fails_before_network() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let err = client.uploads().upload(7, None).await.unwrap_err();
    assert_eq!(err, UploadError::Validation(ValidationError::required("file")));

    let err = client
        .uploads()
        .upload(7, Some(LocalFile::new("big.bin", vec![0u8; 2048])))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Validation(ValidationError::InvalidValue { .. })));
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn unknown_extension_uses_default_content_type() {
    let fetcher = Arc::new(signing_fetcher().with_patch("/expenses/7", json!({})));
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let receipt = client
        .uploads()
        .upload(7, Some(LocalFile::new("scan.raw", vec![1u8, 2, 3])))
        .await
        .unwrap();
    assert!(receipt.expense.is_none());
    assert_eq!(store.puts()[0].content_type, "application/octet-stream");
}

#[tokio::test]
async fn create_is_replaced_by_server_id_after_refetch() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_post("/expenses", expense_envelope_value(&expense(42, "Coffee", 4.0)))
            .with_get(
                "/expenses",
                expense_list_value(&[expense(1, "Taxi", 12.0), expense(42, "Coffee", 4.0)]),
            ),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);
    client
        .cache()
        .set(&list_key(), expense_list_value(&[expense(1, "Taxi", 12.0)]));

    let created = client
        .expenses()
        .create(&ExpenseDraft::new("Coffee", 4.0))
        .await
        .unwrap();
    assert_eq!(created.id, 42);

    let list = client
        .expenses()
        .list(Freshness::best_effort(std::time::Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(list.was_cache_miss());
    assert_eq!(list.value().ids(), vec![1, 42]);
    assert!(list.value().expenses.iter().all(|e| !e.is_provisional()));
}

#[tokio::test]
async fn delete_failure_surfaces_status() {
    let fetcher = Arc::new(
        MockFetcher::new().with_delete_error("/expenses/7", RequestFailed::status(404, "gone")),
    );
    let store = Arc::new(MockObjectStore::new());
    let client = client(&fetcher, &store);

    let err = client.expenses().delete(7).await.unwrap_err();
    match err {
        ClientError::Mutation(failed) => {
            assert_eq!(failed.key, list_key());
            assert_eq!(failed.source.status_code(), Some(404));
        }
        other => panic!("unexpected error: {other}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn timeout_must_be_positive(timeout in 0u64..=1) {
        let mut config = base_config();
        config.request_timeout_ms = timeout;
        prop_assert_eq!(config.validate().is_ok(), timeout > 0);
    }

    /// The provisional row is visible synchronously and never survives the
    /// refetch that follows the server's answer.
    #[test]
    fn prop_create_uses_server_id(
        title in arb_title(),
        amount in arb_amount(),
        server_id in arb_expense_id()
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let trimmed = title.trim().to_string();
            let created = expense(server_id, &trimmed, amount);
            let fetcher = Arc::new(
                MockFetcher::new()
                    .with_post("/expenses", expense_envelope_value(&created))
                    .with_get("/expenses", expense_list_value(std::slice::from_ref(&created))),
            );
            let store = Arc::new(MockObjectStore::new());
            let client = client(&fetcher, &store);
            client.cache().set(&list_key(), expense_list_value(&[]));

            let confirmed = client
                .expenses()
                .create(&ExpenseDraft::new(title.clone(), amount))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(confirmed.id, server_id);

            let cached: ExpenseList = client
                .cache()
                .get(&list_key())
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            prop_assert_eq!(cached.expenses.len(), 1);
            prop_assert!(cached.expenses[0].is_provisional());

            let list = client
                .expenses()
                .list(Freshness::consistent())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(list.value().ids(), vec![server_id]);
            Ok(())
        })?;
    }
}
