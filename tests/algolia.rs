use std::path::Path;
use std::time::Duration;

use docsearch::index::{AlgoliaIndex, IndexService, IndexSettings, StaleFilter};
use docsearch::loader::parse_document;
use docsearch::sync::{IndexSynchronizer, SyncOptions, SyncPhase};
use docsearch::{extract, synthesize, BatchStamp, IndexError, SearchRecord};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer) -> AlgoliaIndex {
    AlgoliaIndex::new(
        "APPID",
        "secret",
        "docs",
        Some(Url::parse(&server.uri()).unwrap()),
        Duration::from_secs(5),
        3,
    )
    .unwrap()
    .with_retry_base(Duration::from_millis(1))
    .with_task_polling(Duration::from_millis(1), 3)
}

fn records() -> Vec<SearchRecord> {
    let doc = parse_document(
        Path::new("setup.mdx"),
        "/docs/setup".to_string(),
        "---\ntitle: Setup\n---\n\nInstall the package.\n",
    )
    .unwrap();
    let units = extract(&doc.title, &doc.tree);
    synthesize(&doc, units)
}

async fn mount_task(server: &MockServer, task_id: u64, status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/1/indexes/docs/task/{task_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": status })))
        .mount(server)
        .await;
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test]
async fn upsert_sends_batch_and_waits_for_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .and(header("x-algolia-application-id", "APPID"))
        .and(header("x-algolia-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "taskID": 7 })))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 7, "published").await;

    client(&server).upsert(&records()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let batch = body(&requests[0]);
    let actions: Vec<&str> = batch["requests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["updateObject", "updateObject"]);
    assert_eq!(batch["requests"][1]["body"]["objectID"], "/docs/setup#main-1");
    assert_eq!(batch["requests"][1]["body"]["content"], "Install the package.");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "taskID": 8 })))
        .mount(&server)
        .await;
    mount_task(&server, 8, "published").await;

    client(&server).upsert(&records()).await.unwrap();
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).upsert(&records()).await.unwrap_err();
    match err {
        IndexError::Status { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "invalid key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unpublished_task_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/1/indexes/docs/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "taskID": 9 })))
        .mount(&server)
        .await;
    mount_task(&server, 9, "notPublished").await;

    let err = client(&server)
        .configure(&IndexSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::TaskTimeout {
            task_id: 9,
            attempts: 3
        }
    ));
}

#[tokio::test]
async fn oversized_delete_is_rejected_locally() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (0..1001).map(|n| format!("id-{n}")).collect();
    let err = client(&server).delete(&ids).await.unwrap_err();
    assert!(matches!(err, IndexError::Limit(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn browse_follows_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/browse"))
        .and(body_partial_json(json!({ "cursor": "page-2" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "hits": [{ "objectID": "c" }] })),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/browse"))
        .and(body_partial_json(json!({
            "filters": "branch:\"main\" AND NOT record_batch:\"b2\"",
            "attributesToRetrieve": ["objectID"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{ "objectID": "a" }, { "objectID": "b" }],
            "cursor": "page-2"
        })))
        .mount(&server)
        .await;

    let index = client(&server);
    let filter = StaleFilter::new("main", "b2");
    let first = index.browse(&filter, None).await.unwrap();
    assert_eq!(first.object_ids, vec!["a", "b"]);
    assert_eq!(first.cursor.as_deref(), Some("page-2"));

    let second = index.browse(&filter, first.cursor.as_deref()).await.unwrap();
    assert_eq!(second.object_ids, vec!["c"]);
    assert_eq!(second.cursor, None);
}

#[tokio::test]
async fn sync_upserts_then_deletes_stale_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "taskID": 1 })))
        .mount(&server)
        .await;
    mount_task(&server, 1, "published").await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/browse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{ "objectID": "old-1" }, { "objectID": "old-2" }]
        })))
        .mount(&server)
        .await;

    let index = client(&server);
    let mut sync = IndexSynchronizer::new(&index, SyncOptions::default());
    let report = sync
        .run(records(), &BatchStamp::new("b2", "main"))
        .await
        .unwrap();
    assert_eq!(sync.phase(), SyncPhase::Done);
    assert_eq!(report.stale_deleted, 2);

    let requests = server.received_requests().await.unwrap();
    let batches: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/1/indexes/docs/batch")
        .map(body)
        .collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["requests"][0]["body"]["record_batch"], "b2");
    assert_eq!(batches[0]["requests"][0]["body"]["branch"], "main");
    assert_eq!(
        batches[1],
        json!({
            "requests": [
                { "action": "deleteObject", "body": { "objectID": "old-1" } },
                { "action": "deleteObject", "body": { "objectID": "old-2" } }
            ]
        })
    );
}

#[tokio::test]
async fn failed_upsert_skips_cleanup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/batch"))
        .respond_with(ResponseTemplate::new(400).set_body_string("record too big"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1/indexes/docs/browse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let index = client(&server);
    let mut sync = IndexSynchronizer::new(&index, SyncOptions::default());
    assert!(sync
        .run(records(), &BatchStamp::new("b2", "main"))
        .await
        .is_err());
    assert_eq!(sync.phase(), SyncPhase::Failed);
}
