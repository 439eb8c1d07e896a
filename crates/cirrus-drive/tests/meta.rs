//! Drive-tier tests against an in-process mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use cirrus_core::Error;
use cirrus_drive::folders::CreateFolderRequest;
use cirrus_drive::{ConsistencyTracker, CreateMetaRequest, DriveClient, ExistenceQuery, ListOptions};
use cirrus_network::{build_client, Endpoints};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn drive_client(base: &str, window: Duration) -> DriveClient {
    DriveClient::new(
        build_client("cirrus-test").unwrap(),
        Endpoints::new(base),
        "test-jwt".to_string(),
        ConsistencyTracker::new(window),
    )
}

fn meta_request() -> CreateMetaRequest {
    CreateMetaRequest::new(
        "report",
        "bucket-1",
        Some("network-id".into()),
        "folder-uuid",
        "pdf",
        1024,
        Utc::now(),
    )
}

fn meta_json(uuid: &str) -> serde_json::Value {
    serde_json::json!({
        "uuid": uuid,
        "plainName": "report",
        "type": "pdf",
        "bucket": "bucket-1",
        "fileId": "network-id",
        "size": 1024
    })
}

#[tokio::test]
async fn create_meta_sends_bearer_and_payload() {
    let app = Router::new().route(
        "/drive/files",
        post(
            |headers: axum::http::HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(
                    headers.get("authorization").unwrap().to_str().unwrap(),
                    "Bearer test-jwt"
                );
                assert_eq!(
                    headers.get("internxt-version").unwrap().to_str().unwrap(),
                    "v1.0.436"
                );
                assert_eq!(
                    headers.get("internxt-client").unwrap().to_str().unwrap(),
                    "cirrus-test"
                );
                assert_eq!(body["encryptVersion"], "03-aes");
                assert_eq!(body["folderUuid"], "folder-uuid");
                Json(meta_json("meta-uuid"))
            },
        ),
    );
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let meta = client
        .create_meta(&CancellationToken::new(), &meta_request())
        .await
        .unwrap();
    assert_eq!(meta.uuid, "meta-uuid");
    assert_eq!(meta.size_bytes(), 1024);
}

#[tokio::test]
async fn create_meta_retries_once_on_404() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/drive/files",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::NOT_FOUND, "folder not found").into_response()
                } else {
                    Json(meta_json("meta-uuid")).into_response()
                }
            }),
        )
        .with_state(calls.clone());
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let start = Instant::now();
    let meta = client
        .create_meta(&CancellationToken::new(), &meta_request())
        .await
        .unwrap();

    assert_eq!(meta.uuid, "meta-uuid");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "expected exactly 2 calls");
    assert!(
        start.elapsed() >= Duration::from_millis(450),
        "retry must wait ~500ms, waited {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn create_meta_gives_up_after_second_404() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/drive/files",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, "folder not found")
            }),
        )
        .with_state(calls.clone());
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let err = client
        .create_meta(&CancellationToken::new(), &meta_request())
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2, "expected exactly 2 calls");
    assert!(matches!(err, Error::CreateMetaFailed(_)));
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn create_meta_does_not_retry_other_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/drive/files",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (StatusCode::BAD_REQUEST, "invalid payload")
            }),
        )
        .with_state(calls.clone());
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let err = client
        .create_meta(&CancellationToken::new(), &meta_request())
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn create_meta_waits_out_folder_consistency_window() {
    let app = Router::new()
        .route(
            "/drive/folders",
            post(|| async {
                Json(serde_json::json!({ "uuid": "fresh-folder", "plainName": "docs" }))
            }),
        )
        .route("/drive/files", post(|| async { Json(meta_json("meta-uuid")) }));
    let base = serve(app).await;

    let window = Duration::from_millis(300);
    let client = drive_client(&base, window);
    let cancel = CancellationToken::new();

    let folder = client
        .create_folder(
            &cancel,
            CreateFolderRequest {
                plain_name: "docs".into(),
                parent_folder_uuid: "root".into(),
                creation_time: String::new(),
                modification_time: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(folder.uuid, "fresh-folder");

    let mut req = meta_request();
    req.folder_uuid = "fresh-folder".into();

    let start = Instant::now();
    client.create_meta(&cancel, &req).await.unwrap();
    assert!(
        start.elapsed() >= Duration::from_millis(200),
        "create_meta should wait for the consistency window, waited {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn delete_and_rename_roundtrip() {
    let app = Router::new()
        .route(
            "/drive/files/{uuid}",
            delete(|Path(uuid): Path<String>| async move {
                assert_eq!(uuid, "file-1");
                StatusCode::OK
            }),
        )
        .route(
            "/drive/files/{uuid}/meta",
            put(
                |Path(uuid): Path<String>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(uuid, "file-2");
                    assert_eq!(body["plainName"], "renamed");
                    assert_eq!(body["type"], "txt");
                    StatusCode::OK
                },
            ),
        );
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let cancel = CancellationToken::new();

    client.delete_file(&cancel, "file-1").await.unwrap();
    client
        .rename_file(&cancel, "file-2", "renamed", Some("txt"))
        .await
        .unwrap();
}

#[tokio::test]
async fn existence_check_roundtrip() {
    let app = Router::new().route(
        "/drive/folders/content/{parent}/files/existence",
        post(|Json(body): Json<serde_json::Value>| async move {
            assert_eq!(body["files"][0]["plainName"], "report");
            Json(serde_json::json!({
                "files": [
                    {"exists": true, "uuid": "existing-uuid", "plainName": "report", "type": "pdf"},
                    {"exists": false, "plainName": "missing", "type": ""}
                ]
            }))
        }),
    );
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let checks = client
        .check_file_existence(
            &CancellationToken::new(),
            "parent-1",
            &[
                ExistenceQuery {
                    plain_name: "report".into(),
                    file_type: "pdf".into(),
                },
                ExistenceQuery {
                    plain_name: "missing".into(),
                    file_type: String::new(),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(checks.len(), 2);
    assert!(checks[0].exists);
    assert_eq!(checks[0].uuid.as_deref(), Some("existing-uuid"));
    assert!(!checks[1].exists);
}

#[tokio::test]
async fn list_all_files_pages_until_short_page() {
    let app = Router::new().route(
        "/drive/folders/content/{parent}/files",
        get(
            |Query(q): Query<std::collections::HashMap<String, String>>| async move {
                let offset: usize = q.get("offset").unwrap().parse().unwrap();
                let count = if offset == 0 { 50 } else { 3 };
                let files: Vec<_> = (0..count)
                    .map(|i| {
                        serde_json::json!({
                            "uuid": format!("file-{}", offset + i),
                            "plainName": format!("f{}", offset + i),
                            "size": 1
                        })
                    })
                    .collect();
                Json(serde_json::json!({ "files": files }))
            },
        ),
    );
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let files = client
        .list_all_files(&CancellationToken::new(), "parent-1")
        .await
        .unwrap();

    assert_eq!(files.len(), 53);
    assert_eq!(files[0].uuid, "file-0");
    assert_eq!(files[52].uuid, "file-52");
}

#[tokio::test]
async fn list_folders_sends_pagination_defaults() {
    let app = Router::new().route(
        "/drive/folders/content/{parent}/folders",
        get(
            |Query(q): Query<std::collections::HashMap<String, String>>| async move {
                assert_eq!(q.get("limit").map(String::as_str), Some("50"));
                assert_eq!(q.get("sort").map(String::as_str), Some("plainName"));
                assert_eq!(q.get("order").map(String::as_str), Some("ASC"));
                Json(serde_json::json!({ "folders": [] }))
            },
        ),
    );
    let base = serve(app).await;

    let client = drive_client(&base, Duration::from_millis(500));
    let folders = client
        .list_folders(&CancellationToken::new(), "parent-1", &ListOptions::default())
        .await
        .unwrap();
    assert!(folders.is_empty());
}
