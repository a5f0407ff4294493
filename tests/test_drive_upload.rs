use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Json;
use keyterm_imagegen::drive::{DriveCredentials, DriveUploader};
use keyterm_imagegen::error::BatchError;
use serde_json::json;
use url::Url;

#[derive(Clone, Debug)]
struct SeenUpload {
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
}

async fn serve(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    Url::parse(&format!("http://{addr}/")).expect("base url")
}

#[tokio::test]
async fn upload_sends_multipart_related_and_returns_view_link() {
    let seen: Arc<Mutex<Vec<SeenUpload>>> = Arc::default();
    let app = Router::new().route(
        "/upload/drive/v3/files",
        post({
            let seen = seen.clone();
            move |Query(query): Query<HashMap<String, String>>, headers: HeaderMap, body: Bytes| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(SeenUpload {
                        query,
                        headers,
                        body,
                    });
                    Json(json!({"id": "1AbCdEf"}))
                }
            }
        }),
    );
    let base = serve(app).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("3_1700000000.png");
    std::fs::write(&path, b"\x89PNG fake image").expect("write image");

    let uploader = DriveUploader::new(
        reqwest::Client::new(),
        "folder-123",
        base,
        DriveCredentials::access_token("ya29.test"),
    );
    let link = uploader
        .upload_file("3_1700000000.png", &path)
        .await
        .expect("upload");
    assert_eq!(link, "https://drive.google.com/file/d/1AbCdEf/view");

    let seen = seen.lock().unwrap();
    let upload = &seen[0];
    assert_eq!(upload.query["uploadType"], "multipart");
    assert_eq!(upload.query["fields"], "id");
    assert_eq!(upload.headers["authorization"], "Bearer ya29.test");

    let content_type = upload.headers["content-type"].to_str().expect("ascii");
    let boundary = content_type
        .strip_prefix("multipart/related; boundary=")
        .expect("multipart/related");

    let body = String::from_utf8_lossy(&upload.body);
    assert!(body.starts_with(&format!("--{boundary}\r\n")));
    assert!(body.contains(r#""name":"3_1700000000.png""#));
    assert!(body.contains(r#""parents":["folder-123"]"#));
    assert!(body.contains("Content-Type: image/png\r\n\r\n"));
    assert!(body.contains("PNG fake image"));
    assert!(body.ends_with(&format!("\r\n--{boundary}--\r\n")));
}

#[tokio::test]
async fn upload_failure_is_an_error() {
    let app = Router::new().route(
        "/upload/drive/v3/files",
        post(|| async { (StatusCode::FORBIDDEN, "insufficient permissions") }),
    );
    let base = serve(app).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("0_1.png");
    std::fs::write(&path, b"png").expect("write image");

    let uploader = DriveUploader::new(
        reqwest::Client::new(),
        "folder-123",
        base,
        DriveCredentials::access_token("ya29.test"),
    );
    let err = uploader
        .upload_file("0_1.png", &path)
        .await
        .expect_err("should fail");
    match err {
        BatchError::Upload(msg) => assert!(msg.contains("insufficient permissions"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_local_file_is_an_io_error() {
    let uploader = DriveUploader::new(
        reqwest::Client::new(),
        "folder-123",
        Url::parse("http://127.0.0.1:9/").expect("url"),
        DriveCredentials::access_token("ya29.test"),
    );
    let err = uploader
        .upload_file("missing.png", std::path::Path::new("/nonexistent/missing.png"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, BatchError::Io(_)), "{err}");
}
