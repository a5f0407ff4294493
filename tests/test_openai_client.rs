use std::sync::{Arc, Mutex};

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Json;
use keyterm_imagegen::error::BatchError;
use keyterm_imagegen::openai::{Completion, ImageGeneration, OpenAiClient};
use serde_json::{Value, json};
use url::Url;

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

fn client(base: Url) -> OpenAiClient {
    OpenAiClient::new(reqwest::Client::new(), "sk-test", base)
        .with_organization(Some("org-test".to_string()))
}

#[tokio::test]
async fn completion_returns_tool_arguments() {
    let seen: Arc<Mutex<Vec<(HeaderMap, Value)>>> = Arc::default();
    let app = Router::new().route(
        "/v1/chat/completions",
        post({
            let seen = seen.clone();
            move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((headers, body));
                    Json(json!({
                        "choices": [{
                            "message": {
                                "role": "assistant",
                                "content": null,
                                "tool_calls": [{
                                    "id": "call_1",
                                    "type": "function",
                                    "function": {
                                        "name": "generate_image",
                                        "arguments": "{\"imagePrompt\": \"a red fox\"}"
                                    }
                                }]
                            }
                        }]
                    }))
                }
            }
        }),
    );
    let base = serve(app).await;

    let completion = client(base)
        .create_completion("red fox")
        .await
        .expect("completion");
    assert_eq!(
        completion,
        Completion::Arguments("{\"imagePrompt\": \"a red fox\"}".to_string())
    );

    let seen = seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["authorization"], "Bearer sk-test");
    assert_eq!(headers["openai-organization"], "org-test");
    assert_eq!(body["model"], "gpt-4-0613");
    assert_eq!(body["temperature"], 1.0);
    assert_eq!(body["messages"][0]["content"], "red fox");
    assert_eq!(body["tool_choice"]["function"]["name"], "generate_image");
}

#[tokio::test]
async fn completion_rate_limit_is_reported() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    );
    let base = serve(app).await;
    let completion = client(base)
        .create_completion("red fox")
        .await
        .expect("completion");
    assert_eq!(completion, Completion::RateLimited);
}

#[tokio::test]
async fn completion_without_tool_call_is_an_error() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({"choices": [{"message": {"content": "no tools today"}}]}))
        }),
    );
    let base = serve(app).await;
    let err = client(base)
        .create_completion("red fox")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BatchError::Response(_)), "{err}");
}

#[tokio::test]
async fn image_success_is_decoded() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let app = Router::new().route(
        "/v1/images/generations",
        post({
            let seen = seen.clone();
            move |Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(body);
                    Json(json!({
                        "created": 1,
                        "data": [{"b64_json": "iVBORw0K", "revised_prompt": "a red fox at dawn"}]
                    }))
                }
            }
        }),
    );
    let base = serve(app).await;

    let generated = client(base)
        .generate_image("a red fox")
        .await
        .expect("image");
    assert_eq!(
        generated,
        ImageGeneration::Generated {
            bytes: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a],
            revised_prompt: "a red fox at dawn".to_string(),
        }
    );

    let body = seen.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "dall-e-3");
    assert_eq!(body["prompt"], "a red fox");
    assert_eq!(body["quality"], "hd");
    assert_eq!(body["size"], "1024x1792");
    assert_eq!(body["response_format"], "b64_json");
}

#[tokio::test]
async fn image_bad_base64_is_an_error() {
    let app = Router::new().route(
        "/v1/images/generations",
        post(|| async { Json(json!({"data": [{"b64_json": "!!not base64!!"}]})) }),
    );
    let base = serve(app).await;
    let err = client(base)
        .generate_image("a red fox")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BatchError::Decode(_)), "{err}");
}

#[tokio::test]
async fn image_statuses_are_classified() {
    let app = Router::new()
        .route(
            "/rejected/v1/images/generations",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"message": "Your request was rejected as a result of our safety system."}})),
                )
            }),
        )
        .route(
            "/limited/v1/images/generations",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        )
        .route(
            "/down/v1/images/generations",
            post(|| async { StatusCode::BAD_GATEWAY }),
        );
    let base = serve(app).await;

    let rejected = client(base.join("rejected/").expect("url"))
        .generate_image("a fox")
        .await
        .expect("rejected");
    assert_eq!(
        rejected,
        ImageGeneration::ContentPolicyRejected {
            message: "Your request was rejected as a result of our safety system.".to_string()
        }
    );

    let limited = client(base.join("limited/").expect("url"))
        .generate_image("a fox")
        .await
        .expect("limited");
    assert_eq!(limited, ImageGeneration::RateLimited);

    let down = client(base.join("down/").expect("url"))
        .generate_image("a fox")
        .await
        .expect("down");
    assert_eq!(down, ImageGeneration::NetworkError { status: 502 });
}
