use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;

use dhanvantri::server::{router, AppState};
use dhanvantri::{ByteStream, Client, EngineConfig, Error, InferenceEngine, Result};

const VALID_SYMPTOMS: &str = "persistent headache for 3 days with nausea and light sensitivity";

const MODEL_REPLY: &str = r#"Based on the description:
{
  "conditions": [
    {"name": "Migraine", "description": "Primary headache disorder", "likelihood": 70, "severity": "medium"},
    {"name": "Viral infection", "description": "Systemic illness", "likelihood": 20, "severity": "low"}
  ],
  "recommendedSpecialist": "Neurologist",
  "insights": [
    {"category": "red_flags", "title": "Warning Signs", "content": "Stiff neck or confusion"},
    {"category": "lifestyle", "title": "Rest", "content": "Dark quiet room"}
  ],
  "confidenceScores": [
    {"condition": "Migraine", "confidence": 70, "reasoning": "Classic features"}
  ]
}"#;

struct FakeEngine {
    reply: Result<String>,
    stream: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeEngine {
    fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            stream: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn streaming(lines: Vec<&'static str>) -> Self {
        Self {
            stream: lines,
            ..Self::new("")
        }
    }

    fn unreachable() -> Self {
        Self {
            reply: Err(Error::UpstreamUnavailable("connection refused".into())),
            ..Self::new("")
        }
    }
}

#[async_trait]
impl InferenceEngine for FakeEngine {
    async fn complete_sync(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(Error::UpstreamUnavailable(e.to_string())),
        }
    }

    async fn stream_generate(&self, prompt: &str) -> Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = &self.reply {
            return Err(Error::UpstreamUnavailable(e.to_string()));
        }
        assert_eq!(prompt, "latest question");
        let chunks: Vec<Result<Bytes>> = self
            .stream
            .iter()
            .map(|s| Ok(Bytes::from_static(s.as_bytes())))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn version(&self) -> Result<String> {
        match &self.reply {
            Ok(_) => Ok("0.0.0-fake".into()),
            Err(e) => Err(Error::UpstreamUnavailable(e.to_string())),
        }
    }
}

fn app(engine: FakeEngine) -> (Router, Arc<FakeEngine>) {
    let engine = Arc::new(engine);
    let state = AppState::new(engine.clone());
    (router(state), engine)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

mod analyze {
    use super::*;

    #[tokio::test]
    async fn test_single_word_is_rejected() {
        let (app, engine) = app(FakeEngine::new(MODEL_REPLY));
        let response = app
            .oneshot(post_json("/analyze", r#"{"symptoms":"headache"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(response).await["error"].as_str().unwrap().contains("at least 10 characters"));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_symptoms_return_structured_analysis() {
        let (app, _) = app(FakeEngine::new(MODEL_REPLY));
        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app
            .oneshot(post_json("/api/analyze-symptoms", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value = read_json(response).await;
        for field in ["conditions", "recommendedSpecialist", "insights", "confidenceScores"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(value["recommendedSpecialist"], "Neurologist");
        assert_eq!(value["conditions"][1]["likelihood"], 20);
    }

    #[tokio::test]
    async fn test_missing_symptoms() {
        let (app, _) = app(FakeEngine::new(MODEL_REPLY));
        let response = app.oneshot(post_json("/analyze", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "Symptoms are required");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (app, _) = app(FakeEngine::new(MODEL_REPLY));
        let response = app
            .oneshot(post_json("/analyze", r#"{"symptoms": 42}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_model_rejection_is_400() {
        let (app, _) = app(FakeEngine::new(
            r#"{"error":"invalid_input","message":"Please describe your actual medical symptoms with proper context"}"#,
        ));
        let response = app
            .oneshot(post_json("/analyze", r#"{"symptoms":"testing fever please"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Please describe your actual medical symptoms with proper context"
        );
    }

    #[tokio::test]
    async fn test_model_rejection_with_numeric_message_is_400() {
        let (app, _) = app(FakeEngine::new(r#"{"error":"invalid_input","message":5}"#));
        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app.oneshot(post_json("/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Please describe your actual medical symptoms"
        );
    }

    #[tokio::test]
    async fn test_fractional_scores_reach_client() {
        let reply = MODEL_REPLY.replace("\"likelihood\": 70", "\"likelihood\": 72.5");
        let (app, _) = app(FakeEngine::new(&reply));
        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app.oneshot(post_json("/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["conditions"][0]["likelihood"], 72.5);
    }

    #[tokio::test]
    async fn test_garbled_reply_uses_fallback() {
        let (app, _) = app(FakeEngine::new("Sorry, I cannot produce JSON today."));
        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app.oneshot(post_json("/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value = read_json(response).await;
        assert_eq!(value["recommendedSpecialist"], "General Practitioner");
        assert_eq!(value["conditions"][0]["likelihood"], 50);
    }

    #[tokio::test]
    async fn test_engine_down_is_500() {
        let (app, _) = app(FakeEngine::unreachable());
        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app.oneshot(post_json("/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "Failed to analyze symptoms");
    }
}

mod chat {
    use super::*;

    const CHAT_BODY: &str = r#"{"messages":[
        {"role":"user","content":"first question"},
        {"role":"assistant","content":"an answer"},
        {"role":"user","content":"latest question"}
    ]}"#;

    #[tokio::test]
    async fn test_stream_is_plain_text() {
        let (app, _) = app(FakeEngine::streaming(vec![
            "{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n",
            "{\"done\":true}\n",
        ]));
        let response = app.oneshot(post_json("/api/chat", CHAT_BODY)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Hello");
    }

    #[tokio::test]
    async fn test_engine_down_is_500() {
        let (app, _) = app(FakeEngine::unreachable());
        let response = app.oneshot(post_json("/chat", CHAT_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "Failed to process chat message");
    }
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_reports_engine_version() {
        let (app, _) = app(FakeEngine::new(""));
        let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["engine"], "0.0.0-fake");
    }

    #[tokio::test]
    async fn test_engine_down_is_503() {
        let (app, _) = app(FakeEngine::unreachable());
        let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

/// The reqwest client against a stub engine on a local port.
mod engine_client {
    use super::*;

    async fn stub_engine() -> String {
        let app = Router::new()
            .route(
                "/api/chat",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["stream"], false);
                    assert_eq!(body["model"], "llama3:latest");
                    Json(json!({
                        "model": "llama3:latest",
                        "message": {"role": "assistant", "content": MODEL_REPLY},
                        "done": true
                    }))
                }),
            )
            .route(
                "/api/generate",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["stream"], true);
                    assert_eq!(body["model"], "llama3");
                    // split mid-line to exercise reassembly
                    let parts: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
                        Ok(Bytes::from_static(b"{\"response\":\"Hi \",\"done\":false}\n{\"resp")),
                        Ok(Bytes::from_static(b"onse\":\"there\",\"done\":false}\n")),
                        Ok(Bytes::from_static(b"{\"response\":\"\",\"done\":true}\n")),
                    ];
                    Body::from_stream(stream::iter(parts))
                }),
            )
            .route("/api/version", get(|| async { Json(json!({ "version": "0.5.0" })) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// An engine that answers every call with an error status.
    async fn failing_engine() -> String {
        let app = Router::new()
            .route(
                "/api/chat",
                post(|| async {
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "model crashed" })))
                }),
            )
            .route(
                "/api/generate",
                post(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "model not found" }))) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> EngineConfig {
        EngineConfig {
            base_url,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_complete_sync() {
        let client = Client::new(config(stub_engine().await)).unwrap();
        let reply = client.complete_sync("prompt").await.unwrap();
        assert!(reply.contains("\"recommendedSpecialist\": \"Neurologist\""));
        assert_eq!(client.version().await.unwrap(), "0.5.0");
    }

    #[tokio::test]
    async fn test_stream_generate_through_relay() {
        let client = Client::new(config(stub_engine().await)).unwrap();
        let upstream = client.stream_generate("hello").await.unwrap();

        let mut out = String::new();
        let mut relay = dhanvantri::Relay::new(upstream).spawn(2);
        while let Some(chunk) = relay.next().await {
            out.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        }
        assert_eq!(out, "Hi there");
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        // nothing listens on port 9 locally
        let client = Client::new(config("http://127.0.0.1:9".into())).unwrap();
        assert!(matches!(
            client.complete_sync("prompt").await,
            Err(Error::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            client.stream_generate("prompt").await,
            Err(Error::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_unavailable() {
        let client = Client::new(config(failing_engine().await)).unwrap();
        match client.complete_sync("prompt").await {
            Err(Error::UpstreamUnavailable(message)) => assert!(message.contains("500"), "{}", message),
            other => panic!("expected UpstreamUnavailable, got {:?}", other),
        }
        match client.stream_generate("prompt").await {
            Err(Error::UpstreamUnavailable(message)) => assert!(message.contains("404"), "{}", message),
            Err(other) => panic!("expected UpstreamUnavailable, got {:?}", other),
            Ok(_) => panic!("expected an error for a 404 stream"),
        }
    }

    #[tokio::test]
    async fn test_error_status_through_router() {
        let client = Client::new(config(failing_engine().await)).unwrap();
        let app = router(AppState::new(Arc::new(client)));

        let body = r#"{"messages":[{"role":"user","content":"hello there"}]}"#;
        let response = app.clone().oneshot(post_json("/api/chat", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({ "error": "Failed to process chat message" }));

        let body = json!({ "symptoms": VALID_SYMPTOMS }).to_string();
        let response = app.oneshot(post_json("/api/analyze-symptoms", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({ "error": "Failed to analyze symptoms" }));
    }
}
