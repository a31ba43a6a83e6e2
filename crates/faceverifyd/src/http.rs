//! HTTP surface: `POST /verify` and `GET /health`.

use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::ingest;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use faceverify_core::{VerificationResult, ARCFACE_MODEL_NAME};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "DeepFace Verification";

/// Detection is never enforced: a pair with no detectable face still gets
/// a decision from whole-image embeddings.
const ENFORCE_DETECTION: bool = false;

/// Shared, read-only handler state. Holds no per-request data.
pub struct AppState {
    pub engine: EngineHandle,
    pub temp_dir: PathBuf,
}

/// Fields are loosely typed: any falsy JSON value counts as missing, and a
/// present non-string value is rejected only after that check.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Base64 image, optionally with a data-URL header.
    #[serde(default)]
    pub image1: Option<Value>,
    /// Base64 image or a path readable by the daemon.
    #[serde(default)]
    pub image2: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}

/// POST /verify
///
/// Temp images are owned by this scope and removed on every exit path,
/// including verifier failure.
async fn verify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let (Some(image1), Some(image2)) = (present(request.image1), present(request.image2)) else {
        return Err(ApiError::MissingImages);
    };
    let image1 = into_string("image1", image1)?;
    let image2 = into_string("image2", image2)?;

    let img1 = ingest::ingest_primary(&image1, &state.temp_dir)?;
    let img2 = ingest::ingest_secondary(&image2, &state.temp_dir)?;
    tracing::debug!(
        img1 = %img1.path().display(),
        img2 = %img2.path().display(),
        img2_supplied = !img2.is_temporary(),
        "images ready"
    );

    let result = state
        .engine
        .verify(
            img1.path().to_path_buf(),
            img2.path().to_path_buf(),
            ARCFACE_MODEL_NAME,
            ENFORCE_DETECTION,
        )
        .await?;

    Ok(Json(result))
}

fn present(field: Option<Value>) -> Option<Value> {
    field.filter(|value| match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

fn into_string(field: &str, value: Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ApiError::InvalidBody(format!("{field} must be a string, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine as _;
    use faceverify_core::{Verifier, VerifyError};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const IMAGE_A: &[u8] = b"\xFF\xD8\xFF\xE0 image a";
    const IMAGE_B: &[u8] = b"\xFF\xD8\xFF\xE0 image b";

    /// Byte-comparing stand-in for the ONNX verifier.
    struct StubVerifier {
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Verifier for StubVerifier {
        fn verify(
            &mut self,
            img1: &Path,
            img2: &Path,
            model_name: &str,
            enforce_detection: bool,
        ) -> Result<VerificationResult, VerifyError> {
            assert!(!enforce_detection);
            self.seen.lock().unwrap().extend([img1.to_path_buf(), img2.to_path_buf()]);

            let read = |p: &Path| {
                std::fs::read(p).map_err(|e| VerifyError::ImageLoad {
                    path: p.to_path_buf(),
                    message: e.to_string(),
                })
            };
            let distance = if read(img1)? == read(img2)? { 0.0 } else { 0.9 };
            Ok(VerificationResult::decide(distance, 0.68, model_name))
        }
    }

    struct TestApp {
        router: Router,
        temp_dir: TempDir,
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_body_limit(1024 * 1024)
        }

        fn with_body_limit(max_body_bytes: usize) -> Self {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let engine = spawn_engine(Box::new(StubVerifier { seen: seen.clone() }), 4).unwrap();
            let temp_dir = tempfile::tempdir().unwrap();
            let state = AppState {
                engine,
                temp_dir: temp_dir.path().to_path_buf(),
            };
            Self {
                router: build_router(state, max_body_bytes),
                temp_dir,
                seen,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        async fn post_verify(&self, body: Value) -> (StatusCode, Value) {
            self.send(json_request(body.to_string())).await
        }

        fn temp_files(&self) -> usize {
            std::fs::read_dir(self.temp_dir.path()).unwrap().count()
        }

        fn verifier_calls(&self) -> usize {
            self.seen.lock().unwrap().len() / 2
        }
    }

    fn json_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/verify")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn b64(bytes: &[u8]) -> String {
        BASE64_STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "service": "DeepFace Verification" }));
    }

    #[tokio::test]
    async fn test_missing_images_rejected_before_io() {
        let app = TestApp::new();
        let cases = [
            json!({ "image2": b64(IMAGE_A) }),
            json!({ "image1": b64(IMAGE_A) }),
            json!({}),
            json!({ "image1": "", "image2": b64(IMAGE_A) }),
            json!({ "image1": b64(IMAGE_A), "image2": "" }),
            json!({ "image1": null, "image2": b64(IMAGE_A) }),
            json!({ "image1": 0, "image2": b64(IMAGE_A) }),
            json!({ "image1": b64(IMAGE_A), "image2": false }),
            json!({ "image1": [], "image2": {} }),
        ];

        for case in cases {
            let (status, body) = app.post_verify(case.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
            assert_eq!(body, json!({ "error": "Two images are required" }));
        }
        assert_eq!(app.temp_files(), 0);
        assert_eq!(app.verifier_calls(), 0);
    }

    #[tokio::test]
    async fn test_identical_images_verified_and_cleaned_up() {
        let app = TestApp::new();
        let (status, body) = app
            .post_verify(json!({ "image1": b64(IMAGE_A), "image2": b64(IMAGE_A) }))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        assert_eq!(body["model"], "ArcFace");
        assert!(body["distance"].as_f64().unwrap() < body["threshold"].as_f64().unwrap());

        // Both images went through temp files, and both are gone
        let seen = app.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.starts_with(app.temp_dir.path())));
        assert!(seen.iter().all(|p| !p.exists()));
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_different_images_not_verified() {
        let app = TestApp::new();
        let (status, body) = app
            .post_verify(json!({ "image1": b64(IMAGE_A), "image2": b64(IMAGE_B) }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], false);
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_data_url_image1_with_supplied_path() {
        let app = TestApp::new();
        let fixtures = tempfile::tempdir().unwrap();
        let reference = fixtures.path().join("reference.jpg");
        std::fs::write(&reference, IMAGE_A).unwrap();

        let (status, body) = app
            .post_verify(json!({
                "image1": format!("data:image/jpeg;base64,{}", b64(IMAGE_A)),
                "image2": reference.to_str().unwrap(),
            }))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        assert_eq!(app.seen.lock().unwrap()[1], reference);
        assert!(reference.exists(), "supplied path must not be deleted");
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_nonexistent_path_is_operational_error() {
        let app = TestApp::new();
        let (status, body) = app
            .post_verify(json!({ "image1": b64(IMAGE_A), "image2": "/nonexistent/path.jpg" }))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["verified"], false);
        assert!(body["error"].as_str().unwrap().contains("/nonexistent/path.jpg"));
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_malformed_base64_is_operational_error() {
        let app = TestApp::new();
        let (status, body) = app
            .post_verify(json!({ "image1": "data:image/jpeg;base64,***", "image2": b64(IMAGE_A) }))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["verified"], false);
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(app.temp_files(), 0);
        assert_eq!(app.verifier_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_image2_removes_image1_temp_file() {
        let app = TestApp::new();
        let (status, _) = app
            .post_verify(json!({ "image1": b64(IMAGE_A), "image2": "/9j/%%%" }))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_operational_error() {
        let app = TestApp::new();
        for raw in ["not json", "[1, 2]", r#"{"image1": 5, "image2": "x"}"#] {
            let (status, body) = app.send(json_request(raw.to_string())).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{raw}");
            assert_eq!(body["verified"], false);
            assert!(!body["error"].as_str().unwrap().is_empty());
        }
        assert_eq!(app.temp_files(), 0);
    }

    #[tokio::test]
    async fn test_non_string_image_is_operational_error() {
        let app = TestApp::new();
        let (status, body) = app
            .post_verify(json!({ "image1": b64(IMAGE_A), "image2": ["/srv/a.jpg"] }))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["verified"], false);
        assert!(body["error"].as_str().unwrap().contains("image2"));
        assert_eq!(app.temp_files(), 0);
        assert_eq!(app.verifier_calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_operational_error() {
        let app = TestApp::with_body_limit(64);
        let body = json!({ "image1": b64(&[0xAB; 256]), "image2": b64(IMAGE_A) });
        assert!(body.to_string().len() > 64);

        let (status, body) = app.post_verify(body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["verified"], false);
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(app.temp_files(), 0);
        assert_eq!(app.verifier_calls(), 0);
    }
}
