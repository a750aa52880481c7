use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lungscan::web::{self, AppState, SessionState, SessionStore};
use lungscan::{Classifier, ClassifierError, InferenceModel, InputTensor};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "lungscan-test-boundary";

#[derive(Debug)]
struct FixedModel(Vec<f32>);

impl InferenceModel for FixedModel {
    fn input_shape(&self) -> &[i64] {
        &[1, 224, 224, 3]
    }

    fn forward(&self, _input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.0.clone())
    }
}

fn app_with(probabilities: Vec<f32>) -> (Router, AppState) {
    let state = AppState::new(Classifier::new(Arc::new(FixedModel(probabilities))));
    (web::router(state.clone(), 1024 * 1024), state)
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 32, Rgb([120, 120, 120])));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn anonymous_upload_request(uri: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(file_name, bytes)))
        .unwrap()
}

fn upload_request(uri: &str, session: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut request = anonymous_upload_request(uri, file_name, bytes);
    request
        .headers_mut()
        .insert(web::SESSION_HEADER, session.parse().unwrap());
    request
}

fn get_request(uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(web::SESSION_HEADER, session)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app_with(vec![0.2, 0.3, 0.5]);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "OK");
    assert_eq!(json["model"]["num_classes"], 3);
}

#[tokio::test]
async fn test_api_predict_then_results() {
    let (app, state) = app_with(vec![0.1, 0.2, 0.7]);

    let response = app
        .clone()
        .oneshot(upload_request("/api/predict", "session-a", "scan.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["session_id"], "session-a");
    assert_eq!(json["image"]["format"], "PNG");
    assert_eq!(json["image"]["width"], 48);
    assert_eq!(json["prediction"]["label"], "Viral Pneumonia");
    assert_eq!(json["prediction"]["scores"][0]["label"], "COVID-19 Positive");
    assert_eq!(state.sessions().state("session-a").await, SessionState::Predicted);

    let response = app
        .clone()
        .oneshot(get_request("/api/results", "session-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["state"], "predicted");
    assert_eq!(json["labels"][1], "Normal");
    assert_eq!(json["prediction"]["probabilities"].as_array().unwrap().len(), 3);

    // Another session has nothing stored
    let response = app
        .oneshot(get_request("/api/results", "session-b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], "No predictions yet");
}

#[tokio::test]
async fn test_malformed_upload_keeps_serving() {
    let (app, state) = app_with(vec![0.5, 0.3, 0.2]);

    let response = app
        .clone()
        .oneshot(upload_request("/api/predict", "s1", "scan.png", b"not a png at all"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("decode"));
    assert_eq!(state.sessions().state("s1").await, SessionState::NoImage);

    let response = app
        .clone()
        .oneshot(upload_request("/api/predict", "s1", "scan.gif", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    // A good upload afterwards succeeds
    let response = app
        .oneshot(upload_request("/api/predict", "s1", "scan.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_model_output_is_server_error() {
    let (app, state) = app_with(vec![0.9, 0.9, 0.9]);
    let response = app
        .oneshot(upload_request("/api/predict", "s2", "scan.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.sessions().last_result("s2").await.is_none());
}

#[tokio::test]
async fn test_html_views() {
    let (app, _) = app_with(vec![0.15, 0.8, 0.05]);

    let response = app.clone().oneshot(get_request("/results", "web")).await.unwrap();
    assert!(text_body(response).await.contains("No predictions yet"));

    let response = app
        .clone()
        .oneshot(upload_request("/predict", "web", "scan.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("Prediction: Normal"));
    assert!(html.contains("80.00%"));
    assert!(html.contains("48 x 32"));
    assert!(html.contains("data:image/png;base64,"));

    let response = app.clone().oneshot(get_request("/results", "web")).await.unwrap();
    let html = text_body(response).await;
    assert_eq!(html.matches("class=\"chart-bar\"").count(), 3);
    assert!(html.contains("80.0%"));

    let response = app.oneshot(get_request("/about", "web")).await.unwrap();
    assert!(text_body(response).await.contains("224x224 RGB"));
}

#[tokio::test]
async fn test_new_visitor_gets_session_cookie() {
    let (app, _) = app_with(vec![0.2, 0.3, 0.5]);
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with(web::SESSION_COOKIE));
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let state = AppState::new(Classifier::new(Arc::new(FixedModel(vec![0.1, 0.2, 0.7]))));
    let app = web::router(state.clone(), 1024);

    let response = app
        .clone()
        .oneshot(upload_request("/api/predict", "big", "scan.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(upload_request("/api/predict", "big", "scan.png", &vec![7u8; 4096]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid upload"));

    // The earlier result survives the rejected upload
    assert_eq!(state.sessions().state("big").await, SessionState::Predicted);
    let response = app.oneshot(get_request("/api/results", "big")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["prediction"]["label"], "Viral Pneumonia");
}

#[tokio::test]
async fn test_anonymous_rejected_uploads_do_not_accumulate() {
    let (app, state) = app_with(vec![0.2, 0.3, 0.5]);
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(anonymous_upload_request("/api/predict", "scan.png", b"garbage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert!(state.sessions().is_empty().await);
}

#[tokio::test]
async fn test_session_store_is_bounded() {
    let sessions = SessionStore::with_limits(8, Duration::from_secs(3600));
    let state = AppState::with_sessions(
        Classifier::new(Arc::new(FixedModel(vec![0.2, 0.3, 0.5]))),
        sessions,
    );
    let app = web::router(state.clone(), 1024 * 1024);
    let png = png_bytes();

    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(anonymous_upload_request("/api/predict", "scan.png", &png))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }
    assert_eq!(state.sessions().len().await, 8);
}
