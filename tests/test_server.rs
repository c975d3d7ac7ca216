//! Integration test: HTTP endpoints backed by a stub classifier

use std::{io::Cursor, sync::Arc};

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use fruit_quality_service::{
    AppConfig, ImageClassifier, InferenceRuntime, ServiceError, build_router,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::Value;
use tch::Tensor;
use tower::ServiceExt;

const BOUNDARY: &str = "fruit-test-boundary";

struct StubClassifier(Vec<f32>);

impl ImageClassifier for StubClassifier {
    fn probabilities(&self, _batch: Tensor) -> Result<Vec<f32>, ServiceError> {
        Ok(self.0.clone())
    }
}

fn classes() -> Vec<String> {
    vec!["bad_fruit".to_string(), "good_fruit".to_string()]
}

fn app_with_config(config: AppConfig, classifier: Option<Arc<dyn ImageClassifier>>) -> axum::Router {
    let config = Arc::new(config);
    let runtime = Arc::new(InferenceRuntime::new(&config, classes(), classifier));
    build_router(config, runtime)
}

fn test_app(classifier: Option<Arc<dyn ImageClassifier>>) -> axum::Router {
    app_with_config(AppConfig::default(), classifier)
}

fn loaded_app(probs: Vec<f32>) -> axum::Router {
    test_app(Some(Arc::new(StubClassifier(probs))))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    multipart_part(field, Some(filename), data)
}

fn multipart_part(field: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_home_lists_endpoints() {
    let (status, body) = send(loaded_app(vec![0.5, 0.5]), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Fruit Quality Classification API (VGG16)");
    assert_eq!(body["classes"][1], "good_fruit");
    assert_eq!(body["endpoints"]["predict"], "POST /predict  form-data: file=<image>");
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let (status, body) = send(loaded_app(vec![0.5, 0.5]), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["num_classes"], 2);
    assert_eq!(body["model_meta"]["arch"], "vgg16");
    assert_eq!(body["model_meta"]["version"], "v1.0.0");

    let (_, body) = send(test_app(None), get("/health")).await;
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_labels_endpoint() {
    let (status, body) = send(loaded_app(vec![0.5, 0.5]), get("/labels")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["num_classes"], 2);
    assert_eq!(body["classes"][0], "bad_fruit");
}

#[tokio::test]
async fn test_predict_success_payload() {
    let app = loaded_app(vec![0.2, 0.8]);
    let (status, body) = send(app, multipart_request("file", "apple.png", &png(320, 240))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["prediction"]["class"], "good_fruit");
    assert_eq!(body["prediction"]["pct"], 80.0);
    assert_eq!(body["top_k"].as_array().unwrap().len(), 2);
    assert_eq!(body["top_k"][0]["class"], "good_fruit");
    assert!(body["confidence_scores"]["bad_fruit"].as_f64().unwrap() > 19.9);
    assert_eq!(body["threshold"]["value_pct"], 70.0);
    assert_eq!(body["threshold"]["met"], true);
    assert!(body["threshold"]["note"].is_null());
    assert!(body["timings"]["inference_ms"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["input"]["original_size"]["w"], 320);
    assert_eq!(body["input"]["original_size"]["h"], 240);
    assert_eq!(body["input"]["preprocessed_size"]["w"], 224);
    assert_eq!(body["model"]["arch"], "vgg16");
    assert!(
        body["preview"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
}

#[tokio::test]
async fn test_predict_low_confidence_note() {
    let app = loaded_app(vec![0.4, 0.6]);
    let (status, body) = send(app, multipart_request("file", "pear.png", &png(10, 10))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threshold"]["met"], false);
    assert!(body["threshold"]["note"].is_string());
}

#[tokio::test]
async fn test_predict_without_file_field() {
    let app = loaded_app(vec![0.5, 0.5]);
    let (status, body) = send(app, multipart_request("image", "apple.png", &png(8, 8))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_predict_with_file_part_lacking_filename() {
    let app = loaded_app(vec![0.5, 0.5]);
    let (status, body) = send(app, multipart_part("file", None, &png(8, 8))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_predict_rejects_upload_over_limit() {
    let config = AppConfig {
        max_upload_bytes: 1024,
        ..AppConfig::default()
    };
    let app = app_with_config(config, Some(Arc::new(StubClassifier(vec![0.5, 0.5]))));
    let oversized = vec![7u8; 8 * 1024];
    let (status, body) = send(app, multipart_request("file", "big.png", &oversized)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_predict_with_empty_filename() {
    let app = loaded_app(vec![0.5, 0.5]);
    let (status, body) = send(app, multipart_request("file", "", &png(8, 8))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn test_predict_with_undecodable_image() {
    let app = loaded_app(vec![0.5, 0.5]);
    let (status, body) = send(app, multipart_request("file", "notes.txt", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_predict_when_model_missing() {
    let app = test_app(None);
    let (status, body) = send(app, multipart_request("file", "apple.png", &png(8, 8))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn test_predict_with_wrong_score_count() {
    let app = loaded_app(vec![1.0]);
    let (status, body) = send(app, multipart_request("file", "apple.png", &png(8, 8))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}
