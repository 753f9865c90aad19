use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use edge_ai_services::registry::build_registry_router;
use edge_ai_services::RegistryDatabase;

fn app() -> Router {
    let database = RegistryDatabase::new_in_memory().unwrap();
    build_registry_router(Arc::new(database), Duration::from_secs(30))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn resnet() -> Value {
    json!({
        "model_name": "microsoft/resnet-50",
        "task": "image-classification",
        "model_url": "https://huggingface.co/microsoft/resnet-50",
        "feedback": [{"rating": 5}],
    })
}

#[tokio::test]
async fn service_crud_lifecycle() {
    let app = app();

    let created = app.clone().oneshot(json_request("POST", "/ai-services/", resnet())).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["model_name"], "microsoft/resnet-50");
    assert_eq!(created["feedback"][0]["rating"], 5);

    let fetched = app.clone().oneshot(request("GET", &format!("/ai-service/{id}"))).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(json_body(fetched).await["id"], id.as_str());

    let mut changed = resnet();
    changed["task_detail"] = json!("ImageNet-1k");
    let updated = app
        .clone()
        .oneshot(json_request("PUT", &format!("/ai-service/{id}"), changed))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["task_detail"], "ImageNet-1k");

    let deleted = app.clone().oneshot(request("DELETE", &format!("/ai-service/{id}"))).await.unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(json_body(deleted).await["message"], "AI Service deleted successfully");

    let gone = app.oneshot(request("GET", &format!("/ai-service/{id}"))).await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(gone).await["detail"], "AI Service not found");
}

#[tokio::test]
async fn list_filters_by_model_and_task() {
    let app = app();
    for (model, task) in [("a", "detection"), ("b", "detection"), ("a", "segmentation")] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ai-services/", json!({"model_name": model, "task": task})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let all = json_body(app.clone().oneshot(request("GET", "/ai-services/")).await.unwrap()).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let by_model = json_body(app.clone().oneshot(request("GET", "/ai-services/?model_name=a")).await.unwrap()).await;
    assert_eq!(by_model.as_array().unwrap().len(), 2);

    let both = json_body(
        app.clone()
            .oneshot(request("GET", "/ai-services/?model_name=a&task=detection"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(both.as_array().unwrap().len(), 1);

    let empty_filter = json_body(app.oneshot(request("GET", "/ai-services/?task=")).await.unwrap()).await;
    assert_eq!(empty_filter.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_service_is_rejected() {
    let response = app()
        .oneshot(json_request("POST", "/ai-services/", json!({"model_name": "m", "task": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app()
        .oneshot(json_request("POST", "/ai-services/", json!({"task": "detection"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn image_routes_use_their_own_collection() {
    let app = app();
    let image = json!({"model_name": "m", "task": "detection", "docker_image": "registry.local/m:1"});

    let created = app.clone().oneshot(json_request("POST", "/ai-service-images/", image)).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json_body(created).await["id"].as_str().unwrap().to_string();

    let services = json_body(app.clone().oneshot(request("GET", "/ai-services/")).await.unwrap()).await;
    assert!(services.as_array().unwrap().is_empty());

    let deleted = app.clone().oneshot(request("DELETE", &format!("/ai-service-images/{id}"))).await.unwrap();
    assert_eq!(json_body(deleted).await["message"], "AI Service Image deleted successfully");

    let missing = app.oneshot(request("DELETE", &format!("/ai-service-images/{id}"))).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await["detail"], "AI Service Image not found");
}
