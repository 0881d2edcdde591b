use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::commands::classify_commands as handlers;
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/files/scan", get(handlers::scan))
        .route("/api/classify/start", post(handlers::start))
        .route("/api/classify/status", get(handlers::status))
        .route("/api/classify/results", get(handlers::results))
        .route("/api/classify/adjust", post(handlers::adjust))
        .route("/api/classify/execute", post(handlers::execute))
        .route("/api/classify/cleanup", post(handlers::cleanup))
        .route("/api/classify/rollback", post(handlers::rollback_last))
        .route("/api/config", get(handlers::get_config))
        .route("/api/check", get(handlers::check))
        .with_state(state)
}

/// Serves the JSON API until ctrl-c.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(address = %listener.local_addr()?, "classification server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::llm_service::ClassificationClient;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Files every name into the first category; never answers when `hang` is set.
    struct StubClient {
        hang: bool,
    }

    #[async_trait]
    impl ClassificationClient for StubClient {
        async fn classify(&self, prompt: &str) -> Result<String, AppError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let count = prompt.lines().filter(|l| l.starts_with('[')).count();
            Ok((1..=count)
                .map(|i| format!("{i}:1"))
                .collect::<Vec<_>>()
                .join("\n"))
        }

        async fn check(&self) -> Result<(), AppError> {
            Err(AppError::Transport {
                status: Some(401),
                message: "bad key".to_string(),
            })
        }
    }

    fn setup(root: &Path, files: &[&str], hang: bool) -> Router {
        let source = root.join("in");
        fs::create_dir_all(&source).unwrap();
        for name in files {
            fs::write(source.join(name), name.as_bytes()).unwrap();
        }
        let ini = format!(
            "[API]\napi_key = sk-test-1234567890\n\n[CLASSIFICATION]\ncategories = math,other\n\n\
[PATHS]\nsource_folder = {}\ntarget_base_folder = {}\n",
            source.display(),
            root.join("out").display()
        );
        let config = AppConfig::from_ini_str(&ini).unwrap();
        router(Arc::new(AppState::new(
            config,
            Arc::new(StubClient { hang }),
            None,
        )))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn wait_for_completion(app: &Router) -> Value {
        for _ in 0..200 {
            let (_, body) = call(app, "GET", "/api/classify/status", None).await;
            if body["status"] != "processing" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("classification did not finish");
    }

    #[tokio::test]
    async fn full_session_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &["a.txt", "b.txt", "c.txt"], false);

        let (status, body) = call(&app, "GET", "/api/files/scan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["batches"], 1);

        let (status, _) = call(&app, "POST", "/api/classify/start", None).await;
        assert_eq!(status, StatusCode::OK);
        let done = wait_for_completion(&app).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["progress"], 100);

        let (_, body) = call(&app, "GET", "/api/classify/results", None).await;
        assert_eq!(body["total_files"], 3);
        assert_eq!(body["results"][0]["id"], 1);
        assert_eq!(body["results"][0]["category"], "math");

        let adjust = serde_json::json!({ "file_id": 2, "category_index": 1 });
        let (status, body) = call(&app, "POST", "/api/classify/adjust", Some(adjust)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["category"], "other");

        let (status, body) = call(&app, "POST", "/api/classify/execute", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["success"], 3);
        assert_eq!(body["stats"]["category_stats"]["other"], 1);
        assert!(tmp.path().join("out/other/b.txt").exists());

        let (status, body) = call(&app, "POST", "/api/classify/rollback", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted_count"], 3);
        assert!(!tmp.path().join("out").exists());

        let (status, body) = call(&app, "POST", "/api/classify/rollback", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn cleanup_removes_filed_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &["a.txt", "b.txt"], false);

        call(&app, "GET", "/api/files/scan", None).await;
        call(&app, "POST", "/api/classify/start", None).await;
        wait_for_completion(&app).await;
        call(&app, "POST", "/api/classify/execute", None).await;

        let (status, body) = call(&app, "POST", "/api/classify/cleanup", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted_count"], 2);
        assert!(!tmp.path().join("in/a.txt").exists());
        assert!(tmp.path().join("out/math/a.txt").exists());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &["a.txt"], true);

        call(&app, "GET", "/api/files/scan", None).await;
        let (status, _) = call(&app, "POST", "/api/classify/start", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "POST", "/api/classify/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&app, "GET", "/api/files/scan", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", "/api/classify/status", None).await;
        assert_eq!(body["status"], "processing");
    }

    #[tokio::test]
    async fn start_without_files_is_a_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &[], false);

        call(&app, "GET", "/api/files/scan", None).await;
        let (status, _) = call(&app, "POST", "/api/classify/start", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn execute_and_adjust_require_completed_run() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &["a.txt"], false);

        let (status, _) = call(&app, "POST", "/api/classify/execute", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        call(&app, "GET", "/api/files/scan", None).await;
        call(&app, "POST", "/api/classify/start", None).await;
        wait_for_completion(&app).await;

        let bad = serde_json::json!({ "file_id": 5, "category_index": 0 });
        let (status, _) = call(&app, "POST", "/api/classify/adjust", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_is_masked_and_check_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let app = setup(tmp.path(), &[], false);

        let (_, body) = call(&app, "GET", "/api/config", None).await;
        assert_eq!(body["config"]["api"]["api_key"], "sk-t...7890");

        let (status, body) = call(&app, "GET", "/api/check", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("401"));
    }
}
