//! HTTP routes exposing the updater's check and install operations.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info};
use serde::Deserialize;
use uplift_core::{InstallReport, Updater, VersionComparison};

use crate::error::{ApiError, MISSING_VERSION};

pub fn router(updater: Arc<Updater>) -> Router {
    Router::new()
        .route("/updates/checkForUpdate", get(check_for_update))
        .route("/updates/installLatest", post(install_latest))
        .with_state(updater)
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    version: Option<String>,
}

async fn check_for_update(
    State(updater): State<Arc<Updater>>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<VersionComparison>, ApiError> {
    debug!("Checking for update");
    let version = query
        .version
        .filter(|version| !version.trim().is_empty())
        .ok_or(ApiError::BadRequest(MISSING_VERSION))?;

    Ok(Json(updater.check_for_update(version.trim()).await?))
}

/// The pipeline runs on its own task so a dropped connection cannot cancel it
/// between the two renames of a swap.
async fn install_latest(
    State(updater): State<Arc<Updater>>,
) -> Result<Json<InstallReport>, ApiError> {
    info!("Installing latest version");
    let report = tokio::spawn(async move { updater.install_latest().await }).await??;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uplift_core::{
        ArchiveFetcher, ArchiveFormat, DependencyBuilder, InstallationSwapper,
        LifecycleController, ReleaseInfo, ReleaseSource, ServiceControl, SystemCommandRunner,
        Toolchain, UpdateResult, Updater, VersionResolver,
    };

    use super::router;

    struct CountingSource {
        tag: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReleaseSource for CountingSource {
        async fn latest_release(&self) -> UpdateResult<ReleaseInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ReleaseInfo {
                version: self.tag.to_string(),
                archive_url: "http://127.0.0.1:9/release.tar.gz".to_string(),
            })
        }
    }

    fn test_router(tag: &'static str) -> (axum::Router, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            tag,
            calls: AtomicUsize::new(0),
        });
        let runner = Arc::new(SystemCommandRunner);
        let updater = Updater::new(
            VersionResolver::new(source.clone()),
            ArchiveFetcher::new(reqwest::Client::new(), ArchiveFormat::TarGz, "acme-speaker-"),
            DependencyBuilder::new(runner.clone(), Toolchain::npm(), None),
            LifecycleController::new(runner, ServiceControl::External, None),
            InstallationSwapper::new(None),
        );
        (router(Arc::new(updater)), source)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build")
    }

    #[tokio::test]
    async fn check_for_update_returns_comparison() {
        let (app, source) = test_router("v1.0.1");

        let response = app
            .oneshot(get("/updates/checkForUpdate?version=1.0.0"))
            .await
            .expect("request should be handled");

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("body should be JSON");
        assert_eq!(
            body,
            serde_json::json!({"latestVersion": "1.0.1", "higherVersionAvailable": true})
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn check_for_update_with_same_version_is_not_newer() {
        let (app, _source) = test_router("1.0.0");

        let response = app
            .oneshot(get("/updates/checkForUpdate?version=1.0.0"))
            .await
            .expect("request should be handled");

        let body: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("body should be JSON");
        assert_eq!(body["higherVersionAvailable"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn missing_version_is_rejected_without_querying_releases() {
        for uri in ["/updates/checkForUpdate", "/updates/checkForUpdate?version="] {
            let (app, source) = test_router("1.0.1");

            let response = app
                .oneshot(get(uri))
                .await
                .expect("request should be handled");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                body_text(response).await,
                "The current version has to be provided."
            );
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn malformed_version_is_a_server_error() {
        let (app, _source) = test_router("1.0.1");

        let response = app
            .oneshot(get("/updates/checkForUpdate?version=latest"))
            .await
            .expect("request should be handled");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "invalid version 'latest'");
    }

    #[tokio::test]
    async fn install_without_active_dir_reports_configuration_error() {
        let (app, source) = test_router("2.0.0");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/updates/installLatest")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should be handled");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("configuration error"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn install_route_only_accepts_post() {
        let (app, _source) = test_router("2.0.0");

        let response = app
            .oneshot(get("/updates/installLatest"))
            .await
            .expect("request should be handled");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
