//! HTTP route handlers for the sim test API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::get;
use coordinator::core::types::JobView;
use coordinator::service::PollOutcome;
use tracing::info;

use crate::state::AppState;

/// Header carrying the shared secret.
pub const TOKEN_HEADER: &str = "tester-token";

const WELCOME: &str = "Welcome to the sim test server";
const INVALID_TOKEN_BODY: &str = "error: invalid token";

/// Build the full router with state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sim", get(welcome))
        .route(
            "/api/sim/test/{commit_id}/commit",
            get(submit_commit).post(submit_commit),
        )
        .route("/api/sim/test/{test_result_id}/result", get(get_result))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn welcome() -> &'static str {
    WELCOME
}

/// A missing or non-UTF-8 header is treated as the empty token.
fn token(headers: &HeaderMap) -> &str {
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// GET|POST /api/sim/test/{commitId}/commit - start a test run, reply with its id.
async fn submit_commit(
    State(state): State<AppState>,
    Path(commit_id): Path<String>,
    headers: HeaderMap,
) -> Result<String, (StatusCode, &'static str)> {
    match state.service.submit(&commit_id, token(&headers)) {
        Ok(submitted) => {
            info!(job_id = %submitted.job_id, commit = %commit_id, "accepted submission");
            Ok(submitted.job_id.clone())
        }
        Err(_) => Err((StatusCode::UNAUTHORIZED, INVALID_TOKEN_BODY)),
    }
}

/// GET /api/sim/test/{testResultId}/result - current record for a job.
async fn get_result(
    State(state): State<AppState>,
    Path(test_result_id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<JobView>) {
    let outcome = state.service.poll(&test_result_id, token(&headers));
    let status = match &outcome {
        PollOutcome::Unauthorized => StatusCode::UNAUTHORIZED,
        PollOutcome::NotFound => StatusCode::NOT_FOUND,
        PollOutcome::Found(_) => StatusCode::OK,
    };
    (status, Json(outcome.into_view()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use coordinator::core::auth::AccessGuard;
    use coordinator::core::types::JobStatus;
    use coordinator::io::workspace::WorkspaceManager;
    use coordinator::orchestrator::Orchestrator;
    use coordinator::service::TestService;
    use coordinator::store::JobStore;
    use coordinator::test_support::{ManualClock, ScriptedTestScript, ScriptedVcs, TestArea};
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "secret";

    fn state(area: &TestArea, tests: ScriptedTestScript) -> AppState {
        let workspaces = WorkspaceManager::new(
            area.settings(false),
            Arc::new(ScriptedVcs::resolving(&["abc123"])),
            Arc::new(tests),
        );
        let orchestrator = Orchestrator::new(
            Arc::new(JobStore::new()),
            Arc::new(workspaces),
            Arc::new(ManualClock::new()),
        );
        AppState::new(TestService::new(
            AccessGuard::new(SECRET).expect("guard"),
            orchestrator,
        ))
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Tester-Token", token);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, String) {
        let response = router(state.clone()).oneshot(req).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    fn view(body: &str) -> JobView {
        serde_json::from_str(body).expect("job json")
    }

    #[tokio::test]
    async fn welcome_and_health() {
        let area = TestArea::new().expect("area");
        let state = state(&area, ScriptedTestScript::passing("ok"));

        let (status, body) = send(&state, request(Method::GET, "/api/sim", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Welcome to the sim test server");

        let (status, body) = send(&state, request(Method::GET, "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn submit_without_valid_token_is_unauthorized() {
        let area = TestArea::new().expect("area");
        let state = state(&area, ScriptedTestScript::passing("ok"));

        for token in [None, Some("wrong")] {
            let req = request(Method::POST, "/api/sim/test/abc123/commit", token);
            let (status, body) = send(&state, req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, "error: invalid token");
        }
        assert!(state.service.orchestrator().store().is_empty());
    }

    #[tokio::test]
    async fn submitted_job_is_running_until_tests_finish() {
        let area = TestArea::new().expect("area");
        let (tests, gate) = ScriptedTestScript::passing("ok").gated();
        let state = state(&area, tests);

        for method in [Method::GET, Method::POST] {
            let req = request(method, "/api/sim/test/abc123/commit", Some(SECRET));
            let (status, id) = send(&state, req).await;
            assert_eq!(status, StatusCode::OK);
            assert!(!id.is_empty());

            let uri = format!("/api/sim/test/{id}/result");
            let (status, body) = send(&state, request(Method::GET, &uri, Some(SECRET))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(view(&body).status, JobStatus::Running);
            assert_eq!(view(&body).message, "Test running");
        }
        gate.open();
    }

    #[tokio::test]
    async fn terminal_result_is_served_once() {
        let area = TestArea::new().expect("area");
        let state = state(&area, ScriptedTestScript::failing("2 failed\n"));

        let submitted = state.service.submit("abc123", SECRET).expect("submit");
        let uri = format!("/api/sim/test/{}/result", submitted.job_id);
        submitted.wait();

        let (status, body) = send(&state, request(Method::GET, &uri, Some(SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"FAILURE","message":"2 failed\n"}"#);

        let (status, body) = send(&state, request(Method::GET, &uri, Some(SECRET))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(view(&body), JobView::errored("Test result not found"));
    }

    #[tokio::test]
    async fn result_with_bad_token_is_unauthorized() {
        let area = TestArea::new().expect("area");
        let state = state(&area, ScriptedTestScript::passing("ok"));

        let req = request(Method::GET, "/api/sim/test/whatever/result", Some("nope"));
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(view(&body), JobView::errored("Invalid token"));
    }
}
