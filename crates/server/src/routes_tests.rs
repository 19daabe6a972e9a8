// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use pw_core::api::WorkerSettings;
use pw_core::{Canvas, Config, FakeClock, Session, SessionStatus};
use pw_storage::{NewProject, Store};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "backend-secret";

struct Harness {
    router: Router,
    store: Store,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let store = Store::open_in_memory().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.backend_secret = SECRET.to_string();
    config.progress.log_dir = dir.path().to_path_buf();

    let state = AppState::new(
        store.clone(),
        Arc::new(config),
        Arc::new(FakeClock::new()),
    );
    Harness {
        router: build_router(state),
        store,
        _dir: dir,
    }
}

async fn seed_completed_session(store: &Store, id: &str) {
    store
        .insert_session(&Session {
            id: id.to_string(),
            user_id: None,
            mode: "guided".to_string(),
            status: SessionStatus::Completed,
            total_questions: 0,
            current_index: 0,
            job_id: None,
            job_status: None,
            started_at: "2026-01-30T08:00:00Z".to_string(),
            completed_at: None,
        })
        .await
        .unwrap();
}

async fn seed_project(store: &Store, id: &str) {
    store
        .insert_project(
            NewProject {
                id: id.to_string(),
                name: "Prof".to_string(),
                is_system: false,
                canvas: Canvas::default(),
            },
            "2026-01-30T08:00:00Z",
        )
        .await
        .unwrap();
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    secret: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(secret) = secret {
        builder = builder.header("x-backend-secret", secret);
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn missing_or_wrong_secret_is_unauthorized() {
    let h = harness().await;
    let (status, _) = send(&h.router, Method::GET, "/admin/jobs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.router, Method::GET, "/admin/jobs", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.router, Method::GET, "/admin/jobs", Some(SECRET), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn enqueue_lease_report_poll_over_http() {
    let h = harness().await;
    seed_completed_session(&h.store, "s1").await;
    seed_project(&h.store, "p1").await;

    // Enqueue.
    let (status, body) = send(
        &h.router,
        Method::POST,
        "/internal/jobs",
        Some(SECRET),
        Some(json!({"sessionId": "s1", "projectId": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // Lease.
    let (status, body) = send(
        &h.router,
        Method::GET,
        "/external/jobs?status=queued&kind=Prof&batch=5&worker=w1",
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);
    assert_eq!(body["jobs"][0]["jobId"], job_id.as_str());
    assert_eq!(body["jobs"][0]["pipelineKind"], "Prof");

    // Terminal report with canonical names.
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        &format!("/external/jobs/{job_id}"),
        Some(SECRET),
        Some(json!({
            "jobId": job_id,
            "sessionId": "s1",
            "status": "completed",
            "reports": {
                "Adapted Report": "adapted",
                "Professional Report": "full",
                "Aggregate Score Profile": "scores"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    // Poll returns persisted reports.
    let (status, body) = send(
        &h.router,
        Method::GET,
        "/internal/jobs/s1",
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["reports"]["Professional Report"], "full");

    // A second terminal update is a conflict.
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        &format!("/external/jobs/{job_id}"),
        Some(SECRET),
        Some(json!({"jobId": job_id, "status": "failed", "error": "late"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "terminal_job");
}

#[tokio::test]
async fn lease_rejects_non_queued_status_filter() {
    let h = harness().await;
    let (status, body) = send(
        &h.router,
        Method::GET,
        "/external/jobs?status=processing&kind=Prof&worker=w1",
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn unknown_session_maps_to_404() {
    let h = harness().await;
    let (status, body) = send(
        &h.router,
        Method::POST,
        "/internal/jobs",
        Some(SECRET),
        Some(json!({"sessionId": "ghost", "projectId": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn progress_endpoint_pages_by_offset() {
    let h = harness().await;
    let log_dir = h._dir.path();
    let logger = pw_engine::ProgressLogger::create(log_dir, "Prof", "job-9", 1_000);
    logger.node_line(1_000, true, "A", "n1", 10, 1, 2, None);
    logger.node_line(2_000, true, "B", "n2", 10, 2, 2, None);

    let (status, body) = send(
        &h.router,
        Method::GET,
        "/admin/jobs/job-9/progress?offset=0",
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);

    let (_, body) = send(
        &h.router,
        Method::GET,
        "/admin/jobs/job-9/progress?offset=1",
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(body["total"], 2);
    let lines = body["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].as_str().unwrap().contains("B (n2)"));
}

#[tokio::test]
async fn settings_roundtrip_with_restart_flag() {
    let h = harness().await;

    // Empty to start, no restart pending.
    let (status, body) = send(&h.router, Method::GET, "/admin/settings", Some(SECRET), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restartPending"], false);

    // Put with no active jobs: applies immediately.
    let mut kinds = BTreeMap::new();
    kinds.insert(
        "Prof".to_string(),
        WorkerSettings {
            instances: 3,
            poll_interval_ms: 2_000,
            max_concurrent_jobs: 2,
        },
    );
    let payload = serde_json::to_value(pw_core::api::SettingsPayload {
        kinds,
        restart_pending: false,
    })
    .unwrap();
    let (status, body) = send(
        &h.router,
        Method::PUT,
        "/admin/settings",
        Some(SECRET),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restartPending"], false);

    // With an active job, the flag flips.
    seed_completed_session(&h.store, "s1").await;
    seed_project(&h.store, "p1").await;
    send(
        &h.router,
        Method::POST,
        "/internal/jobs",
        Some(SECRET),
        Some(json!({"sessionId": "s1", "projectId": "p1"})),
    )
    .await;
    let (_, body) = send(
        &h.router,
        Method::PUT,
        "/admin/settings",
        Some(SECRET),
        Some(payload),
    )
    .await;
    assert_eq!(body["restartPending"], true);

    let (_, body) = send(&h.router, Method::GET, "/admin/settings", Some(SECRET), None).await;
    assert_eq!(body["restartPending"], true);
    assert_eq!(body["kinds"]["Prof"]["instances"], 3);
}

#[tokio::test]
async fn batch_endpoints_roundtrip() {
    let h = harness().await;
    seed_project(&h.store, "p1").await;

    let (status, body) = send(
        &h.router,
        Method::POST,
        "/internal/batches",
        Some(SECRET),
        Some(json!({
            "projectId": "p1",
            "name": "upload",
            "files": [
                {"name": "a.txt", "content": "AA"},
                {"name": "b.txt", "content": "BB"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalJobs"], 2);
    let batch_id = body["batchId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &h.router,
        Method::GET,
        &format!("/internal/batches/{batch_id}"),
        Some(SECRET),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["perJob"].as_array().unwrap().len(), 2);
}
