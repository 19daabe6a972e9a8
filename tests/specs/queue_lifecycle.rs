// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue-and-finish: enqueue → lease → run → reports → webhook.

use crate::prelude::*;
use pw_core::{JobStatus, ReportType, Visibility};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn session_job_runs_to_completion_with_three_reports() {
    // A local front-end stand-in records webhook deliveries.
    let webhook_hits = Arc::new(AtomicU32::new(0));
    let webhook_body: Arc<std::sync::Mutex<Option<serde_json::Value>>> =
        Arc::new(std::sync::Mutex::new(None));
    let hits = Arc::clone(&webhook_hits);
    let body_slot = Arc::clone(&webhook_body);
    let ui = axum::Router::new().route(
        "/external/jobs/:id",
        axum::routing::patch(move |axum::Json(body): axum::Json<serde_json::Value>| {
            let hits = Arc::clone(&hits);
            let slot = Arc::clone(&body_slot);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                *slot.lock().unwrap() = Some(body);
                axum::http::StatusCode::OK
            }
        }),
    );
    let ui_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ui_addr = ui_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(ui_listener, ui).await.unwrap();
    });

    let mut platform = Platform::start(|config| {
        config.server.ui_webhook_url = Some(format!("http://{ui_addr}/external/jobs"));
    })
    .await;
    platform.provider.push_text("deep analysis");
    platform.seed_session("s1", 3).await;
    platform
        .seed_project("p1", "Prof Assessment", twelve_node_report_canvas())
        .await;
    platform.start_workers(&["Prof"], 1);

    let (status, body) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    assert_eq!(status, 200);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // The worker must pick the job up within poll interval + slack and
    // finish the 12-node run.
    let completed = wait_until(Duration::from_secs(10), async || {
        let (_, poll) = platform.get("/internal/jobs/s1").await;
        (poll["status"] == "completed").then_some(poll)
    })
    .await
    .expect("job completed in time");

    assert_eq!(completed["jobId"], job_id.as_str());
    let reports = &completed["reports"];
    assert_eq!(reports["Adapted Report"], "adapted: deep analysis");
    assert_eq!(reports["Professional Report"], "professional: deep analysis");
    assert_eq!(reports["Aggregate Score Profile"], "scores: deep analysis");

    // Stored rows follow the canonical mapping.
    let stored = platform.store.list_reports("s1").await.unwrap();
    assert_eq!(stored.len(), 3);
    let adapted = stored
        .iter()
        .find(|r| r.report_type == ReportType::Adapted)
        .unwrap();
    assert_eq!(adapted.visibility, Visibility::Private);
    let full = stored
        .iter()
        .find(|r| r.report_type == ReportType::Full)
        .unwrap();
    assert_eq!(full.visibility, Visibility::Restricted);

    // Session back-reference and execution accounting.
    let session = platform.store.get_session("s1").await.unwrap().unwrap();
    assert_eq!(session.job_status.as_deref(), Some("completed"));
    let instance = platform
        .store
        .latest_execution_for_job(&job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.executed_nodes, 12);
    assert_eq!(instance.failed_nodes, 0);
    assert_eq!(
        platform.store.count_execution_logs(&instance.id).await.unwrap(),
        12
    );

    // Webhook landed with the reports payload.
    wait_until(Duration::from_secs(5), async || {
        (webhook_hits.load(Ordering::SeqCst) > 0).then_some(())
    })
    .await
    .expect("webhook delivered");
    let delivered = webhook_body.lock().unwrap().clone().unwrap();
    assert_eq!(delivered["sessionId"], "s1");
    assert_eq!(delivered["status"], "completed");
    assert_eq!(delivered["reports"]["Adapted Report"], "adapted: deep analysis");

    // Re-enqueueing a finished session is a conflict.
    let (status, body) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["kind"], "conflict");

    platform.stop().await;
}

#[tokio::test]
async fn enqueue_is_idempotent_while_queued() {
    let platform = Platform::start(|_| {}).await;
    platform.seed_session("s1", 1).await;
    platform
        .seed_project("p1", "Prof", twelve_node_report_canvas())
        .await;

    let (_, first) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    let (_, second) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    assert_eq!(first["jobId"], second["jobId"]);

    let job = platform
        .store
        .get_job(first["jobId"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    platform.stop().await;
}
