// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pw_core::config::WebhookConfig;
use pw_core::{FakeClock, JobPayload, Session, SessionStatus};
use pw_storage::NewJob;
use std::time::Duration as StdDuration;

async fn seed(store: &Store, job_id: &str, session_id: Option<&str>) {
    if let Some(sid) = session_id {
        store
            .insert_session(&Session {
                id: sid.to_string(),
                user_id: None,
                mode: "guided".to_string(),
                status: SessionStatus::Completed,
                total_questions: 0,
                current_index: 0,
                job_id: Some(job_id.to_string()),
                job_status: Some("processing".to_string()),
                started_at: "2026-01-30T08:00:00Z".to_string(),
                completed_at: None,
            })
            .await
            .unwrap();
    }
    store
        .insert_job(
            NewJob {
                id: job_id.to_string(),
                session_id: session_id.map(str::to_string),
                project_id: "p1".to_string(),
                batch_id: None,
                pipeline_kind: "Prof".to_string(),
                payload: JobPayload::default(),
            },
            0,
        )
        .await
        .unwrap();
}

fn short_lease_config() -> Arc<Config> {
    let mut config = Config::default();
    // 0.05 minutes = 3 seconds.
    config.lease.initial_minutes = 0.05;
    Arc::new(config)
}

#[tokio::test]
async fn expired_lease_returns_to_queue_with_retry_one() {
    let store = Store::open_in_memory().await.unwrap();
    let clock = FakeClock::new();
    let config = short_lease_config();
    let webhook = WebhookSender::disabled();
    seed(&store, "j1", None).await;

    store
        .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), config.lease.initial_ms())
        .await
        .unwrap();

    // Before the lease window: nothing to reap.
    let (requeued, failed) = reap_once(&store, &config, &clock, &webhook).await;
    assert!(requeued.is_empty() && failed.is_empty());

    clock.advance(StdDuration::from_secs(4));
    let (requeued, failed) = reap_once(&store, &config, &clock, &webhook).await;
    assert_eq!(requeued, vec!["j1".to_string()]);
    assert!(failed.is_empty());

    let job = store.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retries, 1);
    assert_eq!(job.worker_id, None);
}

#[tokio::test]
async fn third_reap_fails_job_and_propagates() {
    let store = Store::open_in_memory().await.unwrap();
    let clock = FakeClock::new();
    let config = short_lease_config();
    let webhook = WebhookSender::disabled();
    seed(&store, "j1", Some("s1")).await;

    for round in 1..=2u32 {
        store
            .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), config.lease.initial_ms())
            .await
            .unwrap();
        clock.advance(StdDuration::from_secs(4));
        let (requeued, _) = reap_once(&store, &config, &clock, &webhook).await;
        assert_eq!(requeued.len(), 1, "round {round}");
    }

    store
        .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), config.lease.initial_ms())
        .await
        .unwrap();
    clock.advance(StdDuration::from_secs(4));
    let (requeued, failed) = reap_once(&store, &config, &clock, &webhook).await;
    assert!(requeued.is_empty());
    assert_eq!(failed, vec!["j1".to_string()]);

    let job = store.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_text.as_deref(), Some("max retries exceeded"));
    let session = store.get_session("s1").await.unwrap().unwrap();
    assert_eq!(session.job_status.as_deref(), Some("failed"));
}

#[tokio::test]
async fn reaped_failure_delivers_terminal_webhook() {
    use std::sync::atomic::{AtomicU32, Ordering};

    // Front-end stand-in records the terminal delivery.
    let hits = Arc::new(AtomicU32::new(0));
    let body: Arc<std::sync::Mutex<Option<serde_json::Value>>> =
        Arc::new(std::sync::Mutex::new(None));
    let hits_handler = Arc::clone(&hits);
    let body_slot = Arc::clone(&body);
    let ui = axum::Router::new().route(
        "/external/jobs/:id",
        axum::routing::patch(
            move |axum::Json(payload): axum::Json<serde_json::Value>| {
                let hits = Arc::clone(&hits_handler);
                let slot = Arc::clone(&body_slot);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    *slot.lock().unwrap() = Some(payload);
                    axum::http::StatusCode::OK
                }
            },
        ),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ui).await.unwrap();
    });

    let store = Store::open_in_memory().await.unwrap();
    let clock = FakeClock::new();
    let mut config = Config::default();
    config.lease.initial_minutes = 0.05;
    config.lease.max_retries = 1;
    let config = Arc::new(config);
    let webhook = WebhookSender::new(
        Some(format!("http://{addr}/external/jobs")),
        "hunter2".to_string(),
        WebhookConfig {
            backoff_ms: 1,
            backoff_cap_ms: 4,
            max_attempts: 3,
        },
    );
    seed(&store, "j1", Some("s1")).await;

    // One expired lease with max_retries=1 fails the job outright.
    store
        .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), config.lease.initial_ms())
        .await
        .unwrap();
    clock.advance(StdDuration::from_secs(4));
    let (_, failed) = reap_once(&store, &config, &clock, &webhook).await;
    assert_eq!(failed, vec!["j1".to_string()]);

    // Delivery is spawned; wait for it to land.
    for _ in 0..200 {
        if hits.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1, "terminal webhook delivered");
    let delivered = body.lock().unwrap().clone().unwrap();
    assert_eq!(delivered["jobId"], "j1");
    assert_eq!(delivered["sessionId"], "s1");
    assert_eq!(delivered["status"], "failed");
    assert_eq!(delivered["error"], "max retries exceeded");
}

#[tokio::test]
async fn healthy_leases_are_untouched() {
    let store = Store::open_in_memory().await.unwrap();
    let clock = FakeClock::new();
    let config = Arc::new(Config::default());
    let webhook = WebhookSender::disabled();
    seed(&store, "j1", None).await;
    store
        .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), config.lease.initial_ms())
        .await
        .unwrap();

    clock.advance(StdDuration::from_secs(60));
    let (requeued, failed) = reap_once(&store, &config, &clock, &webhook).await;
    assert!(requeued.is_empty() && failed.is_empty());
    let job = store.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test]
async fn spawned_reaper_sweeps_periodically() {
    let store = Store::open_in_memory().await.unwrap();
    let clock = FakeClock::new();
    let mut config = Config::default();
    config.lease.initial_minutes = 0.0;
    config.server.reap_interval_ms = 10;
    let config = Arc::new(config);
    seed(&store, "j1", None).await;
    store
        .lease_jobs("w1", "Prof", 1, clock.epoch_ms(), 0)
        .await
        .unwrap();
    clock.advance(StdDuration::from_secs(1));

    let cancel = CancellationToken::new();
    let handle = spawn_reaper(
        store.clone(),
        config,
        Arc::new(clock.clone()),
        WebhookSender::disabled(),
        cancel.clone(),
    );

    // Wait for the sweep to requeue the job.
    for _ in 0..100 {
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let job = store.get_job("j1").await.unwrap().unwrap();
        if job.status == JobStatus::Queued {
            break;
        }
    }
    let job = store.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    cancel.cancel();
    handle.await.unwrap();
}
