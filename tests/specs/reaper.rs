// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reaper behavior against a worker that leases and then disappears.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;

/// Lease through the HTTP surface like a worker would, then never report.
async fn lease_one(platform: &Platform) -> String {
    let (status, body) = platform
        .get("/external/jobs?status=queued&kind=Prof&batch=1&worker=dead-worker")
        .await;
    assert_eq!(status, 200);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1, "expected one leased job");
    jobs[0]["jobId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn expired_leases_requeue_then_fail_on_third_reap() {
    let platform = Platform::start(|config| {
        // 0.05 minutes = 3 seconds of lease.
        config.lease.initial_minutes = 0.05;
        config.server.reap_interval_ms = 50;
    })
    .await;
    platform.seed_session("s1", 1).await;
    platform
        .seed_project("p1", "Prof", twelve_node_report_canvas())
        .await;
    let (_, body) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // Round 1: lease, let it expire, expect retries=1 back in queue.
    let leased = lease_one(&platform).await;
    assert_eq!(leased, job_id);
    platform.clock.advance(Duration::from_secs(4));
    let requeued = wait_until(Duration::from_secs(5), async || {
        let job = platform.store.get_job(&job_id).await.unwrap().unwrap();
        (job.status == pw_core::JobStatus::Queued).then_some(job)
    })
    .await
    .expect("first reap requeued the job");
    assert_eq!(requeued.retries, 1);
    assert_eq!(requeued.worker_id, None);

    // Round 2.
    lease_one(&platform).await;
    platform.clock.advance(Duration::from_secs(4));
    let requeued = wait_until(Duration::from_secs(5), async || {
        let job = platform.store.get_job(&job_id).await.unwrap().unwrap();
        (job.status == pw_core::JobStatus::Queued).then_some(job)
    })
    .await
    .expect("second reap requeued the job");
    assert_eq!(requeued.retries, 2);

    // Round 3: past the bound, the job fails.
    lease_one(&platform).await;
    platform.clock.advance(Duration::from_secs(4));
    let failed = wait_until(Duration::from_secs(5), async || {
        let job = platform.store.get_job(&job_id).await.unwrap().unwrap();
        (job.status == pw_core::JobStatus::Failed).then_some(job)
    })
    .await
    .expect("third reap failed the job");
    assert_eq!(failed.error_text.as_deref(), Some("max retries exceeded"));

    let session = platform.store.get_session("s1").await.unwrap().unwrap();
    assert_eq!(session.job_status.as_deref(), Some("failed"));

    platform.stop().await;
}
