// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leasing under contention: every job goes to exactly one worker.

use pw_core::JobPayload;
use pw_storage::{NewJob, Store};
use std::collections::HashMap;

const WORKERS: usize = 100;
const JOBS: usize = 500;

#[tokio::test]
async fn five_hundred_jobs_hand_to_exactly_one_worker_each() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&format!("sqlite://{}/contention.db", dir.path().display()))
        .await
        .unwrap();

    for i in 0..JOBS {
        store
            .insert_job(
                NewJob {
                    id: format!("job-{i:04}"),
                    session_id: None,
                    project_id: "p1".to_string(),
                    batch_id: None,
                    pipeline_kind: "Prof".to_string(),
                    payload: JobPayload::default(),
                },
                i as u64,
            )
            .await
            .unwrap();
    }

    // 100 workers lease batches of 5 until the queue is dry.
    let mut handles = Vec::new();
    for w in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let worker_id = format!("w{w:03}");
            let mut claimed = Vec::new();
            loop {
                let jobs = store
                    .lease_jobs(&worker_id, "Prof", 5, 1_000_000, 60_000)
                    .await
                    .unwrap();
                if jobs.is_empty() {
                    return claimed;
                }
                claimed.extend(jobs.into_iter().map(|j| j.id));
            }
        }));
    }

    let mut owners: HashMap<String, Vec<String>> = HashMap::new();
    for (w, handle) in handles.into_iter().enumerate() {
        for job_id in handle.await.unwrap() {
            owners.entry(job_id).or_default().push(format!("w{w:03}"));
        }
    }

    assert_eq!(owners.len(), JOBS, "every job was claimed");
    let contested: Vec<_> = owners
        .iter()
        .filter(|(_, workers)| workers.len() > 1)
        .collect();
    assert!(
        contested.is_empty(),
        "jobs claimed by more than one worker: {contested:?}"
    );

    // Nothing queued remains; every job is processing with a worker.
    let remaining = store
        .lease_jobs("late", "Prof", 10, 1_000_000, 60_000)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}
