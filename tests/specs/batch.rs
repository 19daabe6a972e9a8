// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch fan-out: a folder of texts becomes sibling jobs with aggregate
//! status.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;

/// One prompt node; a provider failure fails the whole run.
fn single_prompt_canvas() -> serde_json::Value {
    json!({
        "nodes": [{
            "id": "analyze",
            "type": "prompt",
            "data": {"template": "Analyze {{source_name}}: {{input_text}}", "stopOnError": true}
        }],
        "edges": []
    })
}

#[tokio::test]
async fn three_files_two_complete_one_failed_is_partial() {
    let mut platform = Platform::start(|_| {}).await;
    platform
        .seed_project("p1", "Prof Batch", single_prompt_canvas())
        .await;

    // Jobs are leased oldest-first by a single worker, so replies land in
    // file order: a and b succeed, c fails.
    platform.provider.push_text("analysis of AA");
    platform.provider.push_text("analysis of BB");
    platform
        .provider
        .push_error(|| pw_gateway::GatewayError::ProviderError {
            status: 500,
            message: "boom".to_string(),
        });

    let (status, body) = platform
        .post(
            "/internal/batches",
            json!({
                "projectId": "p1",
                "name": "folder upload",
                "files": [
                    {"name": "a.txt", "content": "AA"},
                    {"name": "b.txt", "content": "BB"},
                    {"name": "c.txt", "content": "CC"}
                ]
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["totalJobs"], 3);
    let batch_id = body["batchId"].as_str().unwrap().to_string();

    // Sibling jobs share the batch id and carry per-file variables.
    let jobs = platform.store.jobs_for_batch(&batch_id).await.unwrap();
    assert_eq!(jobs.len(), 3);
    for job in &jobs {
        let vars = &job.payload.initial_variables;
        assert_eq!(vars["batch_id"].value, batch_id);
        assert!(vars["output_dir"].value.contains(&batch_id));
        assert!(vars["output_dir"].value.ends_with('/'));
    }

    platform.start_workers(&["Prof"], 1);

    let final_status = wait_until(Duration::from_secs(10), async || {
        let (_, body) = platform
            .get(&format!("/internal/batches/{batch_id}"))
            .await;
        let done = body["completedJobs"].as_u64().unwrap_or(0)
            + body["failedJobs"].as_u64().unwrap_or(0);
        (done == 3).then_some(body)
    })
    .await
    .expect("batch finished");

    assert_eq!(final_status["status"], "partial");
    assert_eq!(final_status["completedJobs"], 2);
    assert_eq!(final_status["failedJobs"], 1);
    assert_eq!(final_status["totalJobs"], 3);

    let per_job = final_status["perJob"].as_array().unwrap();
    assert_eq!(per_job.len(), 3);
    let failed: Vec<_> = per_job
        .iter()
        .filter(|j| j["status"] == "failed")
        .collect();
    assert_eq!(failed.len(), 1);

    platform.stop().await;
}

#[tokio::test]
async fn batch_of_successes_completes() {
    let mut platform = Platform::start(|_| {}).await;
    platform
        .seed_project("p1", "Prof Batch", single_prompt_canvas())
        .await;
    // Unscripted provider echoes the prompt, so every job completes.

    let (_, body) = platform
        .post(
            "/internal/batches",
            json!({
                "projectId": "p1",
                "name": "upload",
                "files": [
                    {"name": "x.txt", "content": "XX"},
                    {"name": "y.txt", "content": "YY"}
                ]
            }),
        )
        .await;
    let batch_id = body["batchId"].as_str().unwrap().to_string();
    platform.start_workers(&["Prof"], 2);

    let final_status = wait_until(Duration::from_secs(10), async || {
        let (_, body) = platform
            .get(&format!("/internal/batches/{batch_id}"))
            .await;
        (body["status"] == "completed").then_some(body)
    })
    .await
    .expect("batch completed");
    assert_eq!(final_status["completedJobs"], 2);
    assert_eq!(final_status["failedJobs"], 0);

    let batch = platform.store.get_batch(&batch_id).await.unwrap().unwrap();
    assert!(batch.completed_at_ms.is_some());

    platform.stop().await;
}
