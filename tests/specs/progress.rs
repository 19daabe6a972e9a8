// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress stream reads through the admin endpoint.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;

fn five_node_canvas() -> serde_json::Value {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for i in 0..5 {
        nodes.push(json!({
            "id": format!("n{i}"),
            "type": "template",
            "label": format!("Step {i}"),
            "data": {"template": format!("step {i}")}
        }));
        if i > 0 {
            edges.push(json!({"source": format!("n{}", i - 1), "target": format!("n{i}")}));
        }
    }
    json!({"nodes": nodes, "edges": edges})
}

#[tokio::test]
async fn offset_reads_return_only_new_lines() {
    let mut platform = Platform::start(|_| {}).await;
    platform.seed_session("s1", 1).await;
    platform.seed_project("p1", "Prof", five_node_canvas()).await;
    platform.start_workers(&["Prof"], 1);

    let (_, body) = platform
        .post("/internal/jobs", json!({"sessionId": "s1", "projectId": "p1"}))
        .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // Wait for the run to finish, then page through its progress.
    wait_until(Duration::from_secs(10), async || {
        let (_, poll) = platform.get("/internal/jobs/s1").await;
        (poll["status"] == "completed").then_some(())
    })
    .await
    .expect("run finished");

    let (status, first) = platform
        .get(&format!("/admin/jobs/{job_id}/progress?offset=0"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(first["total"], 5);
    assert_eq!(first["lines"].as_array().unwrap().len(), 5);

    // A second read from (total - 1) returns only the newest line.
    let offset = first["total"].as_u64().unwrap() - 1;
    let (_, second) = platform
        .get(&format!("/admin/jobs/{job_id}/progress?offset={offset}"))
        .await;
    assert_eq!(second["total"], 5);
    let lines = second["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);

    // The final line reports full completion: done == executed + failed.
    let last = lines[0].as_str().unwrap();
    assert!(last.contains("5/5 (100%)"), "got line: {last}");
    assert!(last.contains("✅ COMPLETED"));

    // Progress matches the execution record.
    let instance = platform
        .store
        .latest_execution_for_job(&job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first["total"].as_u64().unwrap() as u32,
        instance.executed_nodes + instance.failed_nodes
    );

    // Reads past the end are empty, not an error.
    let (_, overshoot) = platform
        .get(&format!("/admin/jobs/{job_id}/progress?offset=999"))
        .await;
    assert!(overshoot["lines"].as_array().unwrap().is_empty());

    platform.stop().await;
}

#[tokio::test]
async fn unknown_job_reads_empty_progress() {
    let platform = Platform::start(|_| {}).await;
    let (status, body) = platform
        .get("/admin/jobs/no-such-job/progress?offset=0")
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 0);
    platform.stop().await;
}
