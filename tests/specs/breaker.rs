// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker trajectories observed through full executor runs.

use pw_core::{Canvas, ExecutionStatus, FakeClock};
use pw_core::config::{BreakerConfig, IamConfig, ProviderConfig};
use pw_engine::{DagExecutor, NodeRegistry, PromptNode, TemplateNode};
use pw_gateway::{BreakerSnapshot, HttpProvider};
use pw_storage::Store;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn executor_against(
    server: &mockito::ServerGuard,
    store: &Store,
    dir: &tempfile::TempDir,
    clock: &FakeClock,
) -> (Arc<HttpProvider>, DagExecutor) {
    let provider = Arc::new(
        HttpProvider::new(
            &ProviderConfig {
                base_url: server.url(),
                api_key: Some("key".to_string()),
                oauth_token: None,
                iam_url: format!("{}/iam", server.url()),
                default_model: "m".to_string(),
            },
            &BreakerConfig::default(),
            &IamConfig::default(),
            Arc::new(clock.clone()),
        )
        .unwrap(),
    );
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(TemplateNode));
    registry.register(Arc::new(PromptNode::new(provider.clone())));
    let executor = DagExecutor::new(
        store.clone(),
        Arc::new(registry),
        dir.path().to_path_buf(),
        1,
        Arc::new(clock.clone()),
    );
    (provider, executor)
}

fn canvas_with_prompts(count: usize, stop_on_error: bool) -> Canvas {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for i in 0..count {
        nodes.push(json!({
            "id": format!("p{i}"),
            "type": "prompt",
            "data": {"template": format!("prompt {i}"), "stopOnError": stop_on_error}
        }));
        if i > 0 {
            edges.push(json!({"source": format!("p{}", i - 1), "target": format!("p{i}")}));
        }
    }
    // An independent branch that needs no provider.
    nodes.push(json!({"id": "side", "type": "template", "data": {"template": "side branch"}}));
    serde_json::from_value(json!({"nodes": nodes, "edges": edges})).unwrap()
}

fn request_for(canvas: &Canvas, job_id: &str) -> pw_engine::RunRequest {
    pw_engine::RunRequest {
        project_id: "p1".to_string(),
        project_name: "Prof".to_string(),
        job_id: Some(job_id.to_string()),
        session_id: None,
        nodes: canvas.nodes.clone(),
        edges: canvas.edges.clone(),
        initial_variables: BTreeMap::new(),
        clear_results: true,
    }
}

#[tokio::test]
async fn five_provider_failures_open_breaker_and_other_branches_continue() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("overloaded")
        .expect(5)
        .create_async()
        .await;

    let store = Store::open_in_memory().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let (provider, executor) = executor_against(&server, &store, &dir, &clock).await;

    // Six continue-on-error prompt nodes: the first five hit the wire,
    // the sixth fails fast on the open breaker.
    let canvas = canvas_with_prompts(6, false);
    let cancel = CancellationToken::new();
    let outcome = executor
        .run(request_for(&canvas, "job-breaker"), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.failed, 6);
    assert_eq!(outcome.executed, 1, "the template branch still ran");
    assert_eq!(outcome.status, ExecutionStatus::Completed, "no stop-on-error node");

    match provider.breaker().snapshot() {
        BreakerSnapshot::Open { remaining_secs } => {
            assert!(remaining_secs > 0 && remaining_secs <= 60);
        }
        other => panic!("expected open breaker, got {other:?}"),
    }

    // The breaker-rejected node recorded the cooldown in its log row.
    let logs = store
        .list_execution_logs(&outcome.execution_instance_id)
        .await
        .unwrap();
    let fast_failed = logs.iter().find(|l| l.node_id == "p5").unwrap();
    assert!(fast_failed
        .error
        .as_deref()
        .unwrap()
        .contains("provider unavailable, retry in"));
}

#[tokio::test]
async fn stop_on_error_node_fails_the_run() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .create_async()
        .await;

    let store = Store::open_in_memory().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let (_provider, executor) = executor_against(&server, &store, &dir, &clock).await;

    let canvas = canvas_with_prompts(3, true);
    let cancel = CancellationToken::new();
    let outcome = executor
        .run(request_for(&canvas, "job-stop"), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(outcome.failed, 1, "first prompt failed");
    assert_eq!(outcome.skipped, 2, "downstream prompts never ran");
}

#[tokio::test]
async fn half_open_trial_success_closes_after_cooldown() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .expect(5)
        .create_async()
        .await;

    let store = Store::open_in_memory().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let (provider, executor) = executor_against(&server, &store, &dir, &clock).await;

    let canvas = canvas_with_prompts(5, false);
    let cancel = CancellationToken::new();
    executor
        .run(request_for(&canvas, "job-a"), &cancel)
        .await
        .unwrap();
    failing.assert_async().await;
    assert!(matches!(
        provider.breaker().snapshot(),
        BreakerSnapshot::Open { .. }
    ));

    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(
            r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#,
        )
        .create_async()
        .await;
    clock.advance(std::time::Duration::from_secs(60));

    let single: Canvas = serde_json::from_value(json!({
        "nodes": [{"id": "p0", "type": "prompt", "data": {"template": "retry"}}],
        "edges": []
    }))
    .unwrap();
    let outcome = executor
        .run(request_for(&single, "job-b"), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.failed, 0);
    assert!(matches!(
        provider.breaker().snapshot(),
        BreakerSnapshot::Closed {
            consecutive_failures: 0
        }
    ));
}
