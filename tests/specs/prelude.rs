// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: a dispatcher on an ephemeral port, an optional worker
//! pool, a fake provider, and a scratch database.

use pw_core::{Canvas, Config, FakeClock, Response, Session, SessionStatus};
use pw_engine::{DagExecutor, NodeRegistry, PromptNode, SetVariablesNode, TemplateNode};
use pw_gateway::FakeProvider;
use pw_server::{build_router, reaper, AppState};
use pw_storage::{NewProject, Store};
use pw_worker::{HttpDispatchClient, JobRunner, WorkerPool, WorkerPoolConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SECRET: &str = "spec-secret";

pub struct Platform {
    pub store: Store,
    pub base_url: String,
    pub provider: FakeProvider,
    pub clock: FakeClock,
    pub config: Arc<Config>,
    pub cancel: CancellationToken,
    pub http: reqwest::Client,
    pool: Option<WorkerPool>,
    _dir: tempfile::TempDir,
}

impl Platform {
    /// Start the dispatcher (and reaper). Workers are started separately
    /// so reaper specs can model a dead worker.
    pub async fn start(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.backend_secret = SECRET.to_string();
        config.progress.log_dir = dir.path().join("logs");
        config.server.batch_output_dir = dir.path().join("batches");
        config.database.url = format!("sqlite://{}/pw.db", dir.path().display());
        configure(&mut config);
        let config = Arc::new(config);

        let store = Store::open(&config.database.url).await.unwrap();
        let clock = FakeClock::new();
        let cancel = CancellationToken::new();

        let state = AppState::new(
            store.clone(),
            Arc::clone(&config),
            Arc::new(clock.clone()),
        );
        let webhook = state.webhook.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        reaper::spawn_reaper(
            store.clone(),
            Arc::clone(&config),
            Arc::new(clock.clone()),
            webhook,
            cancel.clone(),
        );

        Self {
            store,
            base_url: format!("http://{addr}"),
            provider: FakeProvider::new(),
            clock,
            config,
            cancel,
            http: reqwest::Client::new(),
            pool: None,
            _dir: dir,
        }
    }

    /// Start `instances` workers per kind with a fast poll.
    pub fn start_workers(&mut self, kinds: &[&str], instances: u32) {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(TemplateNode));
        registry.register(Arc::new(SetVariablesNode));
        registry.register(Arc::new(PromptNode::new(Arc::new(self.provider.clone()))));

        let executor = Arc::new(DagExecutor::new(
            self.store.clone(),
            Arc::new(registry),
            self.config.progress.log_dir.clone(),
            self.config.executor.parallelism,
            Arc::new(self.clock.clone()),
        ));
        let client = Arc::new(HttpDispatchClient::new(self.base_url.clone(), SECRET));
        let runner = Arc::new(JobRunner::new(
            self.store.clone(),
            executor,
            client.clone(),
            Arc::clone(&self.config),
            Arc::new(self.clock.clone()),
        ));

        let mut pool_config = WorkerPoolConfig::default_for(kinds);
        for settings in pool_config.kinds.values_mut() {
            settings.instances = instances;
            settings.poll_interval_ms = 50;
        }
        self.pool = Some(WorkerPool::start(
            pool_config,
            runner,
            client,
            self.cancel.clone(),
        ));
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }

    // ---- seeding -------------------------------------------------------

    pub async fn seed_session(&self, id: &str, questions: u32) {
        self.store
            .insert_session(&Session {
                id: id.to_string(),
                user_id: Some("u1".to_string()),
                mode: "guided".to_string(),
                status: SessionStatus::Completed,
                total_questions: questions,
                current_index: questions,
                job_id: None,
                job_status: None,
                started_at: "2026-01-30T08:00:00Z".to_string(),
                completed_at: Some("2026-01-30T08:30:00Z".to_string()),
            })
            .await
            .unwrap();
        for q in 1..=questions {
            self.store
                .insert_response(&Response {
                    id: format!("r-{id}-{q}"),
                    session_id: id.to_string(),
                    question_id: q,
                    question_text: format!("Question {q}"),
                    answer: format!("Answer {q}"),
                    answered_at: "2026-01-30T08:10:00Z".to_string(),
                    time_spent: Some(20),
                    token_count: None,
                    char_count: None,
                })
                .await
                .unwrap();
        }
    }

    pub async fn seed_project(&self, id: &str, name: &str, canvas: Value) {
        self.store
            .insert_project(
                NewProject {
                    id: id.to_string(),
                    name: name.to_string(),
                    is_system: false,
                    canvas: serde_json::from_value::<Canvas>(canvas).unwrap(),
                },
                "2026-01-30T08:00:00Z",
            )
            .await
            .unwrap();
    }

    // ---- HTTP helpers --------------------------------------------------

    pub async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("X-Backend-Secret", SECRET)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn patch(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .patch(format!("{}{path}", self.base_url))
            .header("X-Backend-Secret", SECRET)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header("X-Backend-Secret", SECRET)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

/// Poll `probe` until it returns Some or the deadline passes.
pub async fn wait_until<T>(
    deadline: Duration,
    mut probe: impl AsyncFnMut() -> Option<T>,
) -> Option<T> {
    let start = std::time::Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if start.elapsed() > deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A 12-node project that ends by publishing the three canonical reports.
pub fn twelve_node_report_canvas() -> Value {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    // Two parallel chains of five template nodes each.
    for chain in 0..2 {
        for step in 0..5 {
            let id = format!("c{chain}n{step}");
            nodes.push(serde_json::json!({
                "id": id,
                "type": "template",
                "label": format!("Chain {chain} step {step}"),
                "data": {"template": format!("chain {chain} step {step}: {{{{input_text}}}}")}
            }));
            if step > 0 {
                edges.push(serde_json::json!({
                    "source": format!("c{chain}n{}", step - 1),
                    "target": id
                }));
            }
        }
    }

    // A prompt node joining both chains, then the report publisher.
    nodes.push(serde_json::json!({
        "id": "analyze",
        "type": "prompt",
        "label": "Analyze",
        "data": {"template": "Analyze: {{input_text}}", "outputVariable": "analysis"}
    }));
    edges.push(serde_json::json!({"source": "c0n4", "target": "analyze"}));
    edges.push(serde_json::json!({"source": "c1n4", "target": "analyze"}));
    nodes.push(serde_json::json!({
        "id": "publish",
        "type": "set_variables",
        "label": "Publish reports",
        "data": {"variables": {
            "Adapted Report": "adapted: {{analysis}}",
            "Professional Report": "professional: {{analysis}}",
            "Aggregate Score Profile": "scores: {{analysis}}"
        }}
    }));
    edges.push(serde_json::json!({"source": "analyze", "target": "publish"}));

    serde_json::json!({"nodes": nodes, "edges": edges})
}
