// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in node kinds.
//!
//! The registry stays open: deployments register additional kinds at
//! startup. These three cover the template/variable/LLM plumbing every
//! project uses.

use crate::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use crate::template::resolve_template;
use async_trait::async_trait;
use pw_gateway::{ChatMessage, ChatProvider, ChatRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn resolve_with_warning(node_id: &str, template: &str, ctx: &NodeContext) -> String {
    let variables = ctx.env.variables();
    let (resolved, unresolved) = resolve_template(template, &variables);
    if !unresolved.is_empty() {
        tracing::warn!(
            node_id,
            unresolved = ?unresolved,
            counter.template_unresolved = unresolved.len() as u64,
            "template references unknown variables"
        );
    }
    resolved
}

/// `template`: resolve a text template and optionally publish it.
pub struct TemplateNode;

#[async_trait]
impl NodeHandler for TemplateNode {
    fn kind(&self) -> &'static str {
        "template"
    }

    async fn evaluate(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let template = ctx
            .data
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::new("template node missing 'template'"))?;
        let text = resolve_with_warning(&ctx.node_id, template, &ctx);

        let mut env_writes = HashMap::new();
        if let Some(name) = ctx.data.get("outputVariable").and_then(Value::as_str) {
            env_writes.insert(name.to_string(), text.clone());
        }
        Ok(NodeOutput {
            value: json!({ "text": text }),
            env_writes,
        })
    }
}

/// `set_variables`: publish a map of resolved values into the environment.
pub struct SetVariablesNode;

#[async_trait]
impl NodeHandler for SetVariablesNode {
    fn kind(&self) -> &'static str {
        "set_variables"
    }

    async fn evaluate(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let Some(variables) = ctx.data.get("variables").and_then(Value::as_object) else {
            return Err(NodeError::new("set_variables node missing 'variables'"));
        };

        let mut env_writes = HashMap::new();
        for (name, value) in variables {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env_writes.insert(name.clone(), resolve_with_warning(&ctx.node_id, &raw, &ctx));
        }
        Ok(NodeOutput {
            value: json!({ "variables": env_writes }),
            env_writes,
        })
    }
}

/// `prompt`: templated chat completion through the provider gateway.
pub struct PromptNode {
    provider: Arc<dyn ChatProvider>,
}

impl PromptNode {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl NodeHandler for PromptNode {
    fn kind(&self) -> &'static str {
        "prompt"
    }

    async fn evaluate(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let template = ctx
            .data
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::new("prompt node missing 'template'"))?;
        let user = resolve_with_warning(&ctx.node_id, template, &ctx);

        let mut messages = Vec::new();
        if let Some(system) = ctx.data.get("system").and_then(Value::as_str) {
            messages.push(ChatMessage::system(resolve_with_warning(
                &ctx.node_id,
                system,
                &ctx,
            )));
        }
        messages.push(ChatMessage::user(user));

        let request = ChatRequest {
            model: ctx
                .data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            messages,
            temperature: ctx.data.get("temperature").and_then(Value::as_f64),
            top_p: ctx.data.get("topP").and_then(Value::as_f64),
            max_tokens: ctx
                .data
                .get("maxTokens")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            reasoning_effort: ctx
                .data
                .get("reasoningEffort")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..ChatRequest::default()
        };

        let response = self.provider.complete(request).await?;
        let text = response.text().to_string();

        let mut env_writes = HashMap::new();
        if let Some(name) = ctx.data.get("outputVariable").and_then(Value::as_str) {
            env_writes.insert(name.to_string(), text.clone());
        }
        Ok(NodeOutput {
            value: json!({
                "text": text,
                "response": serde_json::to_value(&response)
                    .unwrap_or(Value::Null),
            }),
            env_writes,
        })
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
