// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{{name}}` template resolution against the derived variables map.
//!
//! Dotted paths index into JSON-parsed variable values. Unresolved names
//! expand to the empty string and are reported back so callers can emit
//! the warning metric; resolution never hard-fails.

use std::collections::HashMap;

/// Resolve every `{{name}}` placeholder in `template`.
///
/// Returns the resolved text and the list of names that did not resolve.
pub fn resolve_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder: keep the literal text.
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = after[..end].trim();
        match lookup(name, variables) {
            Some(value) => output.push_str(&value),
            None => unresolved.push(name.to_string()),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    (output, unresolved)
}

/// Look a name up, following dotted paths into JSON values.
fn lookup(name: &str, variables: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = variables.get(name) {
        return Some(value.clone());
    }
    let (head, path) = name.split_once('.')?;
    let raw = variables.get(head)?;
    let parsed: serde_json::Value = serde_json::from_str(raw).ok()?;
    let mut current = &parsed;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(match current {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
