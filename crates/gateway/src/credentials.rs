// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential translation: long-lived OAuth tokens become short-lived IAM
//! bearers via a dedicated exchange endpoint, cached per token with TTL
//! refresh.

use crate::GatewayError;
use parking_lot::Mutex;
use pw_core::Clock;
use std::collections::HashMap;
use std::sync::Arc;

/// How the gateway authenticates against the provider.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Short-lived API key used as the bearer directly.
    ApiKey(String),
    /// Long-lived OAuth token exchanged for IAM bearers.
    OAuth(String),
}

/// Performs the OAuth → IAM exchange. Implemented over HTTP in production
/// and faked in tests.
#[async_trait::async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, oauth_token: &str) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at_ms: u64,
    token_hash: u64,
}

#[derive(Default)]
struct Entry {
    token: Option<CachedToken>,
    /// Serializes refreshes per key; readers never wait on it.
    refresh: Arc<tokio::sync::Mutex<()>>,
}

/// Process-local IAM token cache.
///
/// Keyed by a non-cryptographic FNV-1a hash of the OAuth token so the
/// long-lived secret itself is never used as a map key or logged.
pub struct IamTokenCache {
    entries: Mutex<HashMap<u64, Entry>>,
    ttl_ms: u64,
    refresh_window_ms: u64,
    clock: Arc<dyn Clock>,
}

/// 64-bit FNV-1a.
fn fnv1a64(input: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl IamTokenCache {
    pub fn new(ttl_ms: u64, refresh_window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms,
            refresh_window_ms,
            clock,
        }
    }

    /// Return a valid bearer for the OAuth token, exchanging only when the
    /// cached one is missing or inside the refresh window.
    ///
    /// Concurrent callers for the same key coalesce onto a single exchange.
    pub async fn bearer(
        &self,
        oauth_token: &str,
        exchanger: &dyn TokenExchanger,
    ) -> Result<String, GatewayError> {
        let key = fnv1a64(oauth_token);
        let now = self.clock.epoch_ms();

        let refresh_lock = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key).or_default();
            if let Some(cached) = &entry.token {
                if !self.needs_refresh(cached, now) {
                    return Ok(cached.token.clone());
                }
                tracing::debug!(
                    token_hash = cached.token_hash,
                    expires_at_ms = cached.expires_at_ms,
                    "iam token inside refresh window"
                );
            }
            Arc::clone(&entry.refresh)
        };

        // One refresh in flight per key; losers of the race re-check the
        // cache after the winner has written.
        let _guard = refresh_lock.lock().await;
        let now = self.clock.epoch_ms();
        {
            let entries = self.entries.lock();
            if let Some(cached) = entries.get(&key).and_then(|e| e.token.as_ref()) {
                if !self.needs_refresh(cached, now) {
                    return Ok(cached.token.clone());
                }
            }
        }

        tracing::debug!(token_hash = key, "exchanging oauth token for iam bearer");
        let token = exchanger.exchange(oauth_token).await?;
        let cached = CachedToken {
            token: token.clone(),
            expires_at_ms: now + self.ttl_ms,
            token_hash: key,
        };
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.token = Some(cached);
        }
        Ok(token)
    }

    fn needs_refresh(&self, cached: &CachedToken, now_ms: u64) -> bool {
        now_ms + self.refresh_window_ms >= cached.expires_at_ms
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
