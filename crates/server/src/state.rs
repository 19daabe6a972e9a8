// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state handed to every route handler.

use crate::dispatch::Dispatcher;
use crate::webhook::WebhookSender;
use pw_core::{Clock, Config};
use pw_storage::Store;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: Dispatcher,
    /// Shared with the reaper so its terminal transitions deliver the
    /// same webhook a worker-reported failure would.
    pub webhook: WebhookSender,
    /// Set when settings changed while jobs were active; cleared only by a
    /// worker restart, which re-reads settings.
    pub settings_pending: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(store: Store, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        let webhook = WebhookSender::new(
            config.server.ui_webhook_url.clone(),
            config.server.backend_secret.clone(),
            config.webhook.clone(),
        );
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::clone(&config),
            Arc::clone(&clock),
            webhook.clone(),
        );
        Self {
            store,
            config,
            clock,
            dispatcher,
            webhook,
            settings_pending: Arc::new(AtomicBool::new(false)),
        }
    }
}
