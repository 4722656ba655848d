//! HTTP listener for confirmations from the external payment backend.
//!
//! The payment backend is reachable only through a confirmation callback:
//! it POSTs one document per resolved transaction, and the embedding
//! application drains the accumulated documents and forwards each to
//! `Orchestrator::confirm_payment`. The listener never resolves a gate by
//! itself.
//!
//! ## Usage
//!
//! ```no_run
//! use ascent::payment::ConfirmationListener;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut listener = ConfirmationListener::new();
//! let callback_url = listener.start().await?;
//!
//! // Hand callback_url to the payment backend...
//! // The backend POSTs to {callback_url}/confirmations.
//!
//! let confirmations = listener.drain().await;
//!
//! listener.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};

use super::PaymentConfirmation;

/// Maximum confirmations retained before the oldest is dropped. Bounds
/// memory against a misbehaving backend.
const DEFAULT_MAX_PENDING: usize = 1_000;

/// One confirmation document POSTed by the payment backend.
///
/// Wire shape: `{ "gate_id": "...", "confirmed": true,
/// "transaction_reference": "...", ... }` — the confirmation fields sit
/// flat beside the gate id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfirmation {
    pub gate_id: String,
    #[serde(flatten)]
    pub confirmation: PaymentConfirmation,
}

#[derive(Debug)]
pub(crate) struct ListenerState {
    pub(crate) pending: VecDeque<GateConfirmation>,
    pub(crate) running: bool,
    pub(crate) max_pending: usize,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            running: false,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl ListenerState {
    fn push(&mut self, confirmation: GateConfirmation) {
        if self.pending.len() >= self.max_pending {
            self.pending.pop_front();
        }
        self.pending.push_back(confirmation);
    }
}

/// Localhost HTTP endpoint the payment backend calls back into.
pub struct ConfirmationListener {
    state: Arc<RwLock<ListenerState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: Option<SocketAddr>,
}

impl Default for ConfirmationListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationListener {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ListenerState::default())),
            shutdown_tx: None,
            addr: None,
        }
    }

    /// Bind to a dynamic localhost port and start serving.
    ///
    /// Returns the callback URL to hand to the payment backend.
    pub async fn start(&mut self) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind confirmation listener")?;
        let addr = listener
            .local_addr()
            .context("Failed to get listener address")?;
        self.addr = Some(addr);

        {
            let mut state = self.state.write().await;
            state.running = true;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let state = self.state.clone();
        let app = build_router(state);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!("confirmation listener error: {e}");
            }
        });

        Ok(format!("http://{}", addr))
    }

    /// Stop serving gracefully.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        {
            let mut state = self.state.write().await;
            state.running = false;
        }
        self.addr = None;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn callback_url(&self) -> Option<String> {
        self.addr.map(|addr| format!("http://{}", addr))
    }

    /// Take all accumulated confirmations, clearing the buffer.
    pub async fn drain(&self) -> Vec<GateConfirmation> {
        let mut state = self.state.write().await;
        state.pending.drain(..).collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }
}

fn build_router(state: Arc<RwLock<ListenerState>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/confirmations", post(confirmation_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn confirmation_handler(
    State(state): State<Arc<RwLock<ListenerState>>>,
    Json(confirmation): Json<GateConfirmation>,
) -> StatusCode {
    let mut state = state.write().await;
    state.push(confirmation);
    StatusCode::ACCEPTED
}
