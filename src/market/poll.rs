use crate::error::AppError;
use crate::market::normalizer::normalize;
use crate::market::types::{PollConfig, MAX_FETCH_ATTEMPTS};
use crate::session::now_unix_ms;
use crate::state::{AppState, PollHandle};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const POLL_ERROR_STATUS: &str = "Error fetching market data";

/// Transport seam for the market poll, injected so tests can script
/// responses and failures without a network.
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, AppError>;
}

pub struct HttpMarketFetcher {
    client: Client,
}

impl HttpMarketFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpMarketFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketFetcher for HttpMarketFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, AppError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// One attempt chain: up to `MAX_FETCH_ATTEMPTS` tries with no backoff.
async fn fetch_with_retry(fetcher: &dyn MarketFetcher, url: &str) -> Result<Value, AppError> {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        match fetcher.fetch(url).await {
            Ok(document) => return Ok(document),
            Err(error) if attempt < MAX_FETCH_ATTEMPTS => {
                debug!(%error, attempt, "market fetch failed, retrying");
            }
            Err(error) => return Err(error),
        }
    }
}

fn status_from_document(document: &Value) -> Option<&str> {
    document
        .get("Body")
        .or_else(|| document.get("body"))
        .and_then(Value::as_str)
}

/// Applies one successful poll response: status text, normalized chart data,
/// and the digest annotation on the active session. Returns whether the
/// session collection changed. An unresolvable document leaves the previous
/// chart untouched.
fn apply_market_document(state: &AppState, document: &Value) -> bool {
    if let Some(status) = status_from_document(document) {
        state.market.lock().status = status.to_string();
    }

    let Some(update) = normalize(document) else {
        return false;
    };

    let digest = update.digest_text.clone();
    state.market.lock().update = Some(update);
    state
        .sessions
        .lock()
        .push_digest_annotation(&digest, now_unix_ms())
}

async fn poll_tick(state: &AppState, fetcher: &dyn MarketFetcher, url: &str) {
    match fetch_with_retry(fetcher, url).await {
        Ok(document) => {
            if apply_market_document(state, &document) {
                let snapshot = state.sessions.lock().clone();
                state.store.persist(&snapshot).await;
            }
        }
        Err(error) => {
            warn!(%error, url, "market poll failed after retries");
            state.market.lock().status = POLL_ERROR_STATUS.to_string();
        }
    }
}

pub async fn run_market_poll(
    state: Arc<AppState>,
    fetcher: Arc<dyn MarketFetcher>,
    config: PollConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms));
    // An overrunning tick delays the next one; ticks never stack.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = poll_tick(&state, fetcher.as_ref(), &config.url) => {}
                }
            }
        }
    }
}

/// Starts (or restarts) the poll task. Any previous task is cancelled and
/// awaited first so reconfiguration never leaves an orphaned timer running.
pub async fn start_market_poll(
    state: &Arc<AppState>,
    fetcher: Arc<dyn MarketFetcher>,
    config: PollConfig,
) {
    let existing_handle = {
        let mut poll_slot = state.poll.lock().await;
        poll_slot.take()
    };
    if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let task_state = Arc::clone(state);

    let join_handle = tokio::spawn(async move {
        run_market_poll(task_state, fetcher, config, task_token).await;
    });

    {
        let mut poll_slot = state.poll.lock().await;
        *poll_slot = Some(PollHandle {
            cancellation_token,
            join_handle,
        });
    }
}

pub async fn stop_market_poll(state: &Arc<AppState>) -> bool {
    let existing_handle = {
        let mut poll_slot = state.poll.lock().await;
        poll_slot.take()
    };

    match existing_handle {
        Some(handle) => {
            handle.cancellation_token.cancel();
            let _ = handle.join_handle.await;
            true
        }
        None => false,
    }
}
