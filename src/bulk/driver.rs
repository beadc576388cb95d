//! Caller-side bulk resolve loop.
//!
//! Carries [`BulkResolveState`] between steps, sleeps the inter-step delay and
//! applies the server's batch hints. Failed steps back off (half the batch,
//! twice the delay) and the failure message is surfaced once until a step
//! succeeds again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{backoff, ResolveAllRequest, ResolveAllResponse};
use crate::config::{MAX_RESOLVE_ALL_BATCH_SIZE, MIN_RESOLVE_ALL_BATCH_SIZE};
use crate::error_handling::ServiceError;

/// Anything that can run one bulk resolve step (in-process or over HTTP).
#[async_trait]
pub trait ResolveAllStepper: Send + Sync {
    async fn resolve_all_step(
        &self,
        request: ResolveAllRequest,
    ) -> Result<ResolveAllResponse, ServiceError>;
}

/// Session state the caller carries from step to step.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkResolveState {
    pub token: Option<String>,
    pub cursor: i64,
    pub processed: i64,
    pub total: i64,
    pub batch_size: usize,
    pub inter_step_delay: Duration,
    pub last_step_duration: Duration,
    pub step_budget: Duration,
    pub steps: usize,
    pub done: bool,
    /// Delay to return to once a step succeeds after a back-off.
    base_delay: Duration,
    error_notified: bool,
}

impl BulkResolveState {
    pub fn new(batch_size: usize, inter_step_delay: Duration) -> Self {
        Self {
            token: None,
            cursor: 0,
            processed: 0,
            total: 0,
            batch_size: batch_size.clamp(MIN_RESOLVE_ALL_BATCH_SIZE, MAX_RESOLVE_ALL_BATCH_SIZE),
            inter_step_delay,
            last_step_duration: Duration::ZERO,
            step_budget: Duration::ZERO,
            steps: 0,
            done: false,
            base_delay: inter_step_delay,
            error_notified: false,
        }
    }

    fn request(&self) -> ResolveAllRequest {
        ResolveAllRequest {
            token: self.token.clone(),
            cursor: self.cursor,
            batch: Some(self.batch_size),
            processed: self.processed,
            total: self.total,
        }
    }

    fn apply(&mut self, response: &ResolveAllResponse) {
        self.token = Some(response.token.clone()).filter(|t| !t.is_empty());
        self.cursor = response.cursor;
        self.processed = response.processed;
        self.total = response.total;
        self.last_step_duration = Duration::from_secs_f64(response.last_step_seconds.max(0.0));
        self.step_budget = Duration::from_secs_f64(response.step_budget_secs.max(0.0));
        if let Some(next) = response.next_batch {
            self.batch_size = next.clamp(MIN_RESOLVE_ALL_BATCH_SIZE, MAX_RESOLVE_ALL_BATCH_SIZE);
        }
        self.done = response.done;
        self.inter_step_delay = self.base_delay;
        self.error_notified = false;
        self.steps += 1;
    }

    /// Halves the batch and doubles the delay. True the first time in a
    /// failure streak, when the caller should hear about it.
    fn back_off(&mut self) -> bool {
        let (batch, delay) = backoff(self.batch_size, self.inter_step_delay);
        self.batch_size = batch;
        self.inter_step_delay = delay;
        !std::mem::replace(&mut self.error_notified, true)
    }
}

type Notifier = Box<dyn Fn(&str) + Send + Sync>;

pub struct BulkResolveDriver {
    stepper: Arc<dyn ResolveAllStepper>,
    cancel: CancellationToken,
    max_consecutive_errors: usize,
    notify: Option<Notifier>,
}

impl BulkResolveDriver {
    pub fn new(stepper: Arc<dyn ResolveAllStepper>) -> Self {
        Self {
            stepper,
            cancel: CancellationToken::new(),
            max_consecutive_errors: 5,
            notify: None,
        }
    }

    /// Called with a failure message, at most once between successful steps.
    pub fn on_error<F>(mut self, notify: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.notify = Some(Box::new(notify));
        self
    }

    /// Gives up after this many failed steps in a row.
    pub fn max_consecutive_errors(mut self, n: usize) -> Self {
        self.max_consecutive_errors = n.max(1);
        self
    }

    /// Token that stops the loop before its next step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Steps until the session is done, cancelled or fails for good.
    ///
    /// # Errors
    ///
    /// Terminal errors (permission, expired or conflicting session) end the
    /// loop at once; other errors end it after `max_consecutive_errors`.
    pub async fn run(&self, mut state: BulkResolveState) -> Result<BulkResolveState, ServiceError> {
        let mut consecutive_errors = 0;

        while !state.done && !self.cancel.is_cancelled() {
            match self.stepper.resolve_all_step(state.request()).await {
                Ok(response) => {
                    consecutive_errors = 0;
                    state.apply(&response);
                    log::debug!(
                        "Bulk resolve step {}: {}/{} (next batch {})",
                        state.steps,
                        state.processed,
                        state.total,
                        state.batch_size
                    );
                    if state.done {
                        break;
                    }
                }
                Err(e) if e.is_terminal() => {
                    log::warn!("Bulk resolve stopped: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if state.back_off() {
                        log::warn!("Bulk resolve step failed: {}", e);
                        if let Some(notify) = &self.notify {
                            notify(&e.message());
                        }
                    }
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(e);
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(state.inter_step_delay) => {}
            }
        }

        Ok(state)
    }
}
