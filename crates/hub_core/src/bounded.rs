//! Deadline + retry wrapper for single asynchronous calls.
//!
//! Every attempt runs under its own deadline. A timed-out attempt is dropped,
//! which cancels the underlying call, so a late reply can never reach the
//! caller. Timers live inside the attempt loop and are dropped on every exit
//! path.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::oneshot, task::AbortHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry as soon as an attempt fails.
    #[default]
    None,
    /// Wait `base`, then `2 * base`, ... never longer than `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    fn delay_after(self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                Some(base.saturating_mul(factor).min(max))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    per_attempt_timeout: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Result<Self, BoundedError> {
        if max_attempts == 0 {
            return Err(BoundedError::InvalidPolicy("max_attempts must be at least 1"));
        }
        if per_attempt_timeout.is_zero() {
            return Err(BoundedError::InvalidPolicy(
                "per_attempt_timeout must be greater than zero",
            ));
        }
        Ok(Self {
            max_attempts,
            per_attempt_timeout,
            backoff: Backoff::None,
        })
    }

    /// Three attempts, fifteen seconds each, no backoff.
    pub const fn network_default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff: Backoff::None,
        }
    }

    /// Three attempts, ten seconds each, no backoff.
    pub const fn hub_document_default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: Duration::from_secs(10),
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::network_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMethod {
    #[default]
    Get,
    Head,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: FetchMethod,
    pub accept: Option<String>,
}

/// One bounded call: what to reach and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    target: String,
    policy: RetryPolicy,
    options: RequestOptions,
}

impl OperationRequest {
    pub fn new(target: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            target: target.into(),
            policy,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundedError {
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(&'static str),
    #[error("gave up on {target} after {attempts} attempt(s): {cause}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        cause: AttemptFailure,
    },
    #[error("operation on {target} cancelled after {attempts} attempt(s)")]
    Cancelled { target: String, attempts: u32 },
}

impl BoundedError {
    pub fn attempts(&self) -> u32 {
        match self {
            BoundedError::InvalidPolicy(_) => 0,
            BoundedError::RetriesExhausted { attempts, .. }
            | BoundedError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// True when the final attempt ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BoundedError::RetriesExhausted {
                cause: AttemptFailure::Timeout(_),
                ..
            }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BoundedError::Cancelled { .. })
    }
}

/// A single retryable call. Implementations must be safe to drop mid-flight.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn attempt(
        &self,
        request: &OperationRequest,
        attempt: u32,
    ) -> anyhow::Result<Self::Output>;
}

/// Runs operations under a [`RetryPolicy`].
///
/// All handles spawned from one executor share a parent cancellation token, so
/// [`BoundedExecutor::shutdown`] abandons every outstanding call at once.
#[derive(Debug, Clone, Default)]
pub struct BoundedExecutor {
    root: CancellationToken,
}

impl BoundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` to settlement on the current task.
    pub async fn execute<O>(
        &self,
        request: &OperationRequest,
        operation: &O,
    ) -> Result<O::Output, BoundedError>
    where
        O: Operation + ?Sized,
    {
        let cancel = self.root.child_token();
        let attempts = AtomicU32::new(0);
        run_attempts(operation, request, &cancel, &attempts).await
    }

    /// Runs `operation` on its own task and returns a cancellable handle.
    pub fn spawn<O>(&self, request: OperationRequest, operation: Arc<O>) -> OperationHandle<O::Output>
    where
        O: Operation,
    {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(HandleShared {
            target: request.target().to_string(),
            cancel: self.root.child_token(),
            attempts: AtomicU32::new(0),
            delivery: Mutex::new(Some(tx)),
            task: Mutex::new(None),
        });

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let result = run_attempts(
                operation.as_ref(),
                &request,
                &task_shared.cancel,
                &task_shared.attempts,
            )
            .await;
            task_shared.deliver(result);
        });
        *shared.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());

        OperationHandle {
            shared,
            outcome: rx,
        }
    }

    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

async fn run_attempts<O>(
    operation: &O,
    request: &OperationRequest,
    cancel: &CancellationToken,
    attempts: &AtomicU32,
) -> Result<O::Output, BoundedError>
where
    O: Operation + ?Sized,
{
    let policy = *request.policy();
    let cancelled = |attempts: u32| BoundedError::Cancelled {
        target: request.target().to_string(),
        attempts,
    };

    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(attempt));
        }
        attempt += 1;
        attempts.store(attempt, Ordering::Release);
        debug!(
            op_target = request.target(),
            attempt,
            max_attempts = policy.max_attempts,
            "bounded: attempt start"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(attempt)),
            outcome = tokio::time::timeout(
                policy.per_attempt_timeout,
                operation.attempt(request, attempt),
            ) => outcome,
        };

        let failure = match outcome {
            Ok(Ok(value)) => {
                debug!(op_target = request.target(), attempt, "bounded: attempt succeeded");
                return Ok(value);
            }
            Ok(Err(err)) => AttemptFailure::Failed(format!("{err:#}")),
            Err(_) => AttemptFailure::Timeout(policy.per_attempt_timeout),
        };
        warn!(
            op_target = request.target(),
            attempt,
            max_attempts = policy.max_attempts,
            "bounded: attempt failed: {failure}"
        );

        if attempt >= policy.max_attempts {
            return Err(BoundedError::RetriesExhausted {
                target: request.target().to_string(),
                attempts: attempt,
                cause: failure,
            });
        }

        if let Some(delay) = policy.backoff.delay_after(attempt) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(attempt)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

struct HandleShared<T> {
    target: String,
    cancel: CancellationToken,
    attempts: AtomicU32,
    delivery: Mutex<Option<oneshot::Sender<Result<T, BoundedError>>>>,
    task: Mutex<Option<AbortHandle>>,
}

impl<T> HandleShared<T> {
    fn deliver(&self, result: Result<T, BoundedError>) {
        let sender = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(op_target = %self.target, "bounded: discarding result of cancelled operation"),
        }
    }
}

trait CancelSlot: Send + Sync {
    fn cancel(&self);
}

impl<T: Send> CancelSlot for HandleShared<T> {
    fn cancel(&self) {
        let sender = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Already settled: nothing to cancel.
        let Some(tx) = sender else {
            return;
        };

        self.cancel.cancel();
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let attempts = self.attempts.load(Ordering::Acquire);
        debug!(op_target = %self.target, attempts, "bounded: operation cancelled");
        let _ = tx.send(Err(BoundedError::Cancelled {
            target: self.target.clone(),
            attempts,
        }));
    }
}

/// Handle to a spawned bounded operation.
pub struct OperationHandle<T> {
    shared: Arc<HandleShared<T>>,
    outcome: oneshot::Receiver<Result<T, BoundedError>>,
}

impl<T: Send + 'static> OperationHandle<T> {
    /// Stops further attempts and abandons the one in flight. Safe to call
    /// repeatedly and after settlement.
    pub fn cancel(&self) {
        CancelSlot::cancel(self.shared.as_ref());
    }

    /// A detached cancel capability, usable after `outcome` consumed the handle.
    pub fn canceller(&self) -> OperationCanceller {
        OperationCanceller {
            slot: Arc::clone(&self.shared) as Arc<dyn CancelSlot>,
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }

    pub async fn outcome(self) -> Result<T, BoundedError> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => Err(BoundedError::Cancelled {
                target: self.shared.target.clone(),
                attempts: self.shared.attempts.load(Ordering::Acquire),
            }),
        }
    }
}

#[derive(Clone)]
pub struct OperationCanceller {
    slot: Arc<dyn CancelSlot>,
}

impl OperationCanceller {
    pub fn cancel(&self) {
        self.slot.cancel();
    }
}

impl std::fmt::Debug for OperationCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCanceller").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/bounded_tests.rs"]
mod tests;
