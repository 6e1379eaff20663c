//! # Raffle Runtime
//!
//! Executes the effect descriptions returned by reducers.
//!
//! Services in the raffle application follow a fixed order: run the reducer,
//! persist the resulting state, then hand the effects to an
//! [`EffectExecutor`]. Effects run on spawned tokio tasks so the HTTP request
//! that triggered them never waits on an email provider or the Telegram API.
//!
//! ## Example
//!
//! ```ignore
//! use raffle_runtime::EffectExecutor;
//!
//! let executor = EffectExecutor::new(|action: TicketAction| {
//!     tracing::warn!(?action, "effect produced feedback");
//! });
//!
//! let effects = reducer.reduce(&mut state, action, &env);
//! repository.save(state.changed()).await?;
//! let mut handle = executor.execute(effects)?;
//! handle.wait().await; // only tests usually wait
//! ```

#![forbid(unsafe_code)]

use futures::future::{join_all, BoxFuture, FutureExt};
use raffle_core::effect::Effect;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Error types for effect execution
pub mod error {
    use thiserror::Error;

    /// Errors that can occur while scheduling or draining effects
    #[derive(Error, Debug, PartialEq, Eq)]
    pub enum RuntimeError {
        /// The executor is shutting down and not accepting new effects
        #[error("Effect executor is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::RuntimeError;

/// Callback receiving actions produced by `Effect::Future` and `Effect::Delay`.
type Feedback<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Handle to a batch of effects scheduled by [`EffectExecutor::execute`].
///
/// Dropping the handle does not cancel the effects.
#[derive(Clone, Debug)]
pub struct EffectHandle {
    done: watch::Receiver<bool>,
}

impl EffectHandle {
    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self { done: rx }
    }

    /// Returns true once every effect in the batch has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait for all effects in the batch to complete
    pub async fn wait(&mut self) {
        while !*self.done.borrow() {
            // Sender dropped means the task finished or panicked.
            if self.done.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fire-and-forget executor for reducer effects.
///
/// Cloning is cheap; clones share the pending counter and shutdown flag.
pub struct EffectExecutor<A> {
    feedback: Feedback<A>,
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl<A> Clone for EffectExecutor<A> {
    fn clone(&self) -> Self {
        Self {
            feedback: Arc::clone(&self.feedback),
            pending: Arc::clone(&self.pending),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<A> std::fmt::Debug for EffectExecutor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectExecutor")
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .field("shutdown", &self.shutdown.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<A> EffectExecutor<A>
where
    A: Send + 'static,
{
    /// Create an executor that forwards feedback actions to `feedback`.
    #[must_use]
    pub fn new<F>(feedback: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            feedback: Arc::new(feedback),
            pending: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an executor that drops feedback actions.
    #[must_use]
    pub fn discarding() -> Self {
        Self::new(|_action: A| {})
    }

    /// Number of effect batches still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Schedule a batch of effects on a spawned task.
    ///
    /// The batch runs as if wrapped in `Effect::Parallel`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownInProgress`] after [`Self::shutdown`]
    /// has been called.
    #[tracing::instrument(skip_all, name = "execute_effects")]
    pub fn execute<I>(&self, effects: I) -> Result<EffectHandle, RuntimeError>
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(RuntimeError::ShutdownInProgress);
        }

        let effects: Vec<Effect<A>> = effects
            .into_iter()
            .filter(|effect| !matches!(effect, Effect::None))
            .collect();

        if effects.is_empty() {
            return Ok(EffectHandle::completed());
        }

        let (tx, rx) = watch::channel(false);
        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.pending));
        let feedback = Arc::clone(&self.feedback);

        tokio::spawn(async move {
            let _guard = guard;
            run(Effect::Parallel(effects), feedback).await;
            let _ = tx.send(true);
        });

        Ok(EffectHandle { done: rx })
    }

    /// Stop accepting new effects and wait for running ones.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] if effects are still running
    /// when `timeout` elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        tracing::info!("Draining effect executor");
        self.shutdown.store(true, Ordering::Release);

        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            let pending = self.pending.load(Ordering::Acquire);
            if pending == 0 {
                tracing::info!("All effects completed");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Effect drain timed out");
                return Err(RuntimeError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Run one effect to completion, recursing into composite effects.
fn run<A>(effect: Effect<A>, feedback: Feedback<A>) -> BoxFuture<'static, ()>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => {},
            Effect::Future(fut) => {
                metrics::counter!("effects.executed", "type" => "future").increment(1);
                if let Some(action) = fut.await {
                    feedback(action);
                }
            },
            Effect::Delay { duration, action } => {
                metrics::counter!("effects.executed", "type" => "delay").increment(1);
                tokio::time::sleep(duration).await;
                feedback(*action);
            },
            Effect::Parallel(effects) => {
                join_all(
                    effects
                        .into_iter()
                        .map(|effect| run(effect, Arc::clone(&feedback))),
                )
                .await;
            },
            Effect::Sequential(effects) => {
                for effect in effects {
                    run(effect, Arc::clone(&feedback)).await;
                }
            },
        }
    }
    .boxed()
}
