//! Signals: named units of startup readiness work.
//!
//! A signal is anything the application must finish before it starts
//! serving traffic — a database ping, a cache warm-up, a migration run.
//! Implement [`Signal`] for reusable readiness probes, or build a
//! [`SignalDescriptor`] from a closure or future for one-off work.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cancellation::{CancellationScope, CancellationToken};

/// Failure type produced by a signal's wait operation.
pub type SignalError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type WaitFuture = Pin<Box<dyn Future<Output = Result<(), SignalError>> + Send>>;

/// An asynchronous readiness operation with a stable name.
///
/// Implementations are expected to honor the token when practical; the
/// coordinator does not require cooperation, but its cancellation-latency
/// guarantees degrade for signals that ignore it.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use liftoff::{CancellationToken, Signal, SignalError};
///
/// struct DatabasePing {
///     connection_string: String,
/// }
///
/// #[async_trait]
/// impl Signal for DatabasePing {
///     fn name(&self) -> &str {
///         "database"
///     }
///
///     async fn wait(&self, token: CancellationToken) -> Result<(), SignalError> {
///         token.throw_if_cancelled()?;
///         // ping self.connection_string here
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Signal: Send + Sync {
    /// The signal's unique, stable name.
    fn name(&self) -> &str;

    /// Optional per-signal timeout. Defaults to none.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Performs the readiness work, observing `token` for cancellation.
    async fn wait(&self, token: CancellationToken) -> Result<(), SignalError>;
}

/// Whether a signal is plain or bound to a cancellation scope.
#[derive(Clone)]
pub enum SignalKind {
    /// Not bound to any scope; runs under the coordinator root only.
    Plain,
    /// Bound to a scope. When `cancel_scope_on_failure` is set, a
    /// non-success terminal status cancels the scope, taking the
    /// scope's other signals down with it.
    Scoped {
        /// The owning scope.
        scope: CancellationScope,
        /// Cancel the scope when this signal does not succeed.
        cancel_scope_on_failure: bool,
    },
}

enum WaitOp {
    /// Re-invocable closure. Invoked at most once by the coordinator.
    Factory(Arc<dyn Fn(CancellationToken) -> WaitFuture + Send + Sync>),
    /// A trait-object signal.
    Trait(Arc<dyn Signal>),
    /// A pre-existing future, consumed on first invocation.
    Once(Mutex<Option<WaitFuture>>),
}

/// A registered signal: the wait operation plus its scheduling metadata.
///
/// Built fluently and handed to
/// [`SignalCollection::add`](crate::SignalCollection::add):
///
/// ```
/// use std::time::Duration;
/// use liftoff::SignalDescriptor;
///
/// let descriptor = SignalDescriptor::new("cache", |_token| async {
///     // warm the cache here
///     Ok(())
/// })
/// .with_timeout(Duration::from_secs(5))
/// .after(["database"]);
///
/// assert_eq!(descriptor.name(), "cache");
/// assert_eq!(descriptor.prerequisites(), ["database"]);
/// ```
pub struct SignalDescriptor {
    name: String,
    wait: WaitOp,
    timeout: Option<Duration>,
    scope: Option<CancellationScope>,
    cancel_scope_on_failure: bool,
    stage: Option<usize>,
    prerequisites: Vec<String>,
}

impl SignalDescriptor {
    /// Creates a descriptor from a factory closure that receives the
    /// signal's effective cancellation token.
    pub fn new<F, Fut>(name: impl Into<String>, wait: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        Self::with_op(
            name.into(),
            WaitOp::Factory(Arc::new(move |token| -> WaitFuture {
                Box::pin(wait(token))
            })),
        )
    }

    /// Creates a descriptor from a [`Signal`] trait object, adopting its
    /// name and declared timeout.
    pub fn from_signal<S>(signal: S) -> Self
    where
        S: Signal + 'static,
    {
        let name = signal.name().to_string();
        let timeout = signal.timeout();
        let mut descriptor = Self::with_op(name, WaitOp::Trait(Arc::new(signal)));
        descriptor.timeout = timeout;
        descriptor
    }

    /// Creates a descriptor from a pre-existing future.
    ///
    /// The future cannot observe the cancellation token; prefer
    /// [`SignalDescriptor::new`] for cancellation-aware work.
    pub fn from_future<Fut>(name: impl Into<String>, future: Fut) -> Self
    where
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        Self::with_op(
            name.into(),
            WaitOp::Once(Mutex::new(Some(Box::pin(future)))),
        )
    }

    fn with_op(name: String, wait: WaitOp) -> Self {
        Self {
            name,
            wait,
            timeout: None,
            scope: None,
            cancel_scope_on_failure: false,
            stage: None,
            prerequisites: Vec::new(),
        }
    }

    /// Sets the per-signal timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Assigns the signal to a stage (staged execution mode).
    #[must_use]
    pub fn in_stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Declares prerequisite signals by name (dependency-aware mode).
    #[must_use]
    pub fn after<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    /// Binds the signal to a cancellation scope.
    #[must_use]
    pub fn in_scope(mut self, scope: &CancellationScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// Cancels the bound scope when this signal does not succeed.
    #[must_use]
    pub fn cancel_scope_on_failure(mut self) -> Self {
        self.cancel_scope_on_failure = true;
        self
    }

    /// The signal's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared per-signal timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The declared stage index, if any.
    #[must_use]
    pub fn stage(&self) -> Option<usize> {
        self.stage
    }

    /// The declared prerequisite names.
    #[must_use]
    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    /// The signal's kind: plain or scope-bound.
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match &self.scope {
            None => SignalKind::Plain,
            Some(scope) => SignalKind::Scoped {
                scope: scope.clone(),
                cancel_scope_on_failure: self.cancel_scope_on_failure,
            },
        }
    }

    pub(crate) fn scope(&self) -> Option<&CancellationScope> {
        self.scope.as_ref()
    }

    pub(crate) fn cancels_scope_on_failure(&self) -> bool {
        self.cancel_scope_on_failure && self.scope.is_some()
    }

    /// Starts the wait operation. The coordinator calls this at most once.
    pub(crate) fn invoke(&self, token: CancellationToken) -> WaitFuture {
        match &self.wait {
            WaitOp::Factory(factory) => factory(token),
            WaitOp::Trait(signal) => {
                let signal = Arc::clone(signal);
                Box::pin(async move { signal.wait(token).await })
            }
            WaitOp::Once(slot) => {
                let future = slot
                    .lock()
                    .expect("signal future lock poisoned")
                    .take();
                match future {
                    Some(future) => future,
                    None => Box::pin(async {
                        Err(SignalError::from("readiness future already consumed"))
                    }),
                }
            }
        }
    }
}

impl std::fmt::Debug for SignalDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalDescriptor")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("stage", &self.stage)
            .field("prerequisites", &self.prerequisites)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}
