//! Cancellation tokens and the hierarchical cancellation scope tree.
//!
//! Signals run under a tree of [`CancellationScope`]s. Cancelling a scope
//! records a one-shot `(reason, trigger)` pair and propagates to every
//! descendant scope; tokens derived from a scope wake promptly instead of
//! polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::Notify;

/// A cloneable token used to signal cancellation across async operations.
///
/// All clones share the same underlying state; cancelling one immediately
/// makes every clone observe `is_cancelled() == true`. A token may be
/// derived from parent tokens, in which case it also observes every
/// parent's cancellation.
///
/// # Examples
///
/// ```
/// use liftoff::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    parents: Vec<CancellationToken>,
}

impl CancellationToken {
    /// Creates a new token that is **not** cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parents(Vec::new())
    }

    /// Creates a child token that is cancelled when either this token or
    /// the new token itself is cancelled.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child_token(&self) -> Self {
        Self::with_parents(vec![self.clone()])
    }

    /// Creates a token observing every parent in `parents`.
    pub(crate) fn derived<I>(parents: I) -> Self
    where
        I: IntoIterator<Item = CancellationToken>,
    {
        Self::with_parents(parents.into_iter().collect())
    }

    fn with_parents(parents: Vec<CancellationToken>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parents,
            }),
        }
    }

    /// Signals cancellation. Idempotent — calling more than once is harmless.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` if this token or any of its parents has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.inner.parents.iter().any(CancellationToken::is_cancelled)
    }

    /// Returns an error if the token is cancelled.
    ///
    /// Intended for cooperative signal implementations:
    /// `token.throw_if_cancelled()?;` at suspension points.
    pub fn throw_if_cancelled(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Returns a future that completes when cancellation is requested.
    ///
    /// Resolves immediately if the token (or a parent) is already
    /// cancelled. Suitable for `tokio::select!`.
    pub fn cancelled(&self) -> futures::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                // Register interest before checking the flag so a cancel
                // between the check and the await cannot be missed.
                notified.as_mut().enable();
                if self.is_cancelled() {
                    return;
                }
                if self.inner.parents.is_empty() {
                    notified.await;
                } else {
                    let parents = self
                        .inner
                        .parents
                        .iter()
                        .map(CancellationToken::cancelled)
                        .collect::<Vec<_>>();
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = futures::future::select_all(parents) => return,
                    }
                }
            }
        })
    }

    /// Creates a token that cancels itself after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let armed = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            armed.cancel();
        });
        token
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Error produced when an operation observes cancellation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    /// Creates a new cancellation error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ── CancellationReason ──────────────────────────────────────────────

/// Why a scope was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "timeline-export",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum CancellationReason {
    /// The coordinator-wide deadline expired under a hard global timeout.
    GlobalTimeout,
    /// A per-signal deadline expired.
    SignalTimeout,
    /// A signal failed and its scope is configured to cancel on failure.
    SignalFailure,
    /// A prerequisite of a dependent signal failed.
    DependencyFailure,
    /// The ambient token passed to `wait_all` was cancelled.
    Manual,
}

impl CancellationReason {
    /// Human-readable description of the reason.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::GlobalTimeout => "global startup deadline expired",
            Self::SignalTimeout => "per-signal deadline expired",
            Self::SignalFailure => "a signal in the scope failed",
            Self::DependencyFailure => "a prerequisite signal failed",
            Self::Manual => "cancelled by the caller",
        }
    }
}

/// The immutable `(reason, trigger)` pair recorded by the first
/// cancellation of a scope.
#[derive(Debug, Clone)]
pub struct CancellationCause {
    /// Why the scope was cancelled.
    pub reason: CancellationReason,
    /// Name of the signal that triggered cancellation, if any.
    pub trigger: Option<String>,
}

// ── CancellationScope ───────────────────────────────────────────────

/// A node in the cancellation tree.
///
/// A scope owns a [`CancellationToken`] and a one-shot cause latch.
/// Cancellation propagates from a scope to all of its descendants, never
/// the reverse; the first cancellation wins and its `(reason, trigger)`
/// pair is immutable thereafter.
///
/// # Examples
///
/// ```
/// use liftoff::{CancellationScope, CancellationReason};
///
/// let root = CancellationScope::root("startup");
/// let db = root.child("database");
///
/// root.cancel(CancellationReason::Manual, None);
/// assert!(db.is_cancelled());
/// assert_eq!(db.cause().unwrap().reason, CancellationReason::Manual);
/// ```
#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    token: CancellationToken,
    cause: OnceLock<CancellationCause>,
    children: Mutex<Vec<CancellationScope>>,
}

impl CancellationScope {
    /// Creates a root scope with the given name.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self::with_token(name, CancellationToken::new())
    }

    /// Creates a child scope that inherits cancellation from this scope.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let child = Self::with_token(name, self.inner.token.child_token());
        self.inner
            .children
            .lock()
            .expect("scope children lock poisoned")
            .push(child.clone());
        // A scope cancelled before the child was attached still reaches it.
        if let Some(cause) = self.cause() {
            child.cancel_with(cause);
        }
        child
    }

    fn with_token(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                token,
                cause: OnceLock::new(),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The scope's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns an observable token for consumers of this scope.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Cancels the scope with a reason and optional triggering signal name.
    ///
    /// Idempotent: only the first cancellation records its cause; later
    /// calls have no effect on the recorded pair. Cancellation propagates
    /// synchronously to every descendant scope.
    pub fn cancel(&self, reason: CancellationReason, trigger: Option<&str>) {
        self.cancel_with(CancellationCause {
            reason,
            trigger: trigger.map(str::to_string),
        });
    }

    fn cancel_with(&self, cause: CancellationCause) {
        if self.inner.cause.set(cause.clone()).is_ok() {
            self.inner.token.cancel();
            let children = self
                .inner
                .children
                .lock()
                .expect("scope children lock poisoned")
                .clone();
            for child in children {
                child.cancel_with(cause.clone());
            }
        }
    }

    /// Returns `true` once the scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cause.get().is_some()
    }

    /// The recorded cancellation cause, if the scope was cancelled.
    #[must_use]
    pub fn cause(&self) -> Option<CancellationCause> {
        self.inner.cause.get().cloned()
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("name", &self.inner.name)
            .field("cause", &self.inner.cause.get())
            .finish()
    }
}
