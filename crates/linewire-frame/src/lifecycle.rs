//! Endpoint lifecycle: a single-fire disposal signal shared by every
//! in-flight operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{FrameError, Result};

/// Disposal coordinator for one endpoint.
///
/// Cloning shares the same signal. The transition from live to disposed
/// happens exactly once and is never reset.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    disposed: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once [`dispose`](Lifecycle::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fire the disposal signal.
    ///
    /// Returns true for the call that performed the transition and false for
    /// every later call.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// The disposal token. Fires when the endpoint is disposed.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Check the preconditions shared by every operation: not disposed, then
    /// not already cancelled by the caller.
    pub fn check(&self, caller: &CancellationToken) -> Result<()> {
        if self.is_disposed() {
            return Err(FrameError::Disposed);
        }
        if caller.is_cancelled() {
            return Err(FrameError::Cancelled);
        }
        Ok(())
    }

    /// Run `fut` unless the endpoint is disposed first.
    ///
    /// Used once an operation holds the gate: from there on only disposal may
    /// interrupt it, never the caller's own token.
    pub async fn unless_disposed<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FrameError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Combine the caller's token with the disposal signal.
    pub fn joint<'a>(&'a self, caller: &'a CancellationToken) -> JointSignal<'a> {
        JointSignal {
            caller,
            disposal: &self.token,
        }
    }
}

/// Logical OR of a caller's cancellation token and an endpoint's disposal
/// signal. Either one firing aborts a wait.
#[derive(Debug, Clone, Copy)]
pub struct JointSignal<'a> {
    caller: &'a CancellationToken,
    disposal: &'a CancellationToken,
}

impl JointSignal<'_> {
    /// Returns true if either side has fired.
    pub fn is_set(&self) -> bool {
        self.caller.is_cancelled() || self.disposal.is_cancelled()
    }

    /// Returns true if the endpoint side has fired.
    pub fn is_disposed(&self) -> bool {
        self.disposal.is_cancelled()
    }

    /// Completes when either side fires.
    pub async fn fired(&self) {
        tokio::select! {
            _ = self.caller.cancelled() => {}
            _ = self.disposal.cancelled() => {}
        }
    }

    /// Run `fut` unless the signal fires first.
    pub async fn guard<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        if self.is_set() {
            return Err(FrameError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.fired() => Err(FrameError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Map an I/O failure: once the signal is set any failure is reported as
    /// cancellation, otherwise it is a fault.
    pub fn map_io(&self, err: std::io::Error) -> FrameError {
        if self.is_set() {
            FrameError::Cancelled
        } else {
            FrameError::Io(err)
        }
    }
}
