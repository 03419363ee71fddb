//! Signing session state machine
//!
//! `pending -> signing_in_progress -> signed`, or `pending | signing_in_progress
//! -> expired`. Terminal states never change. Entering `signing_in_progress`
//! is an atomic check-and-set that hands out a [`SubmitGuard`]; only the
//! guard can commit, and a guard dropped without committing puts the session
//! back to `pending` so the recipient can retry.

use crate::error::LifecycleError;
use shared_types::SessionStatus;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    SigningInProgress,
    Signed,
    Expired,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Signed | LifecycleState::Expired)
    }
}

impl From<SessionStatus> for LifecycleState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Pending => LifecycleState::Pending,
            SessionStatus::Signed => LifecycleState::Signed,
            SessionStatus::Expired => LifecycleState::Expired,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Pending => "pending",
            LifecycleState::SigningInProgress => "signing_in_progress",
            LifecycleState::Signed => "signed",
            LifecycleState::Expired => "expired",
        })
    }
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    /// Identifies the submission currently holding `SigningInProgress`
    attempt: u64,
}

#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new(LifecycleState::Pending)
    }
}

impl SessionLifecycle {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { state, attempt: 0 })),
        }
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.inner).state
    }

    /// Claim the session for one submission
    pub fn begin_submit(&self) -> Result<SubmitGuard, LifecycleError> {
        let mut inner = lock(&self.inner);
        match inner.state {
            LifecycleState::Pending => {
                inner.attempt += 1;
                inner.state = LifecycleState::SigningInProgress;
                debug!(attempt = inner.attempt, "submission started");
                Ok(SubmitGuard {
                    inner: Arc::clone(&self.inner),
                    attempt: inner.attempt,
                    settled: false,
                })
            }
            LifecycleState::SigningInProgress => Err(LifecycleError::AlreadyInProgress),
            state => Err(LifecycleError::AlreadyTerminal(state)),
        }
    }

    /// Move to `expired` unless already terminal. Returns whether it moved.
    pub fn expire(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = LifecycleState::Expired;
        true
    }

    /// Adopt a terminal status learned from persistent storage
    pub fn observe_terminal(&self, status: SessionStatus) {
        let state = LifecycleState::from(status);
        if !state.is_terminal() {
            return;
        }
        let mut inner = lock(&self.inner);
        if !inner.state.is_terminal() {
            inner.state = state;
        }
    }
}

/// Proof of a successful `begin_submit`
#[derive(Debug)]
pub struct SubmitGuard {
    inner: Arc<Mutex<Inner>>,
    attempt: u64,
    settled: bool,
}

impl SubmitGuard {
    /// Finish the submission as `signed`
    pub fn commit_signed(mut self) -> Result<(), LifecycleError> {
        self.settled = true;
        let mut inner = lock(&self.inner);
        if inner.state != LifecycleState::SigningInProgress || inner.attempt != self.attempt {
            return Err(LifecycleError::AlreadyTerminal(inner.state));
        }
        inner.state = LifecycleState::Signed;
        Ok(())
    }

    /// Give up and return the session to `pending`
    pub fn abandon(self) {
        drop(self);
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = lock(&self.inner);
        if inner.state == LifecycleState::SigningInProgress && inner.attempt == self.attempt {
            inner.state = LifecycleState::Pending;
            debug!(attempt = self.attempt, "submission reverted to pending");
        }
    }
}
