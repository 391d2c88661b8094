//! Per-view request state.
//!
//! A view moves `Idle -> Loading -> Ready | Error`. Each fetch carries a
//! [`FetchToken`] tied to the view; starting a new fetch, leaving the view or
//! dropping it cancels the token, and results arriving on a cancelled token
//! are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::debug;

use crate::error::VizError;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Idle,
    Loading,
    Ready(T),
    Error(String),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ViewState::Error(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchToken {
    live: Arc<AtomicBool>,
}

impl FetchToken {
    fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.live.store(false, Ordering::Release);
    }

    fn same(&self, other: &FetchToken) -> bool {
        Arc::ptr_eq(&self.live, &other.live)
    }
}

pub struct View<T> {
    name: &'static str,
    state: ViewState<T>,
    token: Option<FetchToken>,
}

impl<T> View<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: ViewState::Idle,
            token: None,
        }
    }

    pub fn state(&self) -> &ViewState<T> {
        &self.state
    }

    /// Enters `Loading` and returns the token for the new request. Any
    /// request still in flight for this view is cancelled.
    pub fn begin(&mut self) -> FetchToken {
        if let Some(previous) = self.token.take() {
            previous.cancel();
        }
        let token = FetchToken::new();
        self.token = Some(token.clone());
        self.state = ViewState::Loading;
        token
    }

    /// Applies a finished request. Returns `false` when the result belongs to
    /// a cancelled or superseded request and was dropped.
    pub fn complete(&mut self, token: &FetchToken, result: Result<T, VizError>) -> bool {
        let current = self
            .token
            .as_ref()
            .map(|live| live.same(token) && live.is_live())
            .unwrap_or(false);
        if !current {
            debug!(view = self.name, "dropping late response");
            return false;
        }
        self.token = None;
        self.state = match result {
            Ok(value) => ViewState::Ready(value),
            Err(err) => {
                debug!(view = self.name, error = %err, "fetch failed");
                ViewState::Error(err.user_message())
            }
        };
        true
    }

    /// Cancels the outstanding request, if any. State is left as-is.
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Drops everything and returns to `Idle`.
    pub fn reset(&mut self) {
        self.cancel();
        self.state = ViewState::Idle;
    }
}

impl<T> Drop for View<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `fetch` on a worker thread and hands the result back with its
/// token. The worker skips the call entirely if the token is already dead.
pub fn spawn_fetch<T, F>(token: FetchToken, fetch: F) -> Receiver<(FetchToken, Result<T, VizError>)>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, VizError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if !token.is_live() {
            return;
        }
        let result = fetch();
        let _ = tx.send((token, result));
    });
    rx
}
