//! Notifications delivered to the host application.
//!
//! Hosts either implement [Observer] directly or subscribe a [ChannelObserver]
//! and consume [Event]s from a channel. Callbacks run synchronously on the task
//! driving the pull, in the order the protocol produces them.
use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::error::Error;
use crate::pipeline::DataSet;
use crate::state::OperationState;

/// Receives progress of a consent access pull.
///
/// Only [Observer::on_result] is required. It is called exactly once per pull
/// that reached the caller, with either the decrypted files or the error that
/// ended the pull.
pub trait Observer: Send + Sync {
    fn on_log(&self, _message: &str) {}

    fn on_state_change(&self, _state: OperationState) {}

    /// Fraction of files downloaded and decrypted, in `[0, 1]`.
    fn on_progress(&self, _progress: f32) {}

    fn on_result(&self, result: &Result<DataSet, Error>);
}

/// Fan-out over the subscribed observers.
///
/// Clones share the same subscriber list, so observers subscribed after a
/// component was built still receive its notifications.
#[derive(Clone, Default)]
pub struct Observers(Arc<RwLock<Vec<Arc<dyn Observer>>>>);

impl Observers {
    pub fn push(&self, observer: Arc<dyn Observer>) {
        if let Ok(mut observers) = self.0.write() {
            observers.push(observer)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().map(|o| o.is_empty()).unwrap_or(true)
    }

    // Callbacks run outside the lock so an observer may subscribe others.
    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.0.read().map(|o| o.clone()).unwrap_or_default()
    }

    pub(crate) fn log(&self, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::info!("{message}");
        self.snapshot().iter().for_each(|o| o.on_log(&message));
    }

    pub(crate) fn state_changed(&self, state: OperationState) {
        self.snapshot()
            .iter()
            .for_each(|o| o.on_state_change(state));
    }

    pub(crate) fn progress(&self, progress: f32) {
        self.snapshot().iter().for_each(|o| o.on_progress(progress));
    }

    pub(crate) fn result(&self, result: &Result<DataSet, Error>) {
        if let Err(e) = result {
            tracing::warn!(code = e.code(), "pull failed: {e}");
        }
        self.snapshot().iter().for_each(|o| o.on_result(result));
    }
}

/// A single notification, as forwarded by [ChannelObserver].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Log(String),
    StateChanged(OperationState),
    Progress(f32),
    Result(Result<DataSet, Error>),
}

/// Forwards every callback into an unbounded channel.
///
/// Sends never block; events are dropped silently once the receiver is gone.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Observer for ChannelObserver {
    fn on_log(&self, message: &str) {
        self.send(Event::Log(message.to_string()))
    }

    fn on_state_change(&self, state: OperationState) {
        self.send(Event::StateChanged(state))
    }

    fn on_progress(&self, progress: f32) {
        self.send(Event::Progress(progress))
    }

    fn on_result(&self, result: &Result<DataSet, Error>) {
        self.send(Event::Result(result.clone()))
    }
}
