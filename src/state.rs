//! Protocol state tracking.
//!
//! A pull moves forward through a fixed sequence of [OperationState]s:
//!
//! ```text
//! Undefined -> FrameworkInit -> RequestingSessionKey -> SessionKeyReceived
//!   -> PermissionRequestSent -> PermissionGranted -> DataRequestSent
//!   -> DataRequestReceived -> DataReceivedAllDone
//!                            \-> PermissionCancelled
//! ```
//!
//! The [StateMachine] only accepts the next step of that sequence. Failures and
//! cancellations end the pull; [StateMachine::reset] makes it ready for a retry.
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::Error;
use crate::observer::Observers;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[repr(u8)]
pub enum OperationState {
    #[default]
    #[strum(serialize = "undefined")]
    Undefined = 0,
    #[strum(serialize = "framework init")]
    FrameworkInit,
    #[strum(serialize = "requesting session key")]
    RequestingSessionKey,
    #[strum(serialize = "session key received")]
    SessionKeyReceived,
    #[strum(serialize = "permission request sent")]
    PermissionRequestSent,
    #[strum(serialize = "permission granted")]
    PermissionGranted,
    #[strum(serialize = "permission cancelled")]
    PermissionCancelled,
    #[strum(serialize = "data request sent")]
    DataRequestSent,
    #[strum(serialize = "data request received")]
    DataRequestReceived,
    #[strum(serialize = "data received all done")]
    DataReceivedAllDone,
}

impl OperationState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Undefined, FrameworkInit)
                | (FrameworkInit, RequestingSessionKey)
                | (RequestingSessionKey, SessionKeyReceived)
                | (SessionKeyReceived, PermissionRequestSent)
                | (PermissionRequestSent, PermissionGranted)
                | (PermissionRequestSent, PermissionCancelled)
                | (PermissionGranted, DataRequestSent)
                | (DataRequestSent, DataRequestReceived)
                | (DataRequestReceived, DataReceivedAllDone)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::DataReceivedAllDone | OperationState::PermissionCancelled
        )
    }

    /// Integer value of the state as reported by the digi.me mobile SDKs.
    pub fn as_code(self) -> u8 {
        self as u8
    }
}

/// Tracks the current [OperationState] and notifies observers on every change.
pub struct StateMachine {
    current: OperationState,
    observers: Observers,
}

impl StateMachine {
    pub fn new(observers: Observers) -> Self {
        Self {
            current: OperationState::Undefined,
            observers,
        }
    }

    pub fn current(&self) -> OperationState {
        self.current
    }

    /// Move to `to` if it directly follows the current state.
    ///
    /// Observers are notified before this returns. On an illegal transition the
    /// machine keeps its prior state.
    pub fn transition(&mut self, to: OperationState) -> Result<(), Error> {
        if !self.current.can_transition_to(to) {
            tracing::warn!(from = %self.current, to = %to, "rejected state transition");
            return Err(Error::InvalidStateTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        self.observers.state_changed(to);
        Ok(())
    }

    /// Return to [OperationState::Undefined] so a new pull can start.
    pub fn reset(&mut self) {
        if self.current != OperationState::Undefined {
            self.current = OperationState::Undefined;
            self.observers.state_changed(OperationState::Undefined);
        }
    }
}
