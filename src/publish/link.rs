//! Connection state shared between the update cycle and the event-loop task.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use rumqttc::ConnectReturnCode;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl From<u8> for ConnectionState {
    fn from(raw: u8) -> Self {
        match raw {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// The publisher's only mutable state. Written by the event-loop task's
/// lifecycle callbacks, read by `publish` on the cycle task.
#[derive(Debug, Default)]
pub(crate) struct Link {
    state: AtomicU8,
    closing: AtomicBool,
}

impl Link {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state.load(Ordering::Acquire).into()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Set once by a caller-initiated disconnect; suppresses reconnects.
    pub(crate) fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Handles the broker's CONNACK. Returns whether the session is usable.
    pub(crate) fn on_connect(&self, code: ConnectReturnCode) -> bool {
        if code == ConnectReturnCode::Success {
            self.set(ConnectionState::Connected);
            info!(code = ?code, "Connected to MQTT broker");
            true
        } else {
            self.set(ConnectionState::Disconnected);
            warn!(code = ?code, "MQTT broker refused connection");
            false
        }
    }

    /// Handles a lost session and moves to `Connecting`, since the event loop
    /// reconnects on its next poll. Returns the state before the loss so the
    /// caller can tell a fresh disconnect from a failed reconnect.
    pub(crate) fn on_disconnect(&self, reason: &str) -> ConnectionState {
        let previous: ConnectionState = self
            .state
            .swap(ConnectionState::Connecting as u8, Ordering::AcqRel)
            .into();
        if previous == ConnectionState::Connected {
            warn!(reason, "Disconnected from MQTT broker, reconnecting");
        }
        previous
    }
}
