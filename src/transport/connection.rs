use std::fmt;

/// Coarse phase of the gaze transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Observable state of the gaze transport.
///
/// `is_connected` and `is_connecting` are never both true; the transition
/// methods are the only writers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn phase(&self) -> ConnectionPhase {
        if self.is_connected {
            ConnectionPhase::Connected
        } else if self.is_connecting {
            ConnectionPhase::Connecting
        } else {
            ConnectionPhase::Disconnected
        }
    }

    /// Enter `Connecting`. Returns false if already connecting or connected.
    pub fn begin_connect(&mut self) -> bool {
        if self.phase() != ConnectionPhase::Disconnected {
            return false;
        }
        self.is_connecting = true;
        self.last_error = None;
        true
    }

    /// Socket opened
    pub fn opened(&mut self) {
        self.is_connected = true;
        self.is_connecting = false;
        self.last_error = None;
    }

    /// Connection attempt failed
    pub fn failed<S: Into<String>>(&mut self, error: S) {
        self.is_connected = false;
        self.is_connecting = false;
        self.last_error = Some(error.into());
    }

    /// Socket closed, with a reason if the close was not requested locally.
    /// Returns whether anything changed.
    pub fn closed(&mut self, reason: Option<String>) -> bool {
        let was_active = self.phase() != ConnectionPhase::Disconnected;
        self.is_connected = false;
        self.is_connecting = false;
        if reason.is_some() {
            self.last_error = reason;
        }
        was_active
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase() {
            ConnectionPhase::Connected => write!(f, "connected"),
            ConnectionPhase::Connecting => write!(f, "connecting"),
            ConnectionPhase::Disconnected => write!(f, "disconnected"),
        }
    }
}
