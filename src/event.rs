use chrono::{DateTime, Utc};
use std::fmt;

/// Outcome of an SSH authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Success,
    Failure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    PublicKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::PublicKey => "publickey",
        }
    }

    /// Exact sshd method names only.
    pub fn from_sshd(s: &str) -> Option<Self> {
        match s {
            "password" => Some(Self::Password),
            "publickey" => Some(Self::PublicKey),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single login attempt extracted from the auth log.
///
/// Only the parser constructs these; everything downstream borrows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub username: String,
    pub ip: String,
    /// Zero when sshd logged something that is not a valid port number.
    pub port: u16,
    pub method: AuthMethod,
    pub invalid_user: bool,
}

impl Event {
    pub fn is_success(&self) -> bool {
        self.kind == EventKind::Success
    }
}
