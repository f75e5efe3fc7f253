//! Connection descriptor construction.
//!
//! Merges a `ServerProfile` with per-request overrides into the fully
//! resolved parameter set handed to the transport, and decides whether a
//! keyboard-interactive responder is registered.

use std::fmt;
use std::time::Duration;

use crate::config::profiles::{Secret, ServerProfile, DEFAULT_PORT};

/// Time allowed for TCP connect, handshake and authentication.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request connection overrides. Empty strings and port 0 count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
}

/// Answers keyboard-interactive prompts with the configured password.
///
/// Prompt text is never inspected: every prompt gets the same answer, or an
/// empty answer when no password is configured.
#[derive(Clone, Default)]
pub struct KeyboardResponder {
    password: Option<Secret>,
}

impl KeyboardResponder {
    pub fn new(password: Option<Secret>) -> Self {
        Self { password }
    }

    /// Produce exactly one answer per prompt.
    pub fn respond<S: AsRef<str>>(&self, prompts: &[S]) -> Vec<String> {
        let answer = self.password.as_deref().cloned().unwrap_or_default();
        prompts.iter().map(|_| answer.clone()).collect()
    }
}

impl fmt::Debug for KeyboardResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardResponder")
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

/// Fully resolved parameters for one connection.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub private_key: Option<Secret>,
    pub passphrase: Option<Secret>,
    pub try_keyboard: bool,
    pub ready_timeout: Duration,
    pub keyboard: Option<KeyboardResponder>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("try_keyboard", &self.try_keyboard)
            .field("ready_timeout", &self.ready_timeout)
            .finish()
    }
}

/// Build the descriptor for one request.
///
/// Field resolution is request override, then profile value, then default.
/// Never fails: a descriptor without credentials is still produced and the
/// server decides whether to accept it.
pub fn build_descriptor(
    profile: &ServerProfile,
    overrides: &ConnectionOverrides,
) -> ConnectionDescriptor {
    let host = non_empty(overrides.host.as_deref())
        .unwrap_or(profile.host.as_str())
        .to_string();
    let port = overrides
        .port
        .filter(|p| *p != 0)
        .or(profile.port.filter(|p| *p != 0))
        .unwrap_or(DEFAULT_PORT);
    let username = non_empty(overrides.username.as_deref())
        .or(non_empty(profile.username.as_deref()))
        .map(str::to_string);

    let password = profile.password.clone().filter(|p| !p.is_empty());
    let private_key = profile.private_key.clone().filter(|k| !k.is_empty());
    let passphrase = match private_key {
        Some(_) => profile.passphrase.clone().filter(|p| !p.is_empty()),
        None => None,
    };

    let try_keyboard = profile.try_keyboard();
    let keyboard = try_keyboard.then(|| KeyboardResponder::new(password.clone()));

    ConnectionDescriptor {
        host,
        port,
        username,
        password,
        private_key,
        passphrase,
        try_keyboard,
        ready_timeout: READY_TIMEOUT,
        keyboard,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
