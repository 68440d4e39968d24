// src/core/errors.rs

//! Defines the error types shared across the crate.

use std::io;
use thiserror::Error;

/// The main error enum, covering every way obtaining a shared session can fail.
#[derive(Error, Debug)]
pub enum ClusterLinkError {
    #[error("Invalid connection URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value '{value}' for property '{property}'")]
    InvalidProperty { property: String, value: String },

    /// Session construction failed. Never transient: retrying with the same
    /// configuration is expected to fail the same way.
    #[error("Non-transient connection failure: {0}")]
    NonTransientConnection(#[from] ConnectionFailure),
}

impl ClusterLinkError {
    /// Returns true if this error was raised while building or connecting the session,
    /// as opposed to while resolving its configuration.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ClusterLinkError::NonTransientConnection(_))
    }
}

/// The root cause wrapped by `ClusterLinkError::NonTransientConnection`.
#[derive(Error, Debug)]
pub enum ConnectionFailure {
    /// A setting was malformed and debug mode asked for it to be fatal.
    #[error(transparent)]
    Setting(#[from] SettingParseError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A setting (policy name, timeout) could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot parse {setting} '{input}': {reason}")]
pub struct SettingParseError {
    pub setting: &'static str,
    pub input: String,
    pub reason: String,
}

impl SettingParseError {
    pub fn new(setting: &'static str, input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            setting,
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by a cluster driver while building or connecting.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("No host available: {0}")]
    NoHostAvailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid cluster configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cluster was closed")]
    Closed,
}

/// Failures raised by the value-coercion adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    #[error("No coercion registered from {wire} to {app}")]
    Unsupported { wire: String, app: String },

    #[error("Value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("Value is not a finite number")]
    NotFinite,

    #[error("Invalid decimal literal '{0}'")]
    InvalidDecimal(String),
}
