//! Page configuration and property-parsing errors.

use std::time::Duration;

use thiserror::Error;

use crate::wiring::WiringError;

/// Service path used when neither the page nor the component overrides it.
pub const DEFAULT_SERVICE: &str = "/runsql";

/// Delay before a component without a dynamic data source announces its
/// first value, giving late-attaching dependents time to subscribe.
pub const DEFAULT_INITIAL_TRIGGER_DELAY: Duration = Duration::from_millis(300);

/// Page-wide settings shared by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    service: String,
    initial_trigger_delay: Duration,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            initial_trigger_delay: DEFAULT_INITIAL_TRIGGER_DELAY,
        }
    }
}

impl PageConfig {
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    #[must_use]
    pub fn with_initial_trigger_delay(mut self, delay: Duration) -> Self {
        self.initial_trigger_delay = delay;
        self
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn initial_trigger_delay(&self) -> Duration {
        self.initial_trigger_delay
    }
}

/// A configuration property that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown property `{name}` for {kind}")]
    UnknownProperty { kind: &'static str, name: String },

    #[error("invalid value for `{name}`: {message}")]
    InvalidValue { name: String, message: String },

    #[error(transparent)]
    Wiring(#[from] WiringError),
}

impl ConfigError {
    #[must_use]
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownProperty {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A `silent` property silences the component when it is non-empty.
#[must_use]
pub fn flag_set(value: &str) -> bool {
    !value.is_empty()
}

/// Reject empty values for properties that name something.
pub fn required(name: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(name, "value must not be empty"));
    }
    Ok(trimmed.to_string())
}
