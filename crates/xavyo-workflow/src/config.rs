//! Workflow configuration loaded from the environment.

use std::collections::BTreeSet;

use crate::error::WorkflowError;

/// Process definition started when no override is configured.
pub const DEFAULT_PROCESS_NAME: &str = "ItemApproval";

/// Which approval wrappers are active and which process definitions they start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Approve role, org and service assignment additions.
    pub add_role_enabled: bool,

    /// Approve creation of new users. Off by default.
    pub create_user_enabled: bool,

    /// User attribute paths whose modification needs approval.
    /// Empty disables attribute-change approval.
    pub watched_attributes: Vec<String>,

    /// Process definition for role assignment approval.
    pub role_approval_process: String,

    /// Process definition for attribute modification approval.
    pub attribute_approval_process: String,

    /// Process definition for user creation approval.
    pub user_approval_process: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            add_role_enabled: true,
            create_user_enabled: false,
            watched_attributes: Vec::new(),
            role_approval_process: DEFAULT_PROCESS_NAME.to_string(),
            attribute_approval_process: DEFAULT_PROCESS_NAME.to_string(),
            user_approval_process: DEFAULT_PROCESS_NAME.to_string(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let add_role_enabled = parse_bool(&reader, "WF_ADD_ROLE_ENABLED", true)?;
        let create_user_enabled = parse_bool(&reader, "WF_CREATE_USER_ENABLED", false)?;

        // Comma separated; blanks and duplicates dropped, first occurrence wins.
        let mut seen = BTreeSet::new();
        let watched_attributes = reader("WF_WATCHED_ATTRIBUTES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty() && seen.insert(path.to_string()))
            .map(str::to_string)
            .collect();

        Ok(Self {
            add_role_enabled,
            create_user_enabled,
            watched_attributes,
            role_approval_process: process_name(&reader, "WF_ROLE_APPROVAL_PROCESS")?,
            attribute_approval_process: process_name(&reader, "WF_ATTRIBUTE_APPROVAL_PROCESS")?,
            user_approval_process: process_name(&reader, "WF_USER_APPROVAL_PROCESS")?,
        })
    }

    /// Whether attribute-change approval is active.
    #[must_use]
    pub fn attribute_approval_enabled(&self) -> bool {
        !self.watched_attributes.is_empty()
    }
}

fn parse_bool<F>(reader: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                key.into(),
                format!("expected a boolean, got '{raw}'"),
            )),
        },
        Err(_) => Ok(default),
    }
}

fn process_name<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(raw) if raw.trim().is_empty() => Err(ConfigError::InvalidValue(
            key.into(),
            "process name must not be blank".into(),
        )),
        Ok(raw) => Ok(raw.trim().to_string()),
        Err(_) => Ok(DEFAULT_PROCESS_NAME.to_string()),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl From<ConfigError> for WorkflowError {
    fn from(err: ConfigError) -> Self {
        let ConfigError::InvalidValue(var, reason) = err;
        WorkflowError::Config { var, reason }
    }
}
