//! Error mapping guide:
//! - Map io::ErrorKind::NotFound to exit code 127; all others to 1.
//! - Expected-empty conditions are never errors; they are empty results.
//! - GearError::Config marks structurally broken input (fatal for the affected unit).
use std::fmt;
use std::io;

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Error type shared by the import, build, processing and publishing stages.
#[derive(Debug)]
pub enum GearError {
    Io(io::Error),
    /// Broken configuration or input layout (missing NIfTI, bad extension, label exhaustion).
    Config(String),
    /// Upstream platform request failed or returned something unusable.
    Platform(String),
    /// An external tool (converter, registration, inference) could not be run.
    Tool(String),
    Message(String),
}

impl GearError {
    pub fn config(msg: impl Into<String>) -> Self {
        GearError::Config(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        GearError::Platform(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        GearError::Tool(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, GearError::Config(_))
    }
}

impl From<io::Error> for GearError {
    fn from(e: io::Error) -> Self {
        GearError::Io(e)
    }
}

impl From<serde_json::Error> for GearError {
    fn from(e: serde_json::Error) -> Self {
        GearError::Config(format!("invalid JSON: {e}"))
    }
}

impl From<reqwest::Error> for GearError {
    fn from(e: reqwest::Error) -> Self {
        GearError::Platform(e.to_string())
    }
}

impl From<anyhow::Error> for GearError {
    fn from(e: anyhow::Error) -> Self {
        GearError::Tool(format!("{e:#}"))
    }
}

impl fmt::Display for GearError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_for_gear_error(self))
    }
}

impl std::error::Error for GearError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GearError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert GearError to exit code (parity with io::Error mapping).
pub fn exit_code_for_gear_error(e: &GearError) -> u8 {
    match e {
        GearError::Io(ioe) => exit_code_for_io_error(ioe),
        GearError::Config(_) => 2,
        GearError::Platform(_) | GearError::Tool(_) | GearError::Message(_) => 1,
    }
}

/// Render a user-facing string for GearError.
pub fn display_for_gear_error(e: &GearError) -> String {
    match e {
        GearError::Io(ioe) => ioe.to_string(),
        GearError::Config(s) => format!("configuration error: {s}"),
        GearError::Platform(s) => format!("platform error: {s}"),
        GearError::Tool(s) => format!("tool error: {s}"),
        GearError::Message(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let nf = GearError::Io(io::Error::new(io::ErrorKind::NotFound, "x"));
        assert_eq!(exit_code_for_gear_error(&nf), 127);
        assert_eq!(exit_code_for_gear_error(&GearError::config("bad")), 2);
        assert_eq!(exit_code_for_gear_error(&GearError::tool("boom")), 1);
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            GearError::config("no NIfTI").to_string(),
            "configuration error: no NIfTI"
        );
        assert_eq!(GearError::Message("plain".into()).to_string(), "plain");
    }
}
