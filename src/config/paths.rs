//! Platform-specific config directory helpers.
//!
//! Uses the `dirs` crate to resolve where the profile store lives:
//! - Linux:   `~/.config/sftpflow/`
//! - Windows: `%APPDATA%\sftpflow\`
//! - macOS:   `~/Library/Application Support/sftpflow/`

use std::path::{Path, PathBuf};

use crate::error::SftpFlowError;

/// Resolve the sftpflow config directory, creating it if needed.
///
/// An explicit override (the `--config-dir` flag) wins over the platform
/// default.
pub fn config_dir(override_dir: Option<&Path>) -> Result<PathBuf, SftpFlowError> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::config_dir()
            .ok_or_else(|| SftpFlowError::Config("Could not determine config directory".into()))?
            .join("sftpflow"),
    };
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}
