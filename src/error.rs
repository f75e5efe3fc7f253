use thiserror::Error;

#[derive(Error, Debug)]
pub enum SftpFlowError {
    #[error("No SFTP server configured")]
    ProfileNotConfigured,

    #[error("Server profile not found: {id}")]
    ProfileNotFound { id: String },

    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("{0}")]
    Usage(String),

    #[error("Connection failed to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("{operation} failed for {path}: {reason}")]
    Remote {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile error: {0}")]
    ProfileError(String),
}

impl SftpFlowError {
    /// Returns a user-friendly suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            SftpFlowError::ProfileNotConfigured => {
                Some("Pass --profile <id>, or set \"server\" on the request.")
            }
            SftpFlowError::ProfileNotFound { .. } => {
                Some("List saved profiles with `sftpflow profile`.")
            }
            SftpFlowError::UnknownOperation { .. } => Some(
                "Valid operations: list, get, put, delete, mkdir, rmdir, rename, exists, stat",
            ),
            SftpFlowError::ConnectionFailed { .. } => {
                Some("Check that the host is reachable, the port is correct and the credentials are accepted.")
            }
            SftpFlowError::Remote { .. } => {
                Some("Check the remote path exists and the account has permission to access it.")
            }
            SftpFlowError::ProfileError(_) => {
                Some("Profile ids may contain letters, digits, '-', '_' and '.'.")
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SftpFlowError {
    fn from(err: serde_json::Error) -> Self {
        SftpFlowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SftpFlowError {
    fn from(err: toml::ser::Error) -> Self {
        SftpFlowError::Config(format!("TOML serialization error: {}", err))
    }
}
