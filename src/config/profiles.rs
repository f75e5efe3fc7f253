//! Server profile store.
//!
//! Persists named server profiles in `profiles.toml` within the sftpflow
//! config directory, and builds the in-memory `ProfileRegistry` handed to the
//! operation executor.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::{Host, Url};
use zeroize::Zeroizing;

use crate::error::SftpFlowError;

/// Secret material that is wiped from memory on drop.
pub type Secret = Zeroizing<String>;

/// Port used when neither the request nor the profile names one.
pub const DEFAULT_PORT: u16 = 22;

/// Connection parameters for one remote endpoint.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerProfile {
    /// Display label only; profiles are addressed by their store id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Secret>,
    /// Only meaningful alongside `private_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub try_keyboard: Option<bool>,
}

impl ServerProfile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Keyboard-interactive auth is on unless explicitly disabled.
    pub fn try_keyboard(&self) -> bool {
        self.try_keyboard != Some(false)
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("try_keyboard", &self.try_keyboard)
            .finish()
    }
}

/// Lookup table from profile id to profile, owned by the caller and injected
/// into the executor.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, ServerProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, profile: ServerProfile) {
        self.profiles.insert(id.into(), profile);
    }

    pub fn get(&self, id: &str) -> Option<&ServerProfile> {
        self.profiles.get(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Serialized profile file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ServerProfile>,
}

/// Profile store backed by a TOML file.
///
/// Holds an exclusive lock on `profiles.lock` from `load` until the store is
/// dropped, so a read-modify-write cycle cannot interleave with another
/// process doing the same.
pub struct ProfileStore {
    path: PathBuf,
    data: ProfileFile,
    /// Dropping this releases the lock.
    _lock_file: File,
}

impl ProfileStore {
    /// Lock and load profiles from `profiles.toml` in the given config
    /// directory. Blocks while another store holds the lock.
    ///
    /// Returns an empty store if the file does not exist.
    pub fn load(config_dir: &Path) -> Result<Self, SftpFlowError> {
        let lock_file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(config_dir.join("profiles.lock"))?;
        lock_file.lock_exclusive()?;

        let path = config_dir.join("profiles.toml");
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents)
                .map_err(|e| SftpFlowError::Config(format!("Invalid profiles.toml: {}", e)))?
        } else {
            ProfileFile::default()
        };
        tracing::debug!(
            path = %path.display(),
            count = data.profiles.len(),
            "Loaded server profiles"
        );
        Ok(Self {
            path,
            data,
            _lock_file: lock_file,
        })
    }

    /// Save profiles atomically: write an owner-only tmp file, then rename.
    pub fn save(&self) -> Result<(), SftpFlowError> {
        let contents = toml::to_string_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("toml.tmp");

        let mut options = File::options();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut tmp = options.open(&tmp_path)?;
        // mode() only applies on creation; a leftover tmp file keeps its own
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(contents.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Add or replace a profile.
    pub fn add(&mut self, id: String, profile: ServerProfile) {
        self.data.profiles.insert(id, profile);
    }

    /// Remove a profile by id. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.data.profiles.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&ServerProfile> {
        self.data.profiles.get(id)
    }

    pub fn list(&self) -> &BTreeMap<String, ServerProfile> {
        &self.data.profiles
    }

    /// Snapshot the stored profiles into a registry for the executor.
    pub fn registry(&self) -> ProfileRegistry {
        let mut registry = ProfileRegistry::new();
        for (id, profile) in &self.data.profiles {
            registry.insert(id.clone(), profile.clone());
        }
        registry
    }
}

/// Validate that a profile id is acceptable.
pub fn validate_profile_id(id: &str) -> Result<(), SftpFlowError> {
    if id.is_empty() {
        return Err(SftpFlowError::ProfileError(
            "Profile id must not be empty".into(),
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(SftpFlowError::ProfileError(format!(
            "'{}' contains characters other than letters, digits, '-', '_' and '.'",
            id
        )));
    }

    Ok(())
}

/// Connection target parsed from `sftp://[user@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub username: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

/// Parse a profile target. The scheme may be omitted (`user@host:2222`).
pub fn parse_target(input: &str) -> Result<Target, SftpFlowError> {
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("sftp://{}", input)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| SftpFlowError::ProfileError(format!("Invalid target '{}': {}", input, e)))?;

    if !matches!(url.scheme(), "sftp" | "ssh") {
        return Err(SftpFlowError::ProfileError(format!(
            "Unsupported scheme '{}' (expected sftp:// or ssh://)",
            url.scheme()
        )));
    }

    // Host::to_string would keep the brackets around IPv6 addresses
    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => {
            return Err(SftpFlowError::ProfileError(format!(
                "Target '{}' has no host",
                input
            )))
        }
    };

    let username = if url.username().is_empty() {
        None
    } else {
        let decoded = percent_decode_str(url.username())
            .decode_utf8()
            .map_err(|e| {
                SftpFlowError::ProfileError(format!("Invalid username in '{}': {}", input, e))
            })?;
        Some(decoded.into_owned())
    };

    Ok(Target {
        username,
        host,
        port: url.port(),
    })
}
