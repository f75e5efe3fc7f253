//! SFTP transport using the ssh2 crate (libssh2 bindings).
//!
//! Provides `SshTransport`, the production `SftpTransport`. Each instance
//! owns at most one SSH session with its SFTP channel; the executor creates a
//! fresh instance per request and closes it when the request ends.
//!
//! Authentication tries, in order and only when the server advertises the
//! method: private key from memory, password, keyboard-interactive.

use std::borrow::Cow;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ssh2::{
    CheckResult, ErrorCode, FileStat, HashType, KeyboardInteractivePrompt, KnownHostFileKind,
    Prompt, Session, Sftp,
};

use crate::connection::{ConnectionDescriptor, KeyboardResponder};
use crate::error::SftpFlowError;
use crate::transport::{
    EntryKind, PutSource, RemoteEntry, RemoteStat, Rights, SftpTransport, TransportFactory,
};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const FX_NO_SUCH_FILE: i32 = 2;
/// libssh2's `LIBSSH2_FX_NO_SUCH_PATH`.
const FX_NO_SUCH_PATH: i32 = 10;

/// Session and SFTP channel of an established connection.
///
/// Kept together because `Sftp` must not outlive the `Session` it was
/// opened on.
struct Connected {
    session: Session,
    sftp: Sftp,
}

/// `SftpTransport` backed by libssh2.
#[derive(Default)]
pub struct SshTransport {
    inner: Option<Connected>,
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn sftp(&self) -> Result<&Sftp, SftpFlowError> {
        self.inner
            .as_ref()
            .map(|c| &c.sftp)
            .ok_or(SftpFlowError::NotConnected)
    }
}

/// Factory handing the executor one fresh `SshTransport` per request.
pub fn factory() -> impl TransportFactory {
    || -> Box<dyn SftpTransport> { Box::new(SshTransport::new()) }
}

impl SftpTransport for SshTransport {
    fn connect(&mut self, descriptor: &ConnectionDescriptor) -> Result<(), SftpFlowError> {
        let host = descriptor.host.as_str();
        let port = descriptor.port;
        let fail = |reason: String| SftpFlowError::ConnectionFailed {
            host: host.to_string(),
            port,
            reason,
        };

        let tcp = connect_tcp(descriptor).map_err(&fail)?;

        let mut session =
            Session::new().map_err(|e| fail(format!("Failed to create SSH session: {}", e)))?;
        let timeout_ms = u32::try_from(descriptor.ready_timeout.as_millis()).unwrap_or(u32::MAX);
        session.set_timeout(timeout_ms);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| fail(format!("SSH handshake failed: {}", e)))?;

        verify_host_key(&session, host, port).map_err(&fail)?;

        let user = match &descriptor.username {
            Some(user) => user.clone(),
            None => current_username().map_err(&fail)?,
        };

        authenticate(&session, &user, descriptor)
            .map_err(|e| fail(format!("Authentication failed for user '{}': {}", user, e)))?;

        let sftp = session
            .sftp()
            .map_err(|e| fail(format!("Failed to open SFTP channel: {}", e)))?;

        // The ready timeout only covers connection setup.
        session.set_timeout(0);

        tracing::debug!(host, port, user = %user, "SFTP session established");
        self.inner = Some(Connected { session, sftp });
        Ok(())
    }

    fn close(&mut self) -> Result<(), SftpFlowError> {
        let Some(connected) = self.inner.take() else {
            return Ok(());
        };
        let Connected { session, sftp } = connected;
        drop(sftp);
        session
            .disconnect(None, "sftpflow closing", None)
            .map_err(|e| SftpFlowError::Io { source: e.into() })
    }

    fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SftpFlowError> {
        let entries = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(remote_err("list", path))?;

        let mut result = Vec::with_capacity(entries.len());
        for (entry_path, stat) in entries {
            let name = match entry_path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            if name == "." || name == ".." {
                continue;
            }
            let mode = stat.perm.unwrap_or(0);
            result.push(RemoteEntry {
                kind: EntryKind::from_mode(mode),
                name,
                size: stat.size.unwrap_or(0),
                modify_time: millis(stat.mtime),
                access_time: millis(stat.atime),
                rights: Rights::from_mode(mode),
                owner: stat.uid.unwrap_or(0),
                group: stat.gid.unwrap_or(0),
            });
        }
        Ok(result)
    }

    fn get(&mut self, path: &str) -> Result<Vec<u8>, SftpFlowError> {
        let mut file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(remote_err("get", path))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn get_to_file(&mut self, path: &str, dest: &Path) -> Result<(), SftpFlowError> {
        let mut remote = self
            .sftp()?
            .open(Path::new(path))
            .map_err(remote_err("get", path))?;
        let mut local = std::fs::File::create(dest)?;
        let bytes = std::io::copy(&mut remote, &mut local)?;
        tracing::debug!(remote = path, local = %dest.display(), bytes, "Downloaded file");
        Ok(())
    }

    fn put(&mut self, source: PutSource<'_>, path: &str) -> Result<(), SftpFlowError> {
        let sftp = self.sftp()?;
        let bytes = match source {
            PutSource::Bytes(data) => {
                let mut remote = sftp.create(Path::new(path)).map_err(remote_err("put", path))?;
                std::io::Write::write_all(&mut remote, data)?;
                data.len() as u64
            }
            PutSource::File(local_path) => {
                let mut local = std::fs::File::open(local_path)?;
                let mut remote = sftp.create(Path::new(path)).map_err(remote_err("put", path))?;
                std::io::copy(&mut local, &mut remote)?
            }
        };
        tracing::debug!(remote = path, bytes, "Uploaded file");
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), SftpFlowError> {
        self.sftp()?
            .unlink(Path::new(path))
            .map_err(remote_err("delete", path))
    }

    fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError> {
        let sftp = self.sftp()?;
        if !recursive {
            return sftp
                .mkdir(Path::new(path), 0o755)
                .map_err(remote_err("mkdir", path));
        }

        // SFTP mkdir only creates one level at a time.
        for current in path_components(Path::new(path)) {
            if current.as_os_str() == "/" {
                continue;
            }
            if let Err(e) = sftp.mkdir(&current, 0o755) {
                // Servers disagree on the status code for "already exists";
                // an existing directory is fine either way.
                match sftp.stat(&current) {
                    Ok(stat) if stat.is_dir() => continue,
                    _ => return Err(remote_err("mkdir", path)(e)),
                }
            }
        }
        Ok(())
    }

    fn rmdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError> {
        let sftp = self.sftp()?;
        let result = if recursive {
            remove_tree(sftp, Path::new(path))
        } else {
            sftp.rmdir(Path::new(path))
        };
        result.map_err(remote_err("rmdir", path))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpFlowError> {
        self.sftp()?
            .rename(Path::new(from), Path::new(to), None)
            .map_err(remote_err("rename", from))
    }

    fn exists(&mut self, path: &str) -> Result<Option<EntryKind>, SftpFlowError> {
        match self.sftp()?.lstat(Path::new(path)) {
            Ok(stat) => Ok(Some(EntryKind::from_mode(stat.perm.unwrap_or(0)).probe_kind())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(remote_err("exists", path)(e)),
        }
    }

    fn stat(&mut self, path: &str) -> Result<RemoteStat, SftpFlowError> {
        let stat = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(remote_err("stat", path))?;
        Ok(remote_stat(&stat))
    }
}

/// Adapts the responder to libssh2's prompt callback.
struct PromptAnswers<'a>(&'a KeyboardResponder);

impl KeyboardInteractivePrompt for PromptAnswers<'_> {
    fn prompt<'b>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'b>],
    ) -> Vec<String> {
        let texts: Vec<&Cow<'b, str>> = prompts.iter().map(|p| &p.text).collect();
        self.0.respond(&texts)
    }
}

/// Open a TCP connection, trying each resolved address within the ready
/// timeout.
fn connect_tcp(descriptor: &ConnectionDescriptor) -> Result<TcpStream, String> {
    let addrs = (descriptor.host.as_str(), descriptor.port)
        .to_socket_addrs()
        .map_err(|e| format!("Could not resolve '{}': {}", descriptor.host, e))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, descriptor.ready_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "TCP connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(match last_err {
        Some(e) => format!("TCP connection failed: {}", e),
        None => format!("No addresses found for '{}'", descriptor.host),
    })
}

/// Check the server's host key against `~/.ssh/known_hosts`.
///
/// - `Match`    proceeds.
/// - `Mismatch` refuses the connection.
/// - `NotFound` and `Failure` log a warning and proceed; there is nobody to
///   answer a trust prompt in unattended runs.
fn verify_host_key(session: &Session, host: &str, port: u16) -> Result<(), String> {
    let (key_bytes, _key_type) = session
        .host_key()
        .ok_or_else(|| "Server did not provide a host key during handshake.".to_string())?;

    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| format!("Failed to initialise known-hosts store: {}", e))?;

    let Some(known_hosts_path) = dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
    else {
        tracing::warn!(host, "No home directory; skipping host key verification");
        return Ok(());
    };

    let file_loaded = known_hosts
        .read_file(&known_hosts_path, KnownHostFileKind::OpenSSH)
        .is_ok();

    match known_hosts.check_port(host, port, key_bytes) {
        CheckResult::Match => {
            tracing::debug!(host, port, "Host key verified");
            Ok(())
        }
        CheckResult::Mismatch => Err(format!(
            "Host key mismatch for '{}' (server presented {}). Refusing connection; \
             if the key legitimately changed, remove the old entry from {}.",
            host,
            fingerprint(session),
            known_hosts_path.display()
        )),
        CheckResult::NotFound => {
            tracing::warn!(
                host,
                port,
                fingerprint = %fingerprint(session),
                "Host key not in known_hosts; proceeding unverified"
            );
            Ok(())
        }
        CheckResult::Failure => {
            tracing::warn!(
                host,
                known_hosts_loaded = file_loaded,
                "Host key check could not be completed; proceeding unverified"
            );
            Ok(())
        }
    }
}

/// Format the server's host key hash the way OpenSSH prints it.
fn fingerprint(session: &Session) -> String {
    if let Some(hash) = session.host_key_hash(HashType::Sha256) {
        format!("SHA256:{}", STANDARD_NO_PAD.encode(hash))
    } else if let Some(hash) = session.host_key_hash(HashType::Md5) {
        let hex: Vec<String> = hash.iter().map(|b| format!("{:02x}", b)).collect();
        format!("MD5:{}", hex.join(":"))
    } else {
        "(fingerprint unavailable)".to_string()
    }
}

/// Authenticate with whatever the descriptor carries and the server accepts.
fn authenticate(
    session: &Session,
    user: &str,
    descriptor: &ConnectionDescriptor,
) -> Result<(), String> {
    let methods = match session.auth_methods(user) {
        Ok(methods) => methods.to_string(),
        // "none" auth was accepted.
        Err(_) if session.authenticated() => return Ok(()),
        Err(e) => return Err(format!("Could not query authentication methods: {}", e)),
    };
    let mut tried = Vec::new();

    if let Some(key) = &descriptor.private_key {
        if methods.contains("publickey") {
            tried.push("publickey");
            let passphrase = descriptor.passphrase.as_deref().map(String::as_str);
            match session.userauth_pubkey_memory(user, None, key, passphrase) {
                Ok(()) if session.authenticated() => {
                    tracing::debug!(user, "Authenticated via private key");
                    return Ok(());
                }
                Ok(()) => {}
                Err(e) => tracing::debug!(user, error = %e, "Private key rejected"),
            }
        }
    }

    if let Some(password) = &descriptor.password {
        if methods.contains("password") {
            tried.push("password");
            match session.userauth_password(user, password) {
                Ok(()) if session.authenticated() => {
                    tracing::debug!(user, "Authenticated via password");
                    return Ok(());
                }
                Ok(()) => {}
                Err(e) => tracing::debug!(user, error = %e, "Password rejected"),
            }
        }
    }

    if let Some(responder) = &descriptor.keyboard {
        if methods.contains("keyboard-interactive") {
            tried.push("keyboard-interactive");
            let mut answers = PromptAnswers(responder);
            match session.userauth_keyboard_interactive(user, &mut answers) {
                Ok(()) if session.authenticated() => {
                    tracing::debug!(user, "Authenticated via keyboard-interactive");
                    return Ok(());
                }
                Ok(()) => {}
                Err(e) => tracing::debug!(user, error = %e, "Keyboard-interactive rejected"),
            }
        }
    }

    if tried.is_empty() {
        Err(format!(
            "no configured credential matches the server's methods ({})",
            methods
        ))
    } else {
        Err(format!("tried {}", tried.join(", ")))
    }
}

/// Remove a directory and everything below it, depth first.
fn remove_tree(sftp: &Sftp, dir: &Path) -> Result<(), ssh2::Error> {
    for (entry_path, stat) in sftp.readdir(dir)? {
        let skip = entry_path
            .file_name()
            .map_or(true, |n| n == "." || n == "..");
        if skip {
            continue;
        }
        match EntryKind::from_mode(stat.perm.unwrap_or(0)) {
            EntryKind::Directory => remove_tree(sftp, &entry_path)?,
            _ => sftp.unlink(&entry_path)?,
        }
    }
    sftp.rmdir(dir)
}

fn remote_stat(stat: &FileStat) -> RemoteStat {
    let mode = stat.perm.unwrap_or(0);
    let kind = EntryKind::from_mode(mode);
    RemoteStat {
        mode,
        uid: stat.uid.unwrap_or(0),
        gid: stat.gid.unwrap_or(0),
        size: stat.size.unwrap_or(0),
        access_time: millis(stat.atime),
        modify_time: millis(stat.mtime),
        is_directory: kind == EntryKind::Directory,
        is_file: kind == EntryKind::File,
        is_symbolic_link: kind == EntryKind::Symlink,
    }
}

fn millis(secs: Option<u64>) -> u64 {
    secs.unwrap_or(0).saturating_mul(1000)
}

fn is_not_found(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(FX_NO_SUCH_FILE) | ErrorCode::SFTP(FX_NO_SUCH_PATH))
}

fn remote_err<'a>(operation: &'static str, path: &'a str) -> impl Fn(ssh2::Error) -> SftpFlowError + 'a {
    move |e| SftpFlowError::Remote {
        operation: operation.to_string(),
        path: path.to_string(),
        reason: e.message().to_string(),
    }
}

/// Current system username, used when neither request nor profile names one.
fn current_username() -> Result<String, String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map_err(|_| {
            "No username configured and neither USER nor USERNAME is set".to_string()
        })
}

/// Every prefix of `path`, shortest first.
fn path_components(path: &Path) -> Vec<PathBuf> {
    let mut components = Vec::new();
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        components.push(current.clone());
    }
    components
}
