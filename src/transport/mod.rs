#[cfg(test)]
pub mod mock;
pub mod ssh;

use std::path::Path;

use serde::{Serialize, Serializer};

use crate::connection::ConnectionDescriptor;
use crate::error::SftpFlowError;

const S_IFMT: u32 = 0o170000;

/// Kind of a remote directory entry, rendered the way `ls -l` prints the
/// first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Directory => "d",
            EntryKind::File => "-",
            EntryKind::Symlink => "l",
            EntryKind::BlockDevice => "b",
            EntryKind::CharDevice => "c",
            EntryKind::Fifo => "p",
            EntryKind::Socket => "s",
        }
    }

    /// Decode the file-type bits of a POSIX mode.
    pub fn from_mode(mode: u32) -> EntryKind {
        match mode & S_IFMT {
            0o040000 => EntryKind::Directory,
            0o120000 => EntryKind::Symlink,
            0o060000 => EntryKind::BlockDevice,
            0o020000 => EntryKind::CharDevice,
            0o010000 => EntryKind::Fifo,
            0o140000 => EntryKind::Socket,
            _ => EntryKind::File,
        }
    }

    /// Collapse to the three kinds an existence probe reports.
    pub fn probe_kind(self) -> EntryKind {
        match self {
            EntryKind::Directory | EntryKind::Symlink => self,
            _ => EntryKind::File,
        }
    }
}

impl Serialize for EntryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Permission triplets as `rwx` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rights {
    pub user: String,
    pub group: String,
    pub other: String,
}

impl Rights {
    pub fn from_mode(mode: u32) -> Self {
        fn triplet(bits: u32) -> String {
            let mut s = String::with_capacity(3);
            if bits & 0o4 != 0 {
                s.push('r');
            }
            if bits & 0o2 != 0 {
                s.push('w');
            }
            if bits & 0o1 != 0 {
                s.push('x');
            }
            s
        }
        Rights {
            user: triplet(mode >> 6),
            group: triplet(mode >> 3),
            other: triplet(mode),
        }
    }
}

/// Entry in a remote directory listing. Times are milliseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub modify_time: u64,
    pub access_time: u64,
    pub rights: Rights,
    pub owner: u32,
    pub group: u32,
}

/// Metadata for a single remote path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub access_time: u64,
    pub modify_time: u64,
    pub is_directory: bool,
    pub is_file: bool,
    pub is_symbolic_link: bool,
}

/// Where `put` reads its content from.
#[derive(Debug, Clone, Copy)]
pub enum PutSource<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

/// One SSH/SFTP connection.
///
/// Blocking by contract: the executor runs each request on a blocking thread
/// and drives exactly one connect, one operation and one close per transport.
pub trait SftpTransport {
    fn connect(&mut self, descriptor: &ConnectionDescriptor) -> Result<(), SftpFlowError>;

    /// Best-effort teardown. Must be safe to call when never connected.
    fn close(&mut self) -> Result<(), SftpFlowError>;

    fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SftpFlowError>;

    /// Read a whole remote file into memory.
    fn get(&mut self, path: &str) -> Result<Vec<u8>, SftpFlowError>;

    /// Stream a remote file into a local file.
    fn get_to_file(&mut self, path: &str, dest: &Path) -> Result<(), SftpFlowError>;

    fn put(&mut self, source: PutSource<'_>, path: &str) -> Result<(), SftpFlowError>;

    fn delete(&mut self, path: &str) -> Result<(), SftpFlowError>;

    fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError>;

    fn rmdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpFlowError>;

    /// `None` when nothing exists at `path`; otherwise directory, file or
    /// symlink.
    fn exists(&mut self, path: &str) -> Result<Option<EntryKind>, SftpFlowError>;

    fn stat(&mut self, path: &str) -> Result<RemoteStat, SftpFlowError>;
}

/// Produces a fresh, unconnected transport for each request.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn SftpTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn SftpTransport> + Send + Sync,
{
    fn create(&self) -> Box<dyn SftpTransport> {
        self()
    }
}
