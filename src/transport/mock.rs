//! In-memory transport for tests: records every call and returns scripted
//! results.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::connection::ConnectionDescriptor;
use crate::error::SftpFlowError;
use crate::transport::{
    EntryKind, PutSource, RemoteEntry, RemoteStat, Rights, SftpTransport, TransportFactory,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect {
        host: String,
        port: u16,
        username: Option<String>,
        try_keyboard: bool,
    },
    Close,
    List(String),
    Get(String),
    GetToFile(String, PathBuf),
    PutBytes(Vec<u8>, String),
    PutFile(PathBuf, String),
    Delete(String),
    Mkdir(String, bool),
    Rmdir(String, bool),
    Rename(String, String),
    Exists(String),
    Stat(String),
}

/// Scripted responses.
#[derive(Debug, Clone)]
pub struct Behaviour {
    pub fail_connect: Option<String>,
    pub fail_operation: Option<String>,
    pub fail_close: bool,
    pub entries: Vec<RemoteEntry>,
    pub content: Vec<u8>,
    pub exists: Option<EntryKind>,
    pub stat: RemoteStat,
}

impl Default for Behaviour {
    fn default() -> Self {
        let entry = |kind, name: &str, size| RemoteEntry {
            kind,
            name: name.to_string(),
            size,
            modify_time: 1_700_000_000_000,
            access_time: 1_700_000_000_000,
            rights: Rights::from_mode(0o644),
            owner: 1000,
            group: 1000,
        };
        Self {
            fail_connect: None,
            fail_operation: None,
            fail_close: false,
            entries: vec![
                entry(EntryKind::File, "file1.txt", 1024),
                entry(EntryKind::Directory, "subdir", 4096),
            ],
            content: b"file content".to_vec(),
            exists: Some(EntryKind::File),
            stat: RemoteStat {
                mode: 0o100644,
                uid: 1000,
                gid: 1000,
                size: 1024,
                access_time: 1_700_000_000_000,
                modify_time: 1_700_000_000_000,
                is_directory: false,
                is_file: true,
                is_symbolic_link: false,
            },
        }
    }
}

/// Hands out `MockTransport`s sharing one call log.
#[derive(Clone, Default)]
pub struct MockFactory {
    calls: Arc<Mutex<Vec<Call>>>,
    behaviour: Arc<Behaviour>,
}

impl MockFactory {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            calls: Arc::default(),
            behaviour: Arc::new(behaviour),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn close_count(&self) -> usize {
        self.count(|c| *c == Call::Close)
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect { .. }))
    }
}

impl TransportFactory for MockFactory {
    fn create(&self) -> Box<dyn SftpTransport> {
        Box::new(MockTransport {
            calls: Arc::clone(&self.calls),
            behaviour: Arc::clone(&self.behaviour),
        })
    }
}

pub struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    behaviour: Arc<Behaviour>,
}

impl MockTransport {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn outcome(&self, operation: &str, path: &str) -> Result<(), SftpFlowError> {
        match &self.behaviour.fail_operation {
            Some(reason) => Err(SftpFlowError::Remote {
                operation: operation.to_string(),
                path: path.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl SftpTransport for MockTransport {
    fn connect(&mut self, descriptor: &ConnectionDescriptor) -> Result<(), SftpFlowError> {
        self.record(Call::Connect {
            host: descriptor.host.clone(),
            port: descriptor.port,
            username: descriptor.username.clone(),
            try_keyboard: descriptor.try_keyboard,
        });
        match &self.behaviour.fail_connect {
            Some(reason) => Err(SftpFlowError::ConnectionFailed {
                host: descriptor.host.clone(),
                port: descriptor.port,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), SftpFlowError> {
        self.record(Call::Close);
        if self.behaviour.fail_close {
            return Err(SftpFlowError::Io {
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "close failed"),
            });
        }
        Ok(())
    }

    fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SftpFlowError> {
        self.record(Call::List(path.to_string()));
        self.outcome("list", path)?;
        Ok(self.behaviour.entries.clone())
    }

    fn get(&mut self, path: &str) -> Result<Vec<u8>, SftpFlowError> {
        self.record(Call::Get(path.to_string()));
        self.outcome("get", path)?;
        Ok(self.behaviour.content.clone())
    }

    fn get_to_file(&mut self, path: &str, dest: &Path) -> Result<(), SftpFlowError> {
        self.record(Call::GetToFile(path.to_string(), dest.to_path_buf()));
        self.outcome("get", path)
    }

    fn put(&mut self, source: PutSource<'_>, path: &str) -> Result<(), SftpFlowError> {
        self.record(match source {
            PutSource::Bytes(data) => Call::PutBytes(data.to_vec(), path.to_string()),
            PutSource::File(local) => Call::PutFile(local.to_path_buf(), path.to_string()),
        });
        self.outcome("put", path)
    }

    fn delete(&mut self, path: &str) -> Result<(), SftpFlowError> {
        self.record(Call::Delete(path.to_string()));
        self.outcome("delete", path)
    }

    fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError> {
        self.record(Call::Mkdir(path.to_string(), recursive));
        self.outcome("mkdir", path)
    }

    fn rmdir(&mut self, path: &str, recursive: bool) -> Result<(), SftpFlowError> {
        self.record(Call::Rmdir(path.to_string(), recursive));
        self.outcome("rmdir", path)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpFlowError> {
        self.record(Call::Rename(from.to_string(), to.to_string()));
        self.outcome("rename", from)
    }

    fn exists(&mut self, path: &str) -> Result<Option<EntryKind>, SftpFlowError> {
        self.record(Call::Exists(path.to_string()));
        self.outcome("exists", path)?;
        Ok(self.behaviour.exists)
    }

    fn stat(&mut self, path: &str) -> Result<RemoteStat, SftpFlowError> {
        self.record(Call::Stat(path.to_string()));
        self.outcome("stat", path)?;
        Ok(self.behaviour.stat.clone())
    }
}
