//! Single-connection, single-operation request execution.
//!
//! `OperationExecutor::execute` resolves the request's server profile and
//! operation, opens one transport, performs one remote call, and closes the
//! transport on every exit path. Close failures are logged and dropped; they
//! never replace the request's own outcome.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use serde::{Serialize, Serializer};

use crate::config::profiles::ProfileRegistry;
use crate::connection::{build_descriptor, ConnectionDescriptor};
use crate::error::SftpFlowError;
use crate::request::{
    resolve_local_path, resolve_operation_name, resolve_recursive, resolve_remote_path, Content,
    Operation, OperationDefaults, OperationRequest,
};
use crate::transport::{
    EntryKind, PutSource, RemoteEntry, RemoteStat, SftpTransport, TransportFactory,
};

/// Lifecycle phase reported to a `StatusObserver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<'a> {
    Connecting,
    Connected,
    Operating(Operation),
    Done,
    Failed(&'a str),
}

impl Phase<'_> {
    pub fn label(&self) -> &str {
        match self {
            Phase::Connecting => "connecting...",
            Phase::Connected => "connected",
            Phase::Operating(op) => op.progress_label(),
            Phase::Done => "done",
            Phase::Failed(message) => message,
        }
    }
}

/// Optional side channel notified at phase boundaries.
pub trait StatusObserver: Send + Sync {
    fn notify(&self, phase: Phase<'_>);
}

impl<F> StatusObserver for F
where
    F: Fn(Phase<'_>) + Send + Sync,
{
    fn notify(&self, phase: Phase<'_>) {
        self(phase)
    }
}

/// Observer that ignores every phase.
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn notify(&self, _phase: Phase<'_>) {}
}

/// Observer that logs phases through `tracing`.
pub struct TracingObserver;

impl StatusObserver for TracingObserver {
    fn notify(&self, phase: Phase<'_>) {
        match phase {
            Phase::Failed(message) => tracing::warn!(status = "error", "{}", message),
            Phase::Done => tracing::info!(status = "done", "Operation finished"),
            other => tracing::debug!(status = other.label(), "Operation progress"),
        }
    }
}

/// Result of an `exists` probe: `false`, or the kind of what was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe(pub Option<EntryKind>);

impl Probe {
    pub fn exists(&self) -> bool {
        self.0.is_some()
    }
}

impl Serialize for Probe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(kind) => kind.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }
}

/// Operation-specific result payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Entries(Vec<RemoteEntry>),
    Content(Content),
    Downloaded {
        success: bool,
        #[serde(rename = "localPath")]
        local_path: String,
    },
    Uploaded {
        success: bool,
        #[serde(rename = "remotePath")]
        remote_path: String,
    },
    Deleted {
        success: bool,
        deleted: String,
    },
    Created {
        success: bool,
        created: String,
    },
    Removed {
        success: bool,
        removed: String,
    },
    Renamed {
        success: bool,
        from: String,
        to: String,
    },
    Probe(Probe),
    Stat(RemoteStat),
}

/// What was executed, attached to every successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub operation: Operation,
    pub remote_path: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub payload: ResultPayload,
    /// Only set for `exists`.
    pub exists: Option<bool>,
    pub metadata: ResultMetadata,
}

/// Transport that is closed when dropped, whatever happened in between.
struct ScopedTransport {
    inner: Box<dyn SftpTransport>,
}

impl Deref for ScopedTransport {
    type Target = dyn SftpTransport;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedTransport {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedTransport {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            tracing::debug!(error = %e, "Ignoring error while closing SFTP connection");
        }
    }
}

/// Executes operation requests against an injected profile registry.
pub struct OperationExecutor {
    profiles: ProfileRegistry,
    defaults: OperationDefaults,
    transports: Box<dyn TransportFactory>,
    observer: Box<dyn StatusObserver>,
}

impl OperationExecutor {
    pub fn new(
        profiles: ProfileRegistry,
        defaults: OperationDefaults,
        transports: impl TransportFactory + 'static,
    ) -> Self {
        Self {
            profiles,
            defaults,
            transports: Box::new(transports),
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl StatusObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn defaults(&self) -> &OperationDefaults {
        &self.defaults
    }

    /// Execute one request over a fresh connection.
    pub fn execute(&self, request: &OperationRequest) -> Result<OperationResult, SftpFlowError> {
        let outcome = self.run(request);
        match &outcome {
            Ok(_) => self.observer.notify(Phase::Done),
            Err(e) => self.observer.notify(Phase::Failed(&e.to_string())),
        }
        outcome
    }

    fn run(&self, request: &OperationRequest) -> Result<OperationResult, SftpFlowError> {
        let profile_id = request
            .server
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.defaults.server.as_deref())
            .ok_or(SftpFlowError::ProfileNotConfigured)?;
        let profile = self
            .profiles
            .get(profile_id)
            .ok_or_else(|| SftpFlowError::ProfileNotFound {
                id: profile_id.to_string(),
            })?;

        // Unknown names fail here, before any connection is attempted.
        let operation: Operation = resolve_operation_name(request, &self.defaults).parse()?;
        let remote_path = resolve_remote_path(request, &self.defaults);
        let descriptor = build_descriptor(profile, &request.overrides());

        tracing::info!(
            profile = profile_id,
            %operation,
            remote_path = %remote_path,
            host = %descriptor.host,
            port = descriptor.port,
            "Executing SFTP operation"
        );

        let payload = self.connect_and_dispatch(&descriptor, operation, &remote_path, request)?;
        let exists = match &payload {
            ResultPayload::Probe(probe) => Some(probe.exists()),
            _ => None,
        };

        Ok(OperationResult {
            payload,
            exists,
            metadata: ResultMetadata {
                operation,
                remote_path,
                host: descriptor.host,
                port: descriptor.port,
            },
        })
    }

    fn connect_and_dispatch(
        &self,
        descriptor: &ConnectionDescriptor,
        operation: Operation,
        remote_path: &str,
        request: &OperationRequest,
    ) -> Result<ResultPayload, SftpFlowError> {
        let mut transport = ScopedTransport {
            inner: self.transports.create(),
        };

        self.observer.notify(Phase::Connecting);
        transport.connect(descriptor)?;
        self.observer.notify(Phase::Connected);

        self.observer.notify(Phase::Operating(operation));
        let local_path = resolve_local_path(request, &self.defaults);
        let recursive = resolve_recursive(request, &self.defaults);
        dispatch(
            &mut *transport,
            operation,
            remote_path,
            local_path.as_deref(),
            recursive,
            request,
        )
    }
}

fn dispatch(
    transport: &mut dyn SftpTransport,
    operation: Operation,
    remote_path: &str,
    local_path: Option<&str>,
    recursive: bool,
    request: &OperationRequest,
) -> Result<ResultPayload, SftpFlowError> {
    let payload = match operation {
        Operation::List => ResultPayload::Entries(transport.list(remote_path)?),

        Operation::Get => match local_path {
            Some(local) => {
                transport.get_to_file(remote_path, Path::new(local))?;
                ResultPayload::Downloaded {
                    success: true,
                    local_path: local.to_string(),
                }
            }
            None => ResultPayload::Content(Content::Binary(transport.get(remote_path)?)),
        },

        Operation::Put => {
            let binary = request.payload.as_ref().and_then(Content::as_binary);
            let source = match (binary, local_path) {
                (Some(bytes), _) => PutSource::Bytes(bytes),
                (None, Some(local)) => PutSource::File(Path::new(local)),
                (None, None) => {
                    return Err(SftpFlowError::Usage(
                        "put operation requires a binary payload or localPath".into(),
                    ))
                }
            };
            transport.put(source, remote_path)?;
            ResultPayload::Uploaded {
                success: true,
                remote_path: remote_path.to_string(),
            }
        }

        Operation::Delete => {
            transport.delete(remote_path)?;
            ResultPayload::Deleted {
                success: true,
                deleted: remote_path.to_string(),
            }
        }

        Operation::Mkdir => {
            transport.mkdir(remote_path, recursive)?;
            ResultPayload::Created {
                success: true,
                created: remote_path.to_string(),
            }
        }

        Operation::Rmdir => {
            transport.rmdir(remote_path, recursive)?;
            ResultPayload::Removed {
                success: true,
                removed: remote_path.to_string(),
            }
        }

        Operation::Rename => {
            let new_path = request
                .new_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .or(local_path)
                .ok_or_else(|| {
                    SftpFlowError::Usage("rename operation requires newPath or localPath".into())
                })?;
            transport.rename(remote_path, new_path)?;
            ResultPayload::Renamed {
                success: true,
                from: remote_path.to_string(),
                to: new_path.to_string(),
            }
        }

        Operation::Exists => ResultPayload::Probe(Probe(transport.exists(remote_path)?)),

        Operation::Stat => ResultPayload::Stat(transport.stat(remote_path)?),
    };
    Ok(payload)
}
