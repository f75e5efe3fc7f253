//! Operation requests and the rules for resolving them against defaults.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::connection::ConnectionOverrides;
use crate::error::SftpFlowError;

/// The nine remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Put,
    Delete,
    Mkdir,
    Rmdir,
    Rename,
    Exists,
    Stat,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::List,
        Operation::Get,
        Operation::Put,
        Operation::Delete,
        Operation::Mkdir,
        Operation::Rmdir,
        Operation::Rename,
        Operation::Exists,
        Operation::Stat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
            Operation::Rename => "rename",
            Operation::Exists => "exists",
            Operation::Stat => "stat",
        }
    }

    /// Short progress label reported while the operation runs.
    pub fn progress_label(&self) -> &'static str {
        match self {
            Operation::List => "listing...",
            Operation::Get => "downloading...",
            Operation::Put => "uploading...",
            Operation::Delete => "deleting...",
            Operation::Mkdir => "creating dir...",
            Operation::Rmdir => "removing dir...",
            Operation::Rename => "renaming...",
            Operation::Exists => "checking...",
            Operation::Stat => "getting stats...",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SftpFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SftpFlowError::UnknownOperation {
                name: s.to_string(),
            })
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Message content carried by a request or produced by `get`.
///
/// On the wire, a JSON string is text, `{"base64": "..."}` or
/// `{"type": "Buffer", "data": [..]}` is binary, and anything else is kept
/// as an opaque value.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Binary(Vec<u8>),
    Text(String),
    Value(Value),
}

impl Content {
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Content::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, SftpFlowError> {
        match value {
            Value::String(text) => Ok(Content::Text(text)),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(encoded)) = map.get("base64") {
                        let bytes = STANDARD.decode(encoded).map_err(|e| {
                            SftpFlowError::InvalidPayload(format!("bad base64 content: {}", e))
                        })?;
                        return Ok(Content::Binary(bytes));
                    }
                }
                if map.len() == 2 && map.get("type").and_then(Value::as_str) == Some("Buffer") {
                    if let Some(Value::Array(items)) = map.get("data") {
                        let bytes = items
                            .iter()
                            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                            .collect::<Option<Vec<u8>>>()
                            .ok_or_else(|| {
                                SftpFlowError::InvalidPayload(
                                    "Buffer data must be an array of bytes".into(),
                                )
                            })?;
                        return Ok(Content::Binary(bytes));
                    }
                }
                Ok(Content::Value(Value::Object(map)))
            }
            other => Ok(Content::Value(other)),
        }
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Content::Binary(bytes) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("base64", &STANDARD.encode(bytes))?;
                map.end()
            }
            Content::Text(text) => serializer.serialize_str(text),
            Content::Value(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Content::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// One invocation. Every field is optional and falls back to the
/// `OperationDefaults` it is executed against.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// Correlation id echoed back in the response.
    #[serde(default)]
    pub id: Option<String>,
    /// Profile id override.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub remote_path: Option<String>,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub payload: Option<Content>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
}

impl OperationRequest {
    pub fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }
}

/// Configured defaults a request is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDefaults {
    pub server: Option<String>,
    pub operation: String,
    pub remote_path: String,
    pub local_path: String,
    pub recursive: bool,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        Self {
            server: None,
            operation: Operation::List.as_str().to_string(),
            remote_path: "/".to_string(),
            local_path: String::new(),
            recursive: false,
        }
    }
}

/// Effective remote path for a request.
///
/// Priority: explicit `remotePath`, then a text payload that starts with
/// `/`, then the configured default, then `/`. Binary and other payloads are
/// never used as a path.
pub fn resolve_remote_path(request: &OperationRequest, defaults: &OperationDefaults) -> String {
    if let Some(path) = request.remote_path.as_deref().filter(|p| !p.is_empty()) {
        return path.to_string();
    }
    if let Some(text) = request.payload.as_ref().and_then(Content::as_text) {
        if text.starts_with('/') {
            return text.to_string();
        }
    }
    if !defaults.remote_path.is_empty() {
        return defaults.remote_path.clone();
    }
    "/".to_string()
}

/// Effective operation name for a request; parsing happens separately so an
/// unknown name can be reported verbatim.
pub fn resolve_operation_name<'a>(
    request: &'a OperationRequest,
    defaults: &'a OperationDefaults,
) -> &'a str {
    request
        .operation
        .as_deref()
        .filter(|op| !op.is_empty())
        .unwrap_or(&defaults.operation)
}

/// Effective local path, if any.
pub fn resolve_local_path(request: &OperationRequest, defaults: &OperationDefaults) -> Option<String> {
    request
        .local_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .or(Some(defaults.local_path.as_str()).filter(|p| !p.is_empty()))
        .map(str::to_string)
}

pub fn resolve_recursive(request: &OperationRequest, defaults: &OperationDefaults) -> bool {
    request.recursive.unwrap_or(defaults.recursive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults_with_path(path: &str) -> OperationDefaults {
        OperationDefaults {
            remote_path: path.to_string(),
            ..OperationDefaults::default()
        }
    }

    #[test]
    fn operation_names_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_operation_is_named_in_error() {
        match "chmod".parse::<Operation>() {
            Err(SftpFlowError::UnknownOperation { name }) => assert_eq!(name, "chmod"),
            other => panic!("Expected UnknownOperation, got {:?}", other),
        }
        assert!("LIST".parse::<Operation>().is_err());
    }

    #[test]
    fn default_path_used_without_override() {
        let request = OperationRequest::default();
        assert_eq!(
            resolve_remote_path(&request, &defaults_with_path("/default/path")),
            "/default/path"
        );
    }

    #[test]
    fn explicit_path_wins() {
        let request = OperationRequest {
            remote_path: Some("/override/path".into()),
            payload: Some(Content::Text("/from/payload".into())),
            ..OperationRequest::default()
        };
        assert_eq!(
            resolve_remote_path(&request, &defaults_with_path("/default/path")),
            "/override/path"
        );
    }

    #[test]
    fn absolute_text_payload_beats_default() {
        let request = OperationRequest {
            payload: Some(Content::Text("/from/payload".into())),
            ..OperationRequest::default()
        };
        assert_eq!(
            resolve_remote_path(&request, &defaults_with_path("/default/path")),
            "/from/payload"
        );
    }

    #[test]
    fn relative_text_and_binary_payloads_are_not_paths() {
        let relative = OperationRequest {
            payload: Some(Content::Text("relative/file.txt".into())),
            ..OperationRequest::default()
        };
        assert_eq!(
            resolve_remote_path(&relative, &defaults_with_path("/default/path")),
            "/default/path"
        );

        let binary = OperationRequest {
            payload: Some(Content::Binary(b"/looks/like/a/path".to_vec())),
            ..OperationRequest::default()
        };
        assert_eq!(
            resolve_remote_path(&binary, &defaults_with_path("/default/path")),
            "/default/path"
        );
    }

    #[test]
    fn empty_everything_resolves_to_root() {
        let request = OperationRequest {
            remote_path: Some(String::new()),
            ..OperationRequest::default()
        };
        assert_eq!(resolve_remote_path(&request, &defaults_with_path("")), "/");
    }

    #[test]
    fn operation_falls_back_to_default() {
        let defaults = OperationDefaults::default();
        assert_eq!(resolve_operation_name(&OperationRequest::default(), &defaults), "list");
        let request = OperationRequest {
            operation: Some("stat".into()),
            ..OperationRequest::default()
        };
        assert_eq!(resolve_operation_name(&request, &defaults), "stat");
    }

    #[test]
    fn local_path_and_recursive_resolution() {
        let defaults = OperationDefaults {
            local_path: "/tmp/default".into(),
            recursive: true,
            ..OperationDefaults::default()
        };
        let request = OperationRequest::default();
        assert_eq!(resolve_local_path(&request, &defaults).as_deref(), Some("/tmp/default"));
        assert!(resolve_recursive(&request, &defaults));

        let request = OperationRequest {
            local_path: Some("/tmp/mine".into()),
            recursive: Some(false),
            ..OperationRequest::default()
        };
        assert_eq!(resolve_local_path(&request, &defaults).as_deref(), Some("/tmp/mine"));
        assert!(!resolve_recursive(&request, &defaults));

        assert_eq!(
            resolve_local_path(&OperationRequest::default(), &OperationDefaults::default()),
            None
        );
    }

    #[test]
    fn request_parses_from_camel_case_json() {
        let request: OperationRequest = serde_json::from_value(json!({
            "id": "r1",
            "operation": "rename",
            "remotePath": "/a.txt",
            "newPath": "/b.txt",
            "port": 2222,
            "payload": {"base64": "aGVsbG8="}
        }))
        .unwrap();
        assert_eq!(request.id.as_deref(), Some("r1"));
        assert_eq!(request.new_path.as_deref(), Some("/b.txt"));
        assert_eq!(request.overrides().port, Some(2222));
        assert_eq!(request.payload, Some(Content::Binary(b"hello".to_vec())));
    }

    #[test]
    fn buffer_form_is_binary() {
        let content = Content::from_value(json!({"type": "Buffer", "data": [104, 105]})).unwrap();
        assert_eq!(content.as_binary(), Some(&b"hi"[..]));
        assert!(Content::from_value(json!({"type": "Buffer", "data": [300]})).is_err());
    }

    #[test]
    fn other_json_is_opaque() {
        let content = Content::from_value(json!({"key": 1})).unwrap();
        assert!(content.as_binary().is_none());
        assert!(content.as_text().is_none());
        assert!(Content::from_value(json!({"base64": "***"})).is_err());
    }

    #[test]
    fn binary_serializes_as_base64() {
        let json = serde_json::to_value(Content::Binary(b"file content".to_vec())).unwrap();
        assert_eq!(json, json!({"base64": "ZmlsZSBjb250ZW50"}));
    }
}
