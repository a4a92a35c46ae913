use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Error as JsonError;

use crate::reference::ReferenceKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum BridgeError {
    #[error("Compile error: {0}")]
    Compile(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal consistency error: reference ({}, {request}) was already resolved but the renderer reported it unresolved again", context.display())]
    Consistency { context: PathBuf, request: String },
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Could not resolve ({}, {request}): {message}", context.display())]
    Resolve {
        context: PathBuf,
        request: String,
        message: String,
    },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("@import \"{name}\" in {} could not be resolved as ({}, {request}): {message}", importer.display(), context.display())]
    UnresolvedImport {
        importer: PathBuf,
        name: String,
        context: PathBuf,
        request: String,
        message: String,
    },
}

impl BridgeError {
    pub fn resolve(key: &ReferenceKey, message: impl Into<String>) -> Self {
        BridgeError::Resolve {
            context: key.context.clone(),
            request: key.request.clone(),
            message: message.into(),
        }
    }

    /// The reference this error is about, if any.
    pub fn reference(&self) -> Option<ReferenceKey> {
        match self {
            BridgeError::Consistency { context, request }
            | BridgeError::Resolve {
                context, request, ..
            }
            | BridgeError::UnresolvedImport {
                context, request, ..
            } => Some(ReferenceKey::new(context.clone(), request.clone())),
            _ => None,
        }
    }

    /// Whether a host resolver miss produced this error, as opposed to I/O or
    /// compiler trouble.
    pub fn is_resolve_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::Resolve { .. } | BridgeError::UnresolvedImport { .. }
        )
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(src: toml::de::Error) -> BridgeError {
        BridgeError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for BridgeError {
    fn from(src: JsonError) -> BridgeError {
        BridgeError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for BridgeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => BridgeError::NotFound(format!("{x}")),
            _ => BridgeError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}
