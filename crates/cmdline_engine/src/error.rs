//! Error types for registries, type resolution, execution, and configuration.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Command registration failures. The registry is left unchanged when one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A command with the same name is already registered.
    #[error("command `{0}` is already registered")]
    DuplicateCommand(String),
    /// The command name is empty or only whitespace.
    #[error("command names must not be empty")]
    EmptyName,
    /// Two parameters of one command share a name.
    #[error("command `{command}` declares parameter `{param}` twice")]
    DuplicateParameter {
        /// Command name.
        command: String,
        /// Repeated parameter name.
        param: String,
    },
}

/// Type registration and resolution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// No type or factory is registered under the name.
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// A type or factory with the same name already exists.
    #[error("type `{0}` is already registered")]
    DuplicateType(String),
    /// Factory options could not be interpreted.
    #[error("invalid options for type `{name}`: {message}")]
    InvalidOptions {
        /// Type name.
        name: String,
        /// What was wrong.
        message: String,
    },
    /// The operation needs a selection-like type.
    #[error("type `{0}` has no selection data")]
    NotSelection(String),
    /// A delegate could not decide on a concrete type.
    #[error("parameter `{param}` of `{command}` has no resolvable type")]
    UnresolvedDelegate {
        /// Command name.
        command: String,
        /// Parameter name.
        param: String,
    },
    /// A remote type could not reach its peer.
    #[error("remote lookup failed: {0}")]
    Remote(String),
}

/// Converter registration failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConverterError {
    /// A converter for the same pair already exists.
    #[error("a converter from `{from}` to `{to}` is already registered")]
    Duplicate {
        /// Source type name.
        from: String,
        /// Target type name.
        to: String,
    },
    /// The registration would make more than one chain lead from `from` to `to`.
    #[error("more than one converter chain leads from `{from}` to `{to}`")]
    AmbiguousChain {
        /// Source type name.
        from: String,
        /// Target type name.
        to: String,
    },
}

/// Failure raised by a command executor or converter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    /// The command failed with a message.
    #[error("{0}")]
    Failed(String),
    /// The command failed on the other side of the bridge.
    #[error("{message}")]
    Remote {
        /// Error payload as reported by the remote side.
        data: Value,
        /// Human-readable rendering of `data`.
        message: String,
    },
    /// A deferred result was dropped without being resolved.
    #[error("command result was abandoned before completion")]
    Abandoned,
}

impl CommandError {
    /// Creates a plain failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wraps a remote error payload.
    pub fn remote(data: Value) -> Self {
        let message = match &data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self::Remote { data, message }
    }
}

/// Failures of requisition operations that name something that does not exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequisitionError {
    /// No command has this name.
    #[error("No command called '{0}'")]
    NoSuchCommand(String),
    /// The command has no parameter with this name.
    #[error("No parameter called '{param}' in '{command}'")]
    NoSuchParameter {
        /// Command name, empty when no command is matched.
        command: String,
        /// Parameter name.
        param: String,
    },
    /// The parameter type could not be built.
    #[error(transparent)]
    Type(#[from] TypeError),
    /// The requisition was dropped while a context still referenced it.
    #[error("the requisition is no longer available")]
    Detached,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Config path, `<inline>` for in-memory text.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}
