//! Incremental command-line interpreter engine.
//!
//! Text typed by a user is tokenized, matched against registered commands and bound to typed
//! parameters while the user types. Each parameter's [`types::Type`] converts its argument text
//! into a [`TypedValue`] with a status, a message and predictions; the [`Requisition`] aggregates
//! them and executes the command once everything is valid.
//!
//! Registries hang off an explicit [`System`] handle so several interpreters can coexist.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod command;
pub mod config;
pub mod context;
pub mod conversion;
pub mod converters;
pub mod error;
pub mod registry;
pub mod requisition;
pub mod system;
pub mod types;
pub mod value;

pub use command::{CommandArgs, CommandOutput, CommandSpec, Executor, ParamSpec, ParamType};
pub use config::{Location, SystemConfig};
pub use context::{Deferred, DeferredResult, Environment, ExecutionContext};
pub use conversion::{Conversion, ParamArg, Prediction, Predictions};
pub use converters::{Converted, Converter, ConverterRegistry};
pub use error::{CommandError, ConfigError, ConverterError, RegistryError, RequisitionError, TypeError};
pub use registry::{CommandRegistry, CommandsSubscription};
pub use requisition::{Assignment, Output, Requisition};
pub use system::System;
pub use value::{NodeHandle, NodeList, ResourceKind, ResourceRef, TypedValue, ViewSpec};
