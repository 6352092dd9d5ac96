//! Per-execution environment handed to executors, converters and type parsers.

use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use cmdline_contract::Status;
use futures::channel::oneshot;
use serde_json::Value;

use crate::{
    command::CommandOutput,
    config::Location,
    error::{CommandError, RequisitionError},
    requisition::{Output, Requisition, RequisitionInner},
    value::{TypedValue, ViewSpec},
};

/// Opaque bag of ambient references such as the active window or document.
///
/// The interpreter never inspects the entries; commands and host types downcast them by key.
#[derive(Clone, Default)]
pub struct Environment {
    entries: Rc<BTreeMap<String, Rc<dyn Any>>>,
}

impl Environment {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `value` stored under `key`.
    pub fn with<T: Any>(mut self, key: impl Into<String>, value: T) -> Self {
        Rc::make_mut(&mut self.entries).insert(key.into(), Rc::new(value));
        self
    }

    /// Borrows the entry under `key` as `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    /// Whether an entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns a copy where entries of `overrides` replace entries with the same key.
    pub fn merged(&self, overrides: &Environment) -> Environment {
        let mut entries = (*self.entries).clone();
        for (key, value) in overrides.entries.iter() {
            entries.insert(key.clone(), value.clone());
        }
        Self {
            entries: Rc::new(entries),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Context for one parse or execution.
#[derive(Clone)]
pub struct ExecutionContext {
    environment: Environment,
    typed: String,
    location: Location,
    requisition: Weak<RequisitionInner>,
}

impl ExecutionContext {
    /// A context not attached to any requisition; `update` and `update_exec` report
    /// [`RequisitionError::Detached`].
    pub fn detached(environment: Environment, location: Location) -> Self {
        Self {
            environment,
            typed: String::new(),
            location,
            requisition: Weak::new(),
        }
    }

    pub(crate) fn attached(
        environment: Environment,
        typed: String,
        location: Location,
        requisition: Weak<RequisitionInner>,
    ) -> Self {
        Self {
            environment,
            typed,
            location,
            requisition,
        }
    }

    /// Ambient references supplied by the host.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The text the requisition held when this context was created.
    pub fn typed(&self) -> &str {
        &self.typed
    }

    /// Where the interpreter is running.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Creates a placeholder for a result that becomes available later.
    ///
    /// The executor returns the [`DeferredResult`] (usually by awaiting it) and hands the
    /// [`Deferred`] to whatever produces the value.
    pub fn defer(&self) -> (Deferred, DeferredResult) {
        let (sender, receiver) = oneshot::channel();
        (Deferred { sender }, DeferredResult { receiver })
    }

    /// Wraps a template and its data into a view value.
    pub fn create_view(&self, html: impl Into<String>, data: Value) -> TypedValue {
        TypedValue::View(ViewSpec {
            html: html.into(),
            data,
        })
    }

    /// Re-enters the owning requisition with new text.
    pub async fn update(&self, typed: &str) -> Result<Status, RequisitionError> {
        let requisition = self.requisition()?;
        Ok(requisition.update(typed).await)
    }

    /// Re-enters the owning requisition with new text and executes it.
    pub async fn update_exec(&self, typed: &str) -> Result<Output, RequisitionError> {
        let requisition = self.requisition()?;
        Ok(requisition.update_exec(typed).await)
    }

    fn requisition(&self) -> Result<Requisition, RequisitionError> {
        self.requisition
            .upgrade()
            .map(Requisition::from_inner)
            .ok_or(RequisitionError::Detached)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("typed", &self.typed)
            .field("location", &self.location)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Producer side of a deferred command result.
#[derive(Debug)]
pub struct Deferred {
    sender: oneshot::Sender<Result<CommandOutput, CommandError>>,
}

impl Deferred {
    /// Completes the command with a value.
    pub fn resolve(self, output: impl Into<CommandOutput>) {
        let _ = self.sender.send(Ok(output.into()));
    }

    /// Fails the command.
    pub fn reject(self, error: CommandError) {
        let _ = self.sender.send(Err(error));
    }
}

/// Consumer side of a deferred command result. Resolves to [`CommandError::Abandoned`] when the
/// [`Deferred`] is dropped unresolved.
#[derive(Debug)]
pub struct DeferredResult {
    receiver: oneshot::Receiver<Result<CommandOutput, CommandError>>,
}

impl Future for DeferredResult {
    type Output = Result<CommandOutput, CommandError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(CommandError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    #[test]
    fn environment_is_opaque_and_typed_by_key() {
        let environment = Environment::new().with("window", 7_u32).with("title", "Docs".to_string());
        assert_eq!(environment.get::<u32>("window"), Some(&7));
        assert_eq!(environment.get::<String>("title").map(String::as_str), Some("Docs"));
        assert_eq!(environment.get::<u64>("window"), None);
        assert!(!environment.contains("document"));

        let merged = environment.merged(&Environment::new().with("window", 9_u32));
        assert_eq!(merged.get::<u32>("window"), Some(&9));
        assert!(merged.contains("title"));
    }

    #[test]
    fn deferred_resolves_and_rejects() {
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let (deferred, result) = context.defer();
        deferred.resolve("done");
        assert_eq!(
            block_on(result),
            Ok(CommandOutput::new(TypedValue::String("done".into())))
        );

        let (deferred, result) = context.defer();
        deferred.reject(CommandError::new("nope"));
        assert_eq!(block_on(result), Err(CommandError::new("nope")));

        let (deferred, result) = context.defer();
        drop(deferred);
        assert_eq!(block_on(result), Err(CommandError::Abandoned));
    }

    #[test]
    fn detached_context_cannot_reenter() {
        let context = ExecutionContext::detached(Environment::new(), Location::Client);
        assert_eq!(
            block_on(context.update("help")),
            Err(RequisitionError::Detached)
        );
        assert_eq!(
            context.create_view("<p/>", Value::Null),
            TypedValue::View(ViewSpec {
                html: "<p/>".into(),
                data: Value::Null
            })
        );
    }
}
