//! Output converters between named value types.
//!
//! A converter turns a command result of one type (say `addon-list`) into another (say `view`).
//! Conversions use either a direct converter or a chain of two. Registration is refused when it
//! would give any pair of types more than one chain, so conversion never has to pick one.

use std::{cell::RefCell, fmt, future::Future, rc::Rc};

use futures::future::LocalBoxFuture;
use tracing::{debug, trace};

use crate::{
    context::ExecutionContext,
    error::{CommandError, ConverterError},
    value::TypedValue,
};

/// Async conversion function.
pub type ConverterFn =
    Rc<dyn Fn(TypedValue, &ExecutionContext) -> LocalBoxFuture<'static, Result<TypedValue, CommandError>>>;

/// Conversion from values of one type name to another.
#[derive(Clone)]
pub struct Converter {
    /// Source type name.
    pub from: String,
    /// Target type name.
    pub to: String,
    exec: ConverterFn,
}

impl Converter {
    /// Converter running `exec`.
    pub fn new<F, Fut>(from: impl Into<String>, to: impl Into<String>, exec: F) -> Self
    where
        F: Fn(TypedValue, &ExecutionContext) -> Fut + 'static,
        Fut: Future<Output = Result<TypedValue, CommandError>> + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            exec: Rc::new(
                move |value: TypedValue,
                      context: &ExecutionContext|
                      -> LocalBoxFuture<'static, Result<TypedValue, CommandError>> {
                    Box::pin(exec(value, context))
                },
            ),
        }
    }

    /// Synchronous converter.
    pub fn map(
        from: impl Into<String>,
        to: impl Into<String>,
        convert: impl Fn(TypedValue) -> TypedValue + 'static,
    ) -> Self {
        Self::new(from, to, move |value, _context| {
            let converted = convert(value);
            async move { Ok(converted) }
        })
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// A converted value and the type it now has.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    /// Converted value.
    pub value: TypedValue,
    /// Type name of `value`.
    pub type_name: String,
}

/// Shared registry of converters.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Rc<RefCell<Vec<Converter>>>,
}

impl ConverterRegistry {
    /// Registry without converters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a converter. Fails, leaving the registry unchanged, when the pair already has a
    /// converter or when some pair of types would become reachable through two chains.
    pub fn register(&self, converter: Converter) -> Result<(), ConverterError> {
        let mut converters = self.converters.borrow_mut();
        if converters
            .iter()
            .any(|existing| existing.from == converter.from && existing.to == converter.to)
        {
            return Err(ConverterError::Duplicate {
                from: converter.from,
                to: converter.to,
            });
        }

        converters.push(converter);
        if let Some((from, to)) = first_ambiguous_pair(&converters) {
            converters.pop();
            return Err(ConverterError::AmbiguousChain { from, to });
        }
        if let Some(added) = converters.last() {
            debug!(from = %added.from, to = %added.to, "registered converter");
        }
        Ok(())
    }

    /// Removes the converter for a pair. Returns whether one was removed.
    pub fn unregister(&self, from: &str, to: &str) -> bool {
        let mut converters = self.converters.borrow_mut();
        let before = converters.len();
        converters.retain(|converter| !(converter.from == from && converter.to == to));
        before != converters.len()
    }

    /// Converter functions leading from `from` to `to`, or `None` when no chain exists.
    pub fn chain(&self, from: &str, to: &str) -> Option<Vec<Converter>> {
        let converters = self.converters.borrow();
        chains(&converters, from, to).into_iter().next()
    }

    /// Converts `value` from type `from` to type `to`. Without a chain the value passes through
    /// unchanged and keeps its type.
    pub async fn convert(
        &self,
        value: TypedValue,
        from: &str,
        to: &str,
        context: &ExecutionContext,
    ) -> Result<Converted, CommandError> {
        let chain = if from == to { None } else { self.chain(from, to) };
        let Some(chain) = chain else {
            trace!(from, to, "no converter, passing through");
            return Ok(Converted {
                value,
                type_name: from.to_string(),
            });
        };

        let mut value = value;
        for step in chain {
            trace!(from = %step.from, to = %step.to, "converting");
            value = (step.exec)(value, context).await?;
        }
        Ok(Converted {
            value,
            type_name: to.to_string(),
        })
    }
}

fn chains(converters: &[Converter], from: &str, to: &str) -> Vec<Vec<Converter>> {
    let mut found = Vec::new();
    for first in converters.iter().filter(|converter| converter.from == from) {
        if first.to == to {
            found.push(vec![first.clone()]);
            continue;
        }
        if first.to == from {
            continue;
        }
        for second in converters
            .iter()
            .filter(|converter| converter.from == first.to && converter.to == to)
        {
            found.push(vec![first.clone(), second.clone()]);
        }
    }
    found
}

fn first_ambiguous_pair(converters: &[Converter]) -> Option<(String, String)> {
    let mut names = converters
        .iter()
        .flat_map(|converter| [converter.from.as_str(), converter.to.as_str()])
        .collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();

    for from in &names {
        for to in &names {
            if from != to && chains(converters, from, to).len() > 1 {
                return Some((from.to_string(), to.to_string()));
            }
        }
    }
    None
}
