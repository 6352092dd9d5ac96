//! Type abstraction: text to value conversion, stepping, lookups and serializable specs.

mod array;
mod boolean;
mod date;
mod delegate;
mod node;
mod number;
mod registry;
mod resource;
mod selection;
mod string;
mod union;

use cmdline_contract::TypeSpec;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    error::TypeError,
    value::TypedValue,
};

pub use array::ArrayType;
pub use boolean::BooleanType;
pub use date::DateType;
pub use delegate::{DelegateContext, DelegateResolver, DelegateType};
pub use node::{DocumentHost, Highlighter, NodeListType, NodeType, SelectorError};
pub use number::NumberType;
pub use registry::{factory, TypeFactory, TypeRegistry};
pub use resource::{ResourceFilter, ResourceType};
pub use selection::{LookupEntry, LookupFn, SelectionType};
pub use string::StringType;
pub use union::UnionType;

/// Boxed future returned by type operations.
pub type TypeFuture<'a, T> = LocalBoxFuture<'a, T>;

/// A named capability that converts argument text into typed values.
///
/// Parsing never fails: malformed input is reported through the returned [`Conversion`] status.
pub trait Type {
    /// Registered or factory name.
    fn name(&self) -> &str;

    /// Converts the argument into a value.
    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion>;

    /// Renders a value back to argument text.
    fn stringify(&self, value: &TypedValue, _context: &ExecutionContext) -> String {
        value.to_display_string()
    }

    /// Next value for ordinal types; `None` when the type is not ordinal.
    fn increment<'a>(
        &'a self,
        _value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async { None })
    }

    /// Previous value for ordinal types; `None` when the type is not ordinal.
    fn decrement<'a>(
        &'a self,
        _value: Option<&'a TypedValue>,
        _context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async { None })
    }

    /// Value of an optional parameter left blank that has no declared default.
    fn blank_value(&self, _context: &ExecutionContext) -> Option<TypedValue> {
        None
    }

    /// Entries for UI pickers.
    fn lookup<'a>(&'a self, _context: &'a ExecutionContext) -> TypeFuture<'a, Result<Vec<LookupEntry>, TypeError>> {
        let name = self.name().to_string();
        Box::pin(async move { Err(TypeError::NotSelection(name)) })
    }

    /// Raw dataset for UI pickers.
    fn data<'a>(&'a self, _context: &'a ExecutionContext) -> TypeFuture<'a, Result<Value, TypeError>> {
        let name = self.name().to_string();
        Box::pin(async move { Err(TypeError::NotSelection(name)) })
    }

    /// Serializable form for a parameter of `command_name`. Types whose behavior cannot cross the
    /// bridge describe themselves as `remote`.
    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        TypeSpec::named(self.name())
    }

    /// Whether every valid value comes from a known set, so unmatched text is an error.
    fn is_closed_domain(&self) -> bool {
        false
    }

    /// Whether parameters of this type are `--name` switches.
    fn is_boolean(&self) -> bool {
        false
    }

    /// Whether parameters of this type collect several arguments.
    fn is_array(&self) -> bool {
        false
    }

    /// Present for placeholder types whose real type depends on the surrounding command.
    fn as_delegate(&self) -> Option<&DelegateType> {
        None
    }

    /// Called when the cursor enters a parameter of this type.
    fn on_focus(&self, _conversion: &Conversion) {}

    /// Called when the cursor leaves a parameter of this type.
    fn on_blur(&self, _conversion: &Conversion) {}

    /// Called when the focused parameter's conversion changes.
    fn on_change(&self, _conversion: &Conversion) {}
}

/// Message for text that matches nothing in a closed set.
pub(crate) fn cannot_use(text: &str) -> String {
    format!("Can't use '{text}'.")
}
