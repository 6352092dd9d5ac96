use cmdline_contract::TypeSpec;

use super::{LookupEntry, SelectionType, Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    value::TypedValue,
};

/// `true` or `false`. Parameters of this type are `--name` switches defaulting to `false`.
#[derive(Debug, Clone)]
pub struct BooleanType {
    choices: SelectionType,
}

impl BooleanType {
    /// Boolean type.
    pub fn new() -> Self {
        Self {
            choices: SelectionType::from_entries(vec![
                LookupEntry::new("true", TypedValue::Bool(true)),
                LookupEntry::new("false", TypedValue::Bool(false)),
            ])
            .named("boolean"),
        }
    }
}

impl Default for BooleanType {
    fn default() -> Self {
        Self::new()
    }
}

impl Type for BooleanType {
    fn name(&self) -> &str {
        "boolean"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        self.choices.parse(arg, context)
    }

    fn stringify(&self, value: &TypedValue, _context: &ExecutionContext) -> String {
        match value {
            TypedValue::Bool(flag) => flag.to_string(),
            other => other.to_display_string(),
        }
    }

    fn blank_value(&self, _context: &ExecutionContext) -> Option<TypedValue> {
        Some(TypedValue::Bool(false))
    }

    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        TypeSpec::named("boolean")
    }

    fn is_closed_domain(&self) -> bool {
        true
    }

    fn is_boolean(&self) -> bool {
        true
    }
}
