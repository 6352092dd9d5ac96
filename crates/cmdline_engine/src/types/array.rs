use std::rc::Rc;

use cmdline_contract::{Status, TypeSpec};
use cmdline_lexer::Argument;
use futures::future::join_all;
use serde::Deserialize;

use super::{Type, TypeFuture, TypeRegistry};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    error::TypeError,
    value::TypedValue,
};

/// Options of the `array` factory.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrayOptions {
    /// Member type.
    pub subtype: TypeSpec,
}

/// List of values of one member type, collected from several arguments.
#[derive(Clone)]
pub struct ArrayType {
    subtype: Rc<dyn Type>,
}

impl ArrayType {
    /// Array of `subtype`.
    pub fn new(subtype: Rc<dyn Type>) -> Self {
        Self { subtype }
    }

    pub(crate) fn from_options(options: ArrayOptions, types: &TypeRegistry) -> Result<Self, TypeError> {
        Ok(Self::new(types.resolve(&options.subtype)?))
    }

    fn members(arg: &ParamArg) -> Vec<Argument> {
        match arg {
            ParamArg::Blank => Vec::new(),
            ParamArg::Single(argument) | ParamArg::Flag(argument) => {
                if argument.is_empty() {
                    Vec::new()
                } else {
                    vec![argument.clone()]
                }
            }
            ParamArg::Array(arguments) => arguments.clone(),
        }
    }

    /// A member of a closed-domain subtype that matches nothing can never become valid.
    fn escalate(&self, conversion: Conversion) -> Conversion {
        let dead_end = self.subtype.is_closed_domain()
            && conversion.status() == Status::Incomplete
            && !conversion.arg().text().trim().is_empty()
            && conversion.predictions().is_empty();
        if dead_end {
            let message = conversion.message().to_string();
            conversion.with_status(Status::Error, message)
        } else {
            conversion
        }
    }
}

impl Type for ArrayType {
    fn name(&self) -> &str {
        "array"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        Box::pin(async move {
            let members = Self::members(arg)
                .into_iter()
                .map(ParamArg::Single)
                .collect::<Vec<_>>();
            let conversions = join_all(
                members
                    .iter()
                    .map(|member| self.subtype.parse(member, context)),
            )
            .await
            .into_iter()
            .map(|conversion| self.escalate(conversion))
            .collect::<Vec<_>>();

            let status = Status::combine_all(conversions.iter().map(Conversion::status));
            let values = conversions
                .iter()
                .map(|conversion| conversion.value().cloned().unwrap_or_default())
                .collect::<Vec<_>>();
            let message = conversions
                .iter()
                .find(|conversion| conversion.status() == status && !conversion.message().is_empty())
                .map(|conversion| conversion.message().to_string())
                .unwrap_or_default();
            let predictions = conversions
                .last()
                .map(Conversion::prediction_source)
                .unwrap_or_default();

            let conversion = match status {
                Status::Valid => Conversion::valid(TypedValue::Array(values), arg.clone()),
                other => Conversion::incomplete(arg.clone(), "")
                    .with_value(TypedValue::Array(values))
                    .with_status(other, message),
            };
            conversion.with_predictions(predictions)
        })
    }

    fn stringify(&self, value: &TypedValue, context: &ExecutionContext) -> String {
        match value {
            TypedValue::Array(items) => items
                .iter()
                .map(|item| {
                    let text = self.subtype.stringify(item, context);
                    Argument::from_value(&text, "").to_source()
                })
                .collect::<Vec<_>>()
                .join(" "),
            other => self.subtype.stringify(other, context),
        }
    }

    fn blank_value(&self, _context: &ExecutionContext) -> Option<TypedValue> {
        Some(TypedValue::Array(Vec::new()))
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        TypeSpec::array(self.subtype.spec(command_name, param_name))
    }

    fn is_array(&self) -> bool {
        true
    }

    fn is_closed_domain(&self) -> bool {
        self.subtype.is_closed_domain()
    }
}
