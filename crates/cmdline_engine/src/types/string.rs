use cmdline_contract::TypeSpec;
use serde::Deserialize;
use serde_json::json;

use super::{Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    value::TypedValue,
};

/// Options of the `string` factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StringOptions {
    /// Accept empty text as a valid value.
    pub allow_blank: bool,
}

/// Free text.
#[derive(Debug, Clone, Default)]
pub struct StringType {
    allow_blank: bool,
}

impl StringType {
    /// String type accepting empty text.
    pub fn allowing_blank() -> Self {
        Self { allow_blank: true }
    }

    pub(crate) fn from_options(options: StringOptions) -> Self {
        Self {
            allow_blank: options.allow_blank,
        }
    }
}

impl Type for StringType {
    fn name(&self) -> &str {
        "string"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        let text = arg.text();
        let conversion = if text.is_empty() && !self.allow_blank {
            Conversion::incomplete(arg.clone(), "")
        } else {
            Conversion::valid(TypedValue::String(text), arg.clone())
        };
        Box::pin(async move { conversion })
    }

    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        if self.allow_blank {
            TypeSpec::inline("string", json!({ "allowBlank": true }))
        } else {
            TypeSpec::named("string")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Location, context::Environment};
    use cmdline_contract::Status;
    use cmdline_lexer::tokenize;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_text_is_incomplete_unless_blank_allowed() {
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let arg = ParamArg::Single(tokenize("x \"\"")[1].clone());
        assert_eq!(block_on(StringType::default().parse(&arg, &context)).status(), Status::Incomplete);
        let blank = block_on(StringType::allowing_blank().parse(&arg, &context));
        assert_eq!(blank.status(), Status::Valid);
        assert_eq!(blank.value(), Some(&TypedValue::String(String::new())));
    }

    #[test]
    fn quoted_text_round_trips() {
        let context = ExecutionContext::detached(Environment::new(), Location::Server);
        let arg = ParamArg::Single(tokenize("x 'hello world'")[1].clone());
        let conversion = block_on(StringType::default().parse(&arg, &context));
        let value = conversion.value().expect("value");
        assert_eq!(StringType::default().stringify(value, &context), "hello world");
    }
}
