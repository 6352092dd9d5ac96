use std::rc::Rc;

use cmdline_contract::Status;
use cmdline_lexer::Argument;

use crate::{
    command::{CommandArgs, ParamSpec},
    context::ExecutionContext,
    conversion::{Conversion, ParamArg, Prediction},
    error::TypeError,
    types::{Type, TypeRegistry},
    value::TypedValue,
};

/// How the typed arguments landed on one parameter.
#[derive(Debug, Clone, Default)]
pub(crate) struct Binding {
    pub(crate) arg: ParamArg,
    pub(crate) name_arg: Option<Argument>,
    pub(crate) missing_value: bool,
}

impl Binding {
    pub(crate) fn positional(arg: ParamArg) -> Self {
        Self {
            arg,
            ..Self::default()
        }
    }
}

/// One parameter of the matched command bound to its argument text, conversion and status.
#[derive(Clone)]
pub struct Assignment {
    param: Rc<ParamSpec>,
    declared: Option<Rc<dyn Type>>,
    resolved: Option<Rc<dyn Type>>,
    type_error: Option<TypeError>,
    delegate_args: Option<CommandArgs>,
    arg: ParamArg,
    name_arg: Option<Argument>,
    missing_value: bool,
    conversion: Option<Conversion>,
}

impl Assignment {
    pub(crate) fn new(param: Rc<ParamSpec>, types: &TypeRegistry, binding: Binding) -> Self {
        let (declared, type_error) = match param.param_type.resolve(types) {
            Ok(declared) => (Some(declared), None),
            Err(err) => (None, Some(err)),
        };
        let resolved = declared
            .clone()
            .filter(|declared| declared.as_delegate().is_none());
        Self {
            param,
            declared,
            resolved,
            type_error,
            delegate_args: None,
            arg: binding.arg,
            name_arg: binding.name_arg,
            missing_value: binding.missing_value,
            conversion: None,
        }
    }

    /// Keeps the resolved type and, when the argument is unchanged, the conversion.
    pub(crate) fn rebind(mut self, binding: Binding) -> Self {
        if self.arg != binding.arg {
            self.conversion = None;
        }
        self.arg = binding.arg;
        self.name_arg = binding.name_arg;
        self.missing_value = binding.missing_value;
        self
    }

    /// Declared parameter.
    pub fn param(&self) -> &ParamSpec {
        &self.param
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.param.name
    }

    /// Bound argument.
    pub fn arg(&self) -> &ParamArg {
        &self.arg
    }

    /// The `--name` token when the parameter was given by name.
    pub fn name_arg(&self) -> Option<&Argument> {
        self.name_arg.as_ref()
    }

    /// Concrete type, absent while a delegate is unresolved or when resolution failed.
    pub fn param_type(&self) -> Option<&Rc<dyn Type>> {
        self.resolved.as_ref()
    }

    /// Latest conversion, absent while parsing is pending.
    pub fn conversion(&self) -> Option<&Conversion> {
        self.conversion.as_ref()
    }

    /// Converted value, absent when conversion failed or is pending.
    pub fn value(&self) -> Option<&TypedValue> {
        self.conversion.as_ref().and_then(Conversion::value)
    }

    /// Whether nothing was typed for the parameter.
    pub fn is_blank(&self) -> bool {
        !self.missing_value && self.arg.is_blank()
    }

    /// Whether `--name` was typed without a value.
    pub fn is_missing_value(&self) -> bool {
        self.missing_value
    }

    /// Status of this parameter.
    pub fn status(&self) -> Status {
        if self.type_error.is_some() {
            return Status::Error;
        }
        if self.missing_value {
            return Status::Incomplete;
        }
        if self.is_blank() {
            return if self.param.required {
                Status::Incomplete
            } else {
                Status::Valid
            };
        }
        let Some(conversion) = &self.conversion else {
            return Status::Incomplete;
        };

        let mut status = conversion.status();
        if status == Status::Incomplete && self.escalates(conversion) {
            status = Status::Error;
        }
        if !self.arg.is_closed() {
            status = status.combine(Status::Incomplete);
        }
        status
    }

    /// Message explaining the status.
    pub fn message(&self) -> String {
        if let Some(err) = &self.type_error {
            return err.to_string();
        }
        let converted = self
            .conversion
            .as_ref()
            .map(|conversion| conversion.message().to_string())
            .unwrap_or_default();
        if self.missing_value {
            return format!("Value required for '--{}'.", self.param.name);
        }
        if self.is_blank() {
            return if self.param.required && converted.is_empty() {
                format!("Value required for '{}'.", self.param.name)
            } else if self.param.required {
                converted
            } else {
                String::new()
            };
        }
        converted
    }

    /// Predictions for the parameter's current text.
    pub fn predictions(&self) -> &[Prediction] {
        self.conversion
            .as_ref()
            .map(Conversion::predictions)
            .unwrap_or_default()
    }

    /// Value handed to the executor: the converted value, or for a blank optional parameter its
    /// default, the type's blank value, or null.
    pub fn effective_value(&self, context: &ExecutionContext) -> TypedValue {
        if self.is_blank() {
            if let Some(default) = &self.param.default_value {
                return default.clone();
            }
            return self
                .resolved
                .as_ref()
                .and_then(|param_type| param_type.blank_value(context))
                .unwrap_or_default();
        }
        self.value().cloned().unwrap_or_default()
    }

    fn escalates(&self, conversion: &Conversion) -> bool {
        let closed = self
            .resolved
            .as_ref()
            .is_some_and(|param_type| param_type.is_closed_domain());
        closed && !self.arg.text().trim().is_empty() && conversion.predictions().is_empty()
    }

    pub(crate) fn needs_parse(&self) -> bool {
        self.conversion.is_none() && self.resolved.is_some()
    }

    pub(crate) fn set_conversion(&mut self, conversion: Conversion) {
        self.conversion = Some(conversion);
    }

    pub(crate) fn delegate(&self) -> Option<&Rc<dyn Type>> {
        self.declared
            .as_ref()
            .filter(|declared| declared.as_delegate().is_some())
    }

    pub(crate) fn delegate_args(&self) -> Option<&CommandArgs> {
        self.delegate_args.as_ref()
    }

    pub(crate) fn set_delegate_resolution(&mut self, args: CommandArgs, outcome: Result<Rc<dyn Type>, TypeError>) {
        self.delegate_args = Some(args);
        self.conversion = None;
        match outcome {
            Ok(resolved) => {
                self.resolved = Some(resolved);
                self.type_error = None;
            }
            Err(err) => {
                self.resolved = None;
                self.type_error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Location,
        context::Environment,
        conversion::Predictions,
        types::SelectionType,
    };
    use cmdline_contract::TypeSpec;
    use cmdline_lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn context() -> ExecutionContext {
        ExecutionContext::detached(Environment::new(), Location::Server)
    }

    fn assignment(param: ParamSpec, binding: Binding) -> Assignment {
        Assignment::new(Rc::new(param), &TypeRegistry::with_builtins(), binding)
    }

    fn single(text: &str) -> ParamArg {
        ParamArg::Single(tokenize(&format!("c {text}"))[1].clone())
    }

    #[test]
    fn blank_optional_parameters_are_valid_with_defaults() {
        let limit = assignment(
            ParamSpec::new("limit", "number").default_value(10.0),
            Binding::default(),
        );
        assert_eq!(limit.status(), Status::Valid);
        assert_eq!(limit.effective_value(&context()), TypedValue::Number(10.0));

        let verbose = assignment(ParamSpec::new("verbose", "boolean"), Binding::default());
        assert_eq!(verbose.effective_value(&context()), TypedValue::Bool(false));

        let name = assignment(ParamSpec::new("name", "string"), Binding::default());
        assert_eq!(name.status(), Status::Incomplete);
        assert_eq!(name.message(), "Value required for 'name'.");
    }

    #[test]
    fn unmatched_closed_domain_text_escalates_to_error() {
        let mut name = assignment(
            ParamSpec::new("name", TypeSpec::selection(["extension", "theme"])),
            Binding::positional(single("Foo")),
        );
        name.set_conversion(Conversion::incomplete(single("Foo"), "Can't use 'Foo'."));
        assert_eq!(name.status(), Status::Error);
        assert_eq!(name.message(), "Can't use 'Foo'.");

        name.set_conversion(
            Conversion::incomplete(single("Foo"), "")
                .with_predictions(Predictions::ready(vec![Prediction::named("Foobar")])),
        );
        assert_eq!(name.status(), Status::Incomplete);
    }

    #[test]
    fn open_quotes_and_missing_values_stay_incomplete() {
        let mut text = assignment(ParamSpec::new("text", "string"), Binding::positional(single("'abc")));
        text.set_conversion(Conversion::valid("abc".into(), single("'abc")));
        assert_eq!(text.status(), Status::Incomplete);

        let named = assignment(
            ParamSpec::new("limit", "number").optional(),
            Binding {
                missing_value: true,
                ..Binding::default()
            },
        );
        assert_eq!(named.status(), Status::Incomplete);
        assert_eq!(named.message(), "Value required for '--limit'.");
    }

    #[test]
    fn unresolvable_types_are_errors() {
        let broken = assignment(ParamSpec::new("color", "color"), Binding::default());
        assert_eq!(broken.status(), Status::Error);
        assert!(!broken.needs_parse());
        let selection: Rc<dyn Type> = Rc::new(SelectionType::from_data(["a"]));
        let instance = assignment(ParamSpec::new("pick", selection), Binding::default());
        assert!(instance.needs_parse());
    }
}
