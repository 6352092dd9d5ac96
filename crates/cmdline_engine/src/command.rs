//! Command and parameter definitions registered into the interpreter.

use std::{collections::BTreeMap, fmt, future::Future, rc::Rc};

use cmdline_contract::{CommandDescriptor, ParamDescriptor, RunAt, TypeSpec};
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::{
    context::ExecutionContext,
    error::{CommandError, RegistryError},
    types::{Type, TypeRegistry},
    value::TypedValue,
};

/// Async command executor.
pub type Executor = Rc<
    dyn Fn(CommandArgs, ExecutionContext) -> LocalBoxFuture<'static, Result<CommandOutput, CommandError>>,
>;

/// Value returned by an executor, optionally tagged with an explicit output type.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Returned value.
    pub value: TypedValue,
    /// Explicit output type; falls back to the declared return type, then the value's shape.
    pub type_name: Option<String>,
}

impl CommandOutput {
    /// Untagged output.
    pub fn new(value: TypedValue) -> Self {
        Self {
            value,
            type_name: None,
        }
    }

    /// Output tagged with `type_name`, used to pick a converter.
    pub fn typed(type_name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            value,
            type_name: Some(type_name.into()),
        }
    }
}

impl From<TypedValue> for CommandOutput {
    fn from(value: TypedValue) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommandOutput {
    fn from(value: String) -> Self {
        Self::new(TypedValue::String(value))
    }
}

impl From<&str> for CommandOutput {
    fn from(value: &str) -> Self {
        Self::new(TypedValue::String(value.to_string()))
    }
}

impl From<bool> for CommandOutput {
    fn from(value: bool) -> Self {
        Self::new(TypedValue::Bool(value))
    }
}

impl From<f64> for CommandOutput {
    fn from(value: f64) -> Self {
        Self::new(TypedValue::Number(value))
    }
}

/// Parameter-name to typed-value map handed to executors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    values: BTreeMap<String, TypedValue>,
}

impl CommandArgs {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value.
    pub fn insert(&mut self, name: impl Into<String>, value: TypedValue) {
        self.values.insert(name.into(), value);
    }

    /// Value of a parameter.
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(name)
    }

    /// String value of a parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(TypedValue::as_str)
    }

    /// Numeric value of a parameter.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(TypedValue::as_f64)
    }

    /// Boolean value of a parameter.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(TypedValue::as_bool)
    }

    /// Entries sorted by parameter name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A parameter type: a spec resolved through the type registry or a ready instance.
#[derive(Clone)]
pub enum ParamType {
    /// Resolved by name or factory.
    Spec(TypeSpec),
    /// Used as-is, for types carrying functions such as lookups or delegate resolvers.
    Instance(Rc<dyn Type>),
}

impl ParamType {
    fn is_boolean(&self) -> bool {
        match self {
            Self::Spec(spec) => spec.name() == "boolean",
            Self::Instance(instance) => instance.is_boolean(),
        }
    }

    fn is_array(&self) -> bool {
        match self {
            Self::Spec(spec) => spec.name() == "array",
            Self::Instance(instance) => instance.is_array(),
        }
    }

    /// Builds the type.
    pub fn resolve(&self, types: &TypeRegistry) -> Result<Rc<dyn Type>, crate::error::TypeError> {
        match self {
            Self::Spec(spec) => types.resolve(spec),
            Self::Instance(instance) => Ok(instance.clone()),
        }
    }
}

impl From<TypeSpec> for ParamType {
    fn from(spec: TypeSpec) -> Self {
        Self::Spec(spec)
    }
}

impl From<&str> for ParamType {
    fn from(name: &str) -> Self {
        Self::Spec(TypeSpec::named(name))
    }
}

impl From<Rc<dyn Type>> for ParamType {
    fn from(instance: Rc<dyn Type>) -> Self {
        Self::Instance(instance)
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
            Self::Instance(instance) => f.debug_tuple("Instance").field(&instance.name()).finish(),
        }
    }
}

/// Declared parameter of a command.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Name, unique within the command.
    pub name: String,
    /// Declared type.
    pub param_type: ParamType,
    /// Short description.
    pub description: String,
    /// Longer manual text.
    pub manual: Option<String>,
    /// Value used when the parameter is left out.
    pub default_value: Option<TypedValue>,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// UI clustering group. Grouped parameters are named-only.
    pub group_name: Option<String>,
    /// Omitted from hints and option markers.
    pub hidden: bool,
}

impl ParamSpec {
    /// Required parameter. Boolean parameters are optional switches defaulting to `false`.
    pub fn new(name: impl Into<String>, param_type: impl Into<ParamType>) -> Self {
        let param_type = param_type.into();
        let boolean = param_type.is_boolean();
        Self {
            name: name.into(),
            description: String::new(),
            manual: None,
            default_value: boolean.then_some(TypedValue::Bool(false)),
            required: !boolean,
            group_name: None,
            hidden: false,
            param_type,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the manual text.
    pub fn manual(mut self, manual: impl Into<String>) -> Self {
        self.manual = Some(manual.into());
        self
    }

    /// Makes the parameter optional with a default value.
    pub fn default_value(mut self, value: impl Into<TypedValue>) -> Self {
        self.default_value = Some(value.into());
        self.required = false;
        self
    }

    /// Makes the parameter optional without a default.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Hides the parameter from hints.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Whether the parameter takes arguments by position rather than `--name`.
    pub fn is_positional(&self) -> bool {
        self.group_name.is_none() && !self.param_type.is_boolean()
    }

    /// Whether the parameter is a boolean switch.
    pub fn is_switch(&self) -> bool {
        self.param_type.is_boolean()
    }

    /// Whether a positional occurrence absorbs all remaining arguments.
    pub fn is_array(&self) -> bool {
        self.param_type.is_array()
    }

    fn descriptor(&self, command_name: &str, types: &TypeRegistry) -> ParamDescriptor {
        let type_spec = match self.param_type.resolve(types) {
            Ok(resolved) => resolved.spec(command_name, &self.name),
            Err(_) => match &self.param_type {
                ParamType::Spec(spec) => spec.clone(),
                ParamType::Instance(_) => TypeSpec::remote(command_name, &self.name),
            },
        };
        ParamDescriptor {
            name: self.name.clone(),
            type_spec,
            description: self.description.clone(),
            manual: self.manual.clone(),
            default_value: self.default_value.as_ref().map(TypedValue::to_json),
            required: self.required,
            group_name: self.group_name.clone(),
            hidden: self.hidden,
        }
    }
}

/// A registrable command.
#[derive(Clone)]
pub struct CommandSpec {
    /// Space-separated name such as `addon enable`.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Longer manual text.
    pub manual: Option<String>,
    /// Parameters in declaration order.
    pub params: Vec<Rc<ParamSpec>>,
    /// Declared output type.
    pub return_type: Option<String>,
    /// Execution locality.
    pub run_at: RunAt,
    /// Omitted from listings and predictions.
    pub hidden: bool,
    /// UI hints such as `buttonId`, forwarded by spec listing only when requested.
    pub custom: BTreeMap<String, Value>,
    executor: Option<Executor>,
}

impl CommandSpec {
    /// Command without parameters or executor. Without an executor the command is a parent that
    /// only groups sub-commands.
    pub fn new(name: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.split_whitespace().collect::<Vec<_>>().join(" "),
            description: description.into(),
            manual: None,
            params: Vec::new(),
            return_type: None,
            run_at: RunAt::default(),
            hidden: false,
            custom: BTreeMap::new(),
            executor: None,
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(Rc::new(param));
        self
    }

    /// Appends a group of named-only parameters. Grouped parameters are optional.
    pub fn group(mut self, group_name: &str, params: Vec<ParamSpec>) -> Self {
        for mut param in params {
            param.group_name = Some(group_name.to_string());
            param.required = false;
            self.params.push(Rc::new(param));
        }
        self
    }

    /// Sets the manual text.
    pub fn manual(mut self, manual: impl Into<String>) -> Self {
        self.manual = Some(manual.into());
        self
    }

    /// Declares the output type.
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    /// Sets execution locality.
    pub fn run_at(mut self, run_at: RunAt) -> Self {
        self.run_at = run_at;
        self
    }

    /// Hides the command from listings.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Adds a custom property.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Sets a prebuilt executor.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the executor from an async closure.
    pub fn exec<F, Fut>(self, exec: F) -> Self
    where
        F: Fn(CommandArgs, ExecutionContext) -> Fut + 'static,
        Fut: Future<Output = Result<CommandOutput, CommandError>> + 'static,
    {
        self.executor(Rc::new(
            move |args: CommandArgs,
                  context: ExecutionContext|
                  -> LocalBoxFuture<'static, Result<CommandOutput, CommandError>> {
                Box::pin(exec(args, context))
            },
        ))
    }

    /// The executor, absent for parent commands.
    pub fn executor_fn(&self) -> Option<&Executor> {
        self.executor.as_ref()
    }

    /// Whether this command only groups sub-commands.
    pub fn is_parent(&self) -> bool {
        self.executor.is_none()
    }

    /// Looks up a parameter by name.
    pub fn find_param(&self, name: &str) -> Option<&Rc<ParamSpec>> {
        self.params.iter().find(|param| param.name == name)
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        for (index, param) in self.params.iter().enumerate() {
            if self.params[..index].iter().any(|earlier| earlier.name == param.name) {
                return Err(RegistryError::DuplicateParameter {
                    command: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serializable metadata. Only custom properties named in `custom_props` are included.
    pub fn descriptor(&self, custom_props: Option<&[String]>, types: &TypeRegistry) -> CommandDescriptor {
        let custom = custom_props
            .unwrap_or_default()
            .iter()
            .filter_map(|key| self.custom.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        CommandDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            manual: self.manual.clone(),
            params: self
                .params
                .iter()
                .map(|param| param.descriptor(&self.name, types))
                .collect(),
            return_type: self.return_type.clone(),
            run_at: self.run_at,
            hidden: self.hidden,
            is_parent: self.is_parent(),
            custom,
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("run_at", &self.run_at)
            .field("hidden", &self.hidden)
            .field("is_parent", &self.is_parent())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn addon_enable() -> CommandSpec {
        CommandSpec::new("addon   enable", "Enable an add-on")
            .param(ParamSpec::new("name", TypeSpec::selection(["extension", "theme"])))
            .group(
                "Options",
                vec![ParamSpec::new("verbose", "boolean"), ParamSpec::new("limit", "number")],
            )
            .custom("buttonId", "addon-enable")
            .custom("tooltipText", "Enable")
            .exec(|args, _context| async move {
                Ok(CommandOutput::from(format!("enabled {}", args.get_str("name").unwrap_or_default())))
            })
    }

    #[test]
    fn names_are_normalized_and_parents_have_no_executor() {
        assert_eq!(addon_enable().name, "addon enable");
        assert!(!addon_enable().is_parent());
        assert!(CommandSpec::new("addon", "Manage add-ons").is_parent());
    }

    #[test]
    fn groups_and_switches_are_named_only() {
        let spec = addon_enable();
        let name = spec.find_param("name").expect("name param");
        let verbose = spec.find_param("verbose").expect("verbose param");
        let limit = spec.find_param("limit").expect("limit param");
        assert!(name.is_positional() && name.required);
        assert!(!verbose.is_positional() && verbose.is_switch());
        assert_eq!(verbose.default_value, Some(TypedValue::Bool(false)));
        assert!(!limit.is_positional() && !limit.required);
    }

    #[test]
    fn descriptor_forwards_only_requested_custom_props() {
        let types = TypeRegistry::with_builtins();
        let spec = addon_enable();
        let bare = spec.descriptor(None, &types);
        assert!(bare.custom.is_empty());

        let requested = spec.descriptor(Some(&["buttonId".to_string(), "missing".to_string()]), &types);
        assert_eq!(requested.custom.get("buttonId"), Some(&json!("addon-enable")));
        assert_eq!(requested.custom.len(), 1);
        assert_eq!(requested.params[0].type_spec, TypeSpec::selection(["extension", "theme"]));
        assert_eq!(requested.params[1].group_name.as_deref(), Some("Options"));
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let spec = CommandSpec::new("echo", "Echo")
            .param(ParamSpec::new("text", "string"))
            .param(ParamSpec::new("text", "string"));
        assert_eq!(
            spec.validate(),
            Err(RegistryError::DuplicateParameter {
                command: "echo".into(),
                param: "text".into()
            })
        );
    }
}
