//! Explicit handle owning one interpreter's registries.

use std::rc::Rc;

use cmdline_contract::CommandDescriptor;

use crate::{
    command::{CommandArgs, CommandSpec},
    config::SystemConfig,
    converters::ConverterRegistry,
    error::RequisitionError,
    registry::CommandRegistry,
    types::{DelegateContext, Type, TypeRegistry},
};

struct SystemInner {
    config: SystemConfig,
    types: TypeRegistry,
    commands: CommandRegistry,
    converters: ConverterRegistry,
}

/// One isolated interpreter: configuration plus its type, command and converter registries.
///
/// Clones share the registries. Separate `System` values never see each other's commands.
#[derive(Clone)]
pub struct System {
    inner: Rc<SystemInner>,
}

impl System {
    /// System with the built-in types and empty command and converter registries.
    pub fn new(config: SystemConfig) -> Self {
        Self::with_types(config, TypeRegistry::with_builtins())
    }

    /// System over a caller-prepared type registry.
    pub fn with_types(config: SystemConfig, types: TypeRegistry) -> Self {
        Self {
            inner: Rc::new(SystemInner {
                config,
                types,
                commands: CommandRegistry::new(),
                converters: ConverterRegistry::new(),
            }),
        }
    }

    /// Configuration the system was built with.
    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    /// Command registry.
    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    /// Output converter registry.
    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }

    /// Transport-safe command listing.
    pub fn specs(&self, custom_props: Option<&[String]>) -> Vec<CommandDescriptor> {
        self.inner.commands.get_specs(custom_props, &self.inner.types)
    }

    /// Registered command called `name`.
    pub fn command(&self, name: &str) -> Result<Rc<CommandSpec>, RequisitionError> {
        self.inner
            .commands
            .get(name)
            .ok_or_else(|| RequisitionError::NoSuchCommand(name.to_string()))
    }

    /// Concrete type of a parameter, independent of any typed text.
    ///
    /// Delegates are resolved as if no other argument had been typed.
    pub fn param_type(&self, command_name: &str, param_name: &str) -> Result<Rc<dyn Type>, RequisitionError> {
        let command = self.command(command_name)?;
        let param = command
            .find_param(param_name)
            .ok_or_else(|| RequisitionError::NoSuchParameter {
                command: command.name.clone(),
                param: param_name.to_string(),
            })?;
        let declared = param.param_type.resolve(&self.inner.types)?;
        let Some(delegate) = declared.as_delegate() else {
            return Ok(declared);
        };
        let args = CommandArgs::new();
        Ok(delegate.resolve(&DelegateContext {
            command_name: &command.name,
            param_name,
            args: &args,
            types: &self.inner.types,
        })?)
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::ParamSpec, error::TypeError, types::DelegateType};
    use cmdline_contract::TypeSpec;
    use pretty_assertions::assert_eq;

    #[test]
    fn systems_do_not_share_commands() {
        let first = System::default();
        let second = System::default();
        first
            .commands()
            .register(CommandSpec::new("echo", "").exec(|_args, _context| async { Ok("ok".into()) }))
            .expect("echo");
        assert!(first.command("echo").is_ok());
        assert_eq!(
            second.command("echo").err(),
            Some(RequisitionError::NoSuchCommand("echo".into()))
        );
        assert_eq!(first.clone().specs(None).len(), 1);
    }

    #[test]
    fn param_types_resolve_delegates_without_arguments() {
        let system = System::default();
        let delegate: Rc<dyn Type> = Rc::new(DelegateType::new(|context| {
            if context.args.is_empty() {
                context.types.resolve(&TypeSpec::named("number"))
            } else {
                Err(TypeError::UnknownType("unexpected".into()))
            }
        }));
        system
            .commands()
            .register(
                CommandSpec::new("pref set", "")
                    .param(ParamSpec::new("setting", "string"))
                    .param(ParamSpec::new("value", delegate))
                    .exec(|_args, _context| async { Ok("ok".into()) }),
            )
            .expect("pref set");

        assert_eq!(system.param_type("pref set", "value").expect("value").name(), "number");
        assert_eq!(system.param_type("pref set", "setting").expect("setting").name(), "string");
        assert_eq!(
            system.param_type("pref set", "missing").err(),
            Some(RequisitionError::NoSuchParameter {
                command: "pref set".into(),
                param: "missing".into()
            })
        );
    }
}
