use std::rc::Rc;

use cmdline_contract::TypeSpec;

use super::{Type, TypeFuture, TypeRegistry};
use crate::{
    command::CommandArgs,
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    error::TypeError,
};

/// What a delegate resolver can see when choosing the real type.
#[derive(Clone, Copy)]
pub struct DelegateContext<'a> {
    /// Command owning the parameter.
    pub command_name: &'a str,
    /// Parameter being resolved.
    pub param_name: &'a str,
    /// Values already converted for the other parameters.
    pub args: &'a CommandArgs,
    /// Registry for resolving type specs.
    pub types: &'a TypeRegistry,
}

/// Picks a concrete type from the surrounding command.
pub type DelegateResolver = Rc<dyn Fn(&DelegateContext<'_>) -> Result<Rc<dyn Type>, TypeError>>;

/// Placeholder whose real type is chosen once the command and the other arguments are known.
///
/// The requisition resolves it before parsing and keeps the result while the other arguments are
/// unchanged. Parsing the placeholder itself always fails.
#[derive(Clone)]
pub struct DelegateType {
    resolver: DelegateResolver,
}

impl DelegateType {
    /// Delegate using `resolver`.
    pub fn new(resolver: impl Fn(&DelegateContext<'_>) -> Result<Rc<dyn Type>, TypeError> + 'static) -> Self {
        Self {
            resolver: Rc::new(resolver),
        }
    }

    /// Runs the resolver. A resolver answering with another delegate is an error.
    pub fn resolve(&self, context: &DelegateContext<'_>) -> Result<Rc<dyn Type>, TypeError> {
        let resolved = (self.resolver)(context)?;
        if resolved.as_delegate().is_some() {
            return Err(TypeError::UnresolvedDelegate {
                command: context.command_name.to_string(),
                param: context.param_name.to_string(),
            });
        }
        Ok(resolved)
    }
}

impl Type for DelegateType {
    fn name(&self) -> &str {
        "delegate"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, _context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        Box::pin(async move { Conversion::error(arg.clone(), "The type of this parameter is not known yet.") })
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        TypeSpec::remote(command_name, param_name)
    }

    fn as_delegate(&self) -> Option<&DelegateType> {
        Some(self)
    }
}
