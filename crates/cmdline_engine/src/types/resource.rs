use std::rc::Rc;

use cmdline_contract::TypeSpec;
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentHost, LookupEntry, SelectionType, Type, TypeFuture};
use crate::{
    context::ExecutionContext,
    conversion::{Conversion, ParamArg},
    error::TypeError,
    value::{ResourceKind, TypedValue},
};

/// Which document resources a `resource` parameter offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceFilter {
    /// Scripts and stylesheets.
    #[default]
    All,
    /// Scripts only.
    #[serde(alias = "scripts")]
    Script,
    /// Stylesheets only.
    #[serde(alias = "sheets")]
    Sheet,
}

impl ResourceFilter {
    fn kinds(self) -> &'static [ResourceKind] {
        match self {
            Self::All => &[ResourceKind::Script, ResourceKind::Sheet],
            Self::Script => &[ResourceKind::Script],
            Self::Sheet => &[ResourceKind::Sheet],
        }
    }
}

/// Options of the `resource` factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceOptions {
    /// Resource kinds to include.
    pub include: ResourceFilter,
}

/// Choice among the scripts and stylesheets the host document has loaded.
#[derive(Debug, Clone)]
pub struct ResourceType {
    selection: SelectionType,
}

impl ResourceType {
    /// Resource type over `host`, limited to `include`.
    pub fn new(host: Rc<dyn DocumentHost>, include: ResourceFilter) -> Self {
        let selection = SelectionType::with_lookup(move |_context| {
            let entries = include
                .kinds()
                .iter()
                .flat_map(|kind| host.resources(*kind))
                .map(|resource| LookupEntry::new(resource.name.clone(), TypedValue::Resource(resource)))
                .collect::<Vec<_>>();
            async move { Ok(entries) }
        })
        .named("resource");
        Self { selection }
    }

    pub(crate) fn from_options(host: Rc<dyn DocumentHost>, options: ResourceOptions) -> Self {
        Self::new(host, options.include)
    }
}

impl Type for ResourceType {
    fn name(&self) -> &str {
        "resource"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        self.selection.parse(arg, context)
    }

    fn stringify(&self, value: &TypedValue, context: &ExecutionContext) -> String {
        self.selection.stringify(value, context)
    }

    fn lookup<'a>(&'a self, context: &'a ExecutionContext) -> TypeFuture<'a, Result<Vec<LookupEntry>, TypeError>> {
        self.selection.lookup(context)
    }

    fn data<'a>(&'a self, context: &'a ExecutionContext) -> TypeFuture<'a, Result<Value, TypeError>> {
        self.selection.data(context)
    }

    fn spec(&self, command_name: &str, param_name: &str) -> TypeSpec {
        TypeSpec::remote(command_name, param_name)
    }

    fn is_closed_domain(&self) -> bool {
        true
    }
}
