use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use cmdline_contract::TypeSpec;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ArrayType, BooleanType, DateType, DocumentHost, Highlighter, NodeListType, NodeType, NumberType,
    ResourceType, SelectionType, StringType, Type, UnionType,
};
use crate::error::TypeError;

/// Builds a parameterized type from inline spec options.
pub type TypeFactory = Rc<dyn Fn(&Map<String, Value>, &TypeRegistry) -> Result<Rc<dyn Type>, TypeError>>;

#[derive(Default)]
struct TypeRegistryState {
    instances: BTreeMap<String, Rc<dyn Type>>,
    factories: BTreeMap<String, TypeFactory>,
}

/// Shared registry of named types and type factories.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    state: Rc<RefCell<TypeRegistryState>>,
}

impl TypeRegistry {
    /// Registry without any types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with string, number, boolean, date, selection, array and union.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.install_builtins();
        registry
    }

    fn install_builtins(&self) {
        let mut state = self.state.borrow_mut();
        state.instances.insert("string".into(), Rc::new(StringType::default()));
        state.instances.insert("number".into(), Rc::new(NumberType::default()));
        state.instances.insert("boolean".into(), Rc::new(BooleanType::new()));
        state.instances.insert("date".into(), Rc::new(DateType::default()));

        state.factories.insert(
            "string".into(),
            factory(|options, _| Ok(Rc::new(StringType::from_options(options_as("string", options)?)))),
        );
        state.factories.insert(
            "number".into(),
            factory(|options, _| Ok(Rc::new(NumberType::from_options(options_as("number", options)?)))),
        );
        state.factories.insert(
            "date".into(),
            factory(|options, _| Ok(Rc::new(DateType::from_options(options_as("date", options)?)?))),
        );
        state.factories.insert(
            "selection".into(),
            factory(|options, _| Ok(Rc::new(SelectionType::from_options(options_as("selection", options)?)))),
        );
        state.factories.insert(
            "array".into(),
            factory(|options, types| Ok(Rc::new(ArrayType::from_options(options_as("array", options)?, types)?))),
        );
        state.factories.insert(
            "union".into(),
            factory(|options, types| Ok(Rc::new(UnionType::from_options(options_as("union", options)?, types)?))),
        );
    }

    /// Registers `node`, `nodelist` and `resource` backed by a host document.
    pub fn install_document_types(
        &self,
        host: Rc<dyn DocumentHost>,
        highlighter: Option<Rc<dyn Highlighter>>,
    ) -> Result<(), TypeError> {
        self.register_type(Rc::new(NodeType::new(host.clone(), highlighter.clone())))?;

        let node_list_host = host.clone();
        let node_list_highlighter = highlighter;
        self.register_factory(
            "nodelist",
            factory(move |options, _| {
                Ok(Rc::new(NodeListType::from_options(
                    node_list_host.clone(),
                    node_list_highlighter.clone(),
                    options_as("nodelist", options)?,
                )))
            }),
        )?;

        self.register_factory(
            "resource",
            factory(move |options, _| {
                Ok(Rc::new(ResourceType::from_options(host.clone(), options_as("resource", options)?)))
            }),
        )
    }

    /// Registers a type instance under its own name.
    pub fn register_type(&self, instance: Rc<dyn Type>) -> Result<(), TypeError> {
        let name = instance.name().to_string();
        let mut state = self.state.borrow_mut();
        if state.instances.contains_key(&name) {
            return Err(TypeError::DuplicateType(name));
        }
        debug!(type_name = %name, "registered type");
        state.instances.insert(name, instance);
        Ok(())
    }

    /// Registers a factory for inline specs named `name`.
    pub fn register_factory(&self, name: &str, factory: TypeFactory) -> Result<(), TypeError> {
        let mut state = self.state.borrow_mut();
        if state.factories.contains_key(name) {
            return Err(TypeError::DuplicateType(name.to_string()));
        }
        debug!(type_name = %name, "registered type factory");
        state.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Removes a type instance and a factory of the same name.
    pub fn unregister(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        state.instances.remove(name);
        state.factories.remove(name);
    }

    /// Whether a type or factory with `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        let state = self.state.borrow();
        state.instances.contains_key(name) || state.factories.contains_key(name)
    }

    /// Resolves a spec. Plain names prefer registered instances; inline specs with options prefer
    /// factories.
    pub fn resolve(&self, spec: &TypeSpec) -> Result<Rc<dyn Type>, TypeError> {
        let name = spec.name();
        let options = spec.options();
        let (instance, factory) = {
            let state = self.state.borrow();
            (state.instances.get(name).cloned(), state.factories.get(name).cloned())
        };
        match (instance, factory) {
            (Some(instance), _) if options.is_empty() => Ok(instance),
            (_, Some(factory)) => factory(&options, self),
            (Some(instance), None) => Ok(instance),
            (None, None) => Err(TypeError::UnknownType(name.to_string())),
        }
    }
}

/// Wraps a closure as a [`TypeFactory`].
pub fn factory<F>(build: F) -> TypeFactory
where
    F: Fn(&Map<String, Value>, &TypeRegistry) -> Result<Rc<dyn Type>, TypeError> + 'static,
{
    Rc::new(build)
}

/// Deserializes factory options into a typed options struct.
pub(crate) fn options_as<T: DeserializeOwned>(name: &str, options: &Map<String, Value>) -> Result<T, TypeError> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|err| TypeError::InvalidOptions {
        name: name.to_string(),
        message: err.to_string(),
    })
}
