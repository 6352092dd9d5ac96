//! Command registry with change notifications.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use cmdline_contract::CommandDescriptor;
use tracing::debug;

use crate::{command::CommandSpec, error::RegistryError, types::TypeRegistry};

type Listener = Rc<dyn Fn()>;

#[derive(Default)]
struct CommandRegistryState {
    by_name: BTreeMap<String, Rc<CommandSpec>>,
    order: Vec<String>,
    next_listener: u64,
    listeners: BTreeMap<u64, Listener>,
    batch_depth: usize,
    pending: bool,
}

/// Shared command registry.
///
/// Lookup is by normalized name; listing follows registration order. Every mutation raises one
/// "commands changed" notification, or one per [`CommandRegistry::batch`].
#[derive(Clone, Default)]
pub struct CommandRegistry {
    state: Rc<RefCell<CommandRegistryState>>,
}

impl CommandRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. Fails, leaving the registry unchanged, on a duplicate name.
    pub fn register(&self, spec: CommandSpec) -> Result<(), RegistryError> {
        spec.validate()?;
        {
            let mut state = self.state.borrow_mut();
            if state.by_name.contains_key(&spec.name) {
                return Err(RegistryError::DuplicateCommand(spec.name));
            }
            debug!(command = %spec.name, params = spec.params.len(), "registered command");
            state.order.push(spec.name.clone());
            state.by_name.insert(spec.name.clone(), Rc::new(spec));
        }
        self.changed();
        Ok(())
    }

    /// Removes a command. Unknown names are ignored; returns whether a command was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let name = normalize(name);
        let removed = {
            let mut state = self.state.borrow_mut();
            let removed = state.by_name.remove(&name).is_some();
            if removed {
                state.order.retain(|registered| registered != &name);
                debug!(command = %name, "unregistered command");
            }
            removed
        };
        if removed {
            self.changed();
        }
        removed
    }

    /// Runs `mutate` and raises at most one notification for all mutations inside it.
    pub fn batch<R>(&self, mutate: impl FnOnce() -> R) -> R {
        self.state.borrow_mut().batch_depth += 1;
        let result = mutate();
        let flush = {
            let mut state = self.state.borrow_mut();
            state.batch_depth -= 1;
            state.batch_depth == 0 && std::mem::take(&mut state.pending)
        };
        if flush {
            self.notify();
        }
        result
    }

    /// Calls `listener` after every change until the returned subscription is dropped.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> CommandsSubscription {
        let mut state = self.state.borrow_mut();
        state.next_listener = state.next_listener.saturating_add(1);
        let id = state.next_listener;
        state.listeners.insert(id, Rc::new(listener));
        CommandsSubscription {
            state: Rc::downgrade(&self.state),
            id,
            active: Rc::new(Cell::new(true)),
        }
    }

    /// Command registered under `name`.
    pub fn get(&self, name: &str) -> Option<Rc<CommandSpec>> {
        self.state.borrow().by_name.get(&normalize(name)).cloned()
    }

    /// Whether a command is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.state.borrow().by_name.contains_key(&normalize(name))
    }

    /// All commands in registration order.
    pub fn commands(&self) -> Vec<Rc<CommandSpec>> {
        let state = self.state.borrow();
        state
            .order
            .iter()
            .filter_map(|name| state.by_name.get(name).cloned())
            .collect()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.state.borrow().order.len()
    }

    /// Whether no command is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transport-safe listing. Custom properties appear only when named in `custom_props`.
    pub fn get_specs(&self, custom_props: Option<&[String]>, types: &TypeRegistry) -> Vec<CommandDescriptor> {
        self.commands()
            .iter()
            .map(|spec| spec.descriptor(custom_props, types))
            .collect()
    }

    fn changed(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.batch_depth > 0 {
                state.pending = true;
                return;
            }
        }
        self.notify();
    }

    fn notify(&self) {
        let listeners = self.state.borrow().listeners.values().cloned().collect::<Vec<_>>();
        for listener in listeners {
            listener();
        }
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop-based change subscription.
#[derive(Clone)]
pub struct CommandsSubscription {
    state: Weak<RefCell<CommandRegistryState>>,
    id: u64,
    active: Rc<Cell<bool>>,
}

impl CommandsSubscription {
    /// Stops notifications if the subscription is still active.
    pub fn unsubscribe(&self) {
        if self.active.replace(false) {
            if let Some(state) = self.state.upgrade() {
                state.borrow_mut().listeners.remove(&self.id);
            }
        }
    }
}

impl Drop for CommandsSubscription {
    fn drop(&mut self) {
        if Rc::strong_count(&self.active) == 1 {
            self.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, ParamSpec};
    use pretty_assertions::assert_eq;

    fn echo(name: &str) -> CommandSpec {
        CommandSpec::new(name, "Echo text")
            .param(ParamSpec::new("text", "string"))
            .exec(|args, _context| async move { Ok(CommandOutput::from(args.get_str("text").unwrap_or_default())) })
    }

    fn counter(registry: &CommandRegistry) -> (Rc<Cell<usize>>, CommandsSubscription) {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let subscription = registry.subscribe(move || seen.set(seen.get() + 1));
        (count, subscription)
    }

    #[test]
    fn duplicate_registration_keeps_the_first_command() {
        let registry = CommandRegistry::new();
        registry.register(echo("echo")).expect("first");
        let second = CommandSpec::new("echo", "Another echo");
        assert_eq!(
            registry.register(second),
            Err(RegistryError::DuplicateCommand("echo".into()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").map(|spec| spec.description.clone()), Some("Echo text".into()));
    }

    #[test]
    fn unregister_of_unknown_name_is_a_silent_no_op() {
        let registry = CommandRegistry::new();
        let (count, _subscription) = counter(&registry);
        assert!(!registry.unregister("missing"));
        assert_eq!(count.get(), 0);

        registry.register(echo("addon  list")).expect("register");
        assert!(registry.unregister("addon list"));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn batch_raises_one_notification() {
        let registry = CommandRegistry::new();
        let (count, _subscription) = counter(&registry);
        registry.batch(|| {
            registry.register(CommandSpec::new("addon", "Manage add-ons")).expect("parent");
            registry.register(echo("addon list")).expect("child");
            registry.unregister("addon");
        });
        assert_eq!(count.get(), 1);
        assert_eq!(
            registry.commands().iter().map(|spec| spec.name.clone()).collect::<Vec<_>>(),
            vec!["addon list".to_string()]
        );
    }

    #[test]
    fn dropping_the_subscription_stops_notifications() {
        let registry = CommandRegistry::new();
        let (count, subscription) = counter(&registry);
        registry.register(echo("a")).expect("a");
        drop(subscription);
        registry.register(echo("b")).expect("b");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn specs_strip_executors_and_keep_order() {
        let registry = CommandRegistry::new();
        registry.register(echo("zeta")).expect("zeta");
        registry
            .register(CommandSpec::new("alpha", "Parent").custom("buttonId", "alpha-button"))
            .expect("alpha");
        let types = TypeRegistry::with_builtins();
        let specs = registry.get_specs(Some(&["buttonId".to_string()]), &types);
        assert_eq!(
            specs.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
            vec!["zeta", "alpha"]
        );
        assert!(specs[1].is_parent);
        assert_eq!(specs[1].custom.get("buttonId"), Some(&serde_json::json!("alpha-button")));
    }
}
