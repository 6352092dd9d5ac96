//! Client-side proxies: commands and types whose behavior lives behind a [`RequisitionFront`].

use std::{cell::RefCell, rc::Rc};

use cmdline_contract::{BridgeEvent, CommandDescriptor, ExecOutput, ParamDescriptor, Status, TypeSpec};
use cmdline_engine::{
    types::{factory, LookupEntry, Type, TypeFuture, TypeRegistry},
    CommandError, CommandOutput, CommandSpec, Conversion, ExecutionContext, ParamArg, ParamSpec, Prediction,
    Predictions, System, TypeError, TypedValue,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{error::BridgeError, front::RequisitionFront};

/// Options of the `remote` type factory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOptions {
    /// Command owning the parameter on the server.
    pub command_name: String,
    /// Parameter whose type is consulted.
    pub param_name: String,
}

/// Type that asks the server to parse, step and enumerate values of one parameter.
///
/// Valid input converts to its own text; the server holds the real value.
pub struct RemoteType {
    front: Rc<RequisitionFront>,
    command_name: String,
    param_name: String,
}

impl RemoteType {
    /// Remote type for the parameter named in `options`.
    pub fn new(front: Rc<RequisitionFront>, options: RemoteOptions) -> Self {
        Self {
            front,
            command_name: options.command_name,
            param_name: options.param_name,
        }
    }
}

impl Type for RemoteType {
    fn name(&self) -> &str {
        "remote"
    }

    fn parse<'a>(&'a self, arg: &'a ParamArg, context: &'a ExecutionContext) -> TypeFuture<'a, Conversion> {
        Box::pin(async move {
            let reply = match self.front.parse_type(context.typed(), &self.param_name).await {
                Ok(reply) => reply,
                Err(err) => {
                    debug!(param = %self.param_name, error = %err, "remote parse unavailable");
                    return Conversion::incomplete(arg.clone(), err.to_string());
                }
            };
            let conversion = match reply.status {
                Status::Valid => Conversion::valid(TypedValue::String(arg.text()), arg.clone()),
                Status::Incomplete => Conversion::incomplete(arg.clone(), reply.message),
                Status::Error => Conversion::error(arg.clone(), reply.message),
            };
            let predictions = reply.predictions.into_iter().map(Prediction::named).collect();
            conversion.with_predictions(Predictions::ready(predictions))
        })
    }

    fn increment<'a>(
        &'a self,
        _value: Option<&'a TypedValue>,
        context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async move {
            match self.front.increment_type(context.typed(), &self.param_name).await {
                Ok(text) => text.map(TypedValue::String),
                Err(err) => {
                    debug!(param = %self.param_name, error = %err, "remote increment failed");
                    None
                }
            }
        })
    }

    fn decrement<'a>(
        &'a self,
        _value: Option<&'a TypedValue>,
        context: &'a ExecutionContext,
    ) -> TypeFuture<'a, Option<TypedValue>> {
        Box::pin(async move {
            match self.front.decrement_type(context.typed(), &self.param_name).await {
                Ok(text) => text.map(TypedValue::String),
                Err(err) => {
                    debug!(param = %self.param_name, error = %err, "remote decrement failed");
                    None
                }
            }
        })
    }

    fn lookup<'a>(&'a self, _context: &'a ExecutionContext) -> TypeFuture<'a, Result<Vec<LookupEntry>, TypeError>> {
        Box::pin(async move {
            let items = self
                .front
                .selection_lookup(&self.command_name, &self.param_name)
                .await
                .map_err(|err| TypeError::Remote(err.to_string()))?;
            Ok(items.into_iter().map(|item| LookupEntry::named(item.name)).collect())
        })
    }

    fn data<'a>(&'a self, _context: &'a ExecutionContext) -> TypeFuture<'a, Result<Value, TypeError>> {
        Box::pin(async move {
            self.front
                .selection_data(&self.command_name, &self.param_name)
                .await
                .map_err(|err| TypeError::Remote(err.to_string()))
        })
    }

    fn spec(&self, _command_name: &str, _param_name: &str) -> TypeSpec {
        TypeSpec::remote(&self.command_name, &self.param_name)
    }
}

/// Registers the `remote` factory on `types`, replacing a previous one.
pub fn install_remote_type(types: &TypeRegistry, front: Rc<RequisitionFront>) -> Result<(), TypeError> {
    types.unregister("remote");
    types.register_factory(
        "remote",
        factory(move |options, _| {
            let options: RemoteOptions =
                serde_json::from_value(Value::Object(options.clone())).map_err(|err| TypeError::InvalidOptions {
                    name: "remote".to_string(),
                    message: err.to_string(),
                })?;
            Ok(Rc::new(RemoteType::new(front.clone(), options)))
        }),
    )
}

/// Proxy commands mirrored from a server into a local [`System`].
pub struct RemoteCommands {
    system: System,
    front: Rc<RequisitionFront>,
    registered: RefCell<Vec<String>>,
}

/// Installs the `remote` type into `system` and registers a proxy for every server command.
///
/// # Errors
///
/// Returns an error when the server's command listing cannot be fetched.
pub async fn connect_front(system: System, front: Rc<RequisitionFront>) -> Result<RemoteCommands, BridgeError> {
    install_remote_type(system.types(), front.clone())?;
    let remote = RemoteCommands {
        system,
        front,
        registered: RefCell::new(Vec::new()),
    };
    remote.refresh().await?;
    Ok(remote)
}

impl RemoteCommands {
    /// Front the proxies forward to.
    pub fn front(&self) -> &Rc<RequisitionFront> {
        &self.front
    }

    /// Names of the proxies currently registered.
    pub fn registered(&self) -> Vec<String> {
        self.registered.borrow().clone()
    }

    /// Refetches the server listing and replaces every proxy in one registry change.
    ///
    /// Commands already registered locally under the same name are left alone. Returns the number
    /// of proxies registered.
    pub async fn refresh(&self) -> Result<usize, BridgeError> {
        let custom_props = self.system.config().custom_props.clone();
        let descriptors = self.front.specs(Some(custom_props.as_slice())).await?;
        let commands = self.system.commands();
        let previous = std::mem::take(&mut *self.registered.borrow_mut());

        let registered = commands.batch(|| {
            for name in &previous {
                commands.unregister(name);
            }
            let mut registered = Vec::new();
            for descriptor in descriptors {
                let name = descriptor.name.clone();
                if commands.contains(&name) {
                    warn!(command = %name, "local command shadows remote command");
                    continue;
                }
                match commands.register(self.proxy(descriptor)) {
                    Ok(()) => registered.push(name),
                    Err(err) => warn!(command = %name, error = %err, "could not register remote command"),
                }
            }
            registered
        });

        debug!(commands = registered.len(), "refreshed remote commands");
        let count = registered.len();
        *self.registered.borrow_mut() = registered;
        Ok(count)
    }

    /// Refreshes the proxies on every change event until the server goes away.
    pub async fn watch(&self) -> Result<(), BridgeError> {
        while let Some(event) = self.front.next_event().await {
            match event {
                BridgeEvent::CommandsChanged => {
                    self.refresh().await?;
                }
            }
        }
        debug!("remote event stream ended");
        Ok(())
    }

    /// Unregisters every proxy.
    pub fn detach(&self) {
        let names = std::mem::take(&mut *self.registered.borrow_mut());
        let commands = self.system.commands();
        commands.batch(|| {
            for name in &names {
                commands.unregister(name);
            }
        });
    }

    fn proxy(&self, descriptor: CommandDescriptor) -> CommandSpec {
        let CommandDescriptor {
            name,
            description,
            manual,
            params,
            return_type,
            run_at,
            hidden,
            is_parent,
            custom,
        } = descriptor;

        let mut spec = CommandSpec::new(&name, description).run_at(run_at);
        spec.manual = manual;
        spec.return_type = return_type;
        spec.hidden = hidden;
        spec.custom = custom;
        for param in params {
            spec = spec.param(proxy_param(param));
        }
        if is_parent {
            return spec;
        }

        let front = self.front.clone();
        spec.exec(move |_args, context| {
            let front = front.clone();
            async move {
                let output = front
                    .execute(context.typed())
                    .await
                    .map_err(|err| CommandError::new(err.to_string()))?;
                forwarded_output(output)
            }
        })
    }
}

fn proxy_param(descriptor: ParamDescriptor) -> ParamSpec {
    let ParamDescriptor {
        name,
        type_spec,
        description,
        manual,
        default_value,
        required,
        group_name,
        hidden,
    } = descriptor;

    let mut param = ParamSpec::new(name, type_spec).description(description);
    param.manual = manual;
    param.default_value = default_value.map(TypedValue::from_json);
    param.required = required;
    param.group_name = group_name;
    param.hidden = hidden;
    param
}

fn forwarded_output(output: ExecOutput) -> Result<CommandOutput, CommandError> {
    if output.is_error {
        return Err(CommandError::remote(output.data));
    }
    let value = TypedValue::from_json(output.data);
    if output.type_name.is_empty() {
        Ok(CommandOutput::new(value))
    } else {
        Ok(CommandOutput::typed(output.type_name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actor::RequisitionActor, transport::LoopbackTransport};
    use cmdline_engine::{types::SelectionType, Environment, Requisition};
    use futures::{executor::block_on, FutureExt};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        server: System,
        client: System,
        remote: RemoteCommands,
    }

    fn fixture() -> Fixture {
        let server = System::default();
        let addons: Rc<dyn Type> = Rc::new(
            SelectionType::with_lookup(|_context| async {
                Ok(vec![LookupEntry::named("Adblock"), LookupEntry::named("Cookies")])
            })
            .named("addon"),
        );
        let commands = server.commands();
        commands
            .register(CommandSpec::new("addon", "Manage add-ons").custom("buttonId", "addons"))
            .expect("addon");
        commands
            .register(
                CommandSpec::new("addon enable", "Enable an add-on")
                    .param(ParamSpec::new("name", addons))
                    .exec(|args, _context| async move {
                        Ok(format!("{} enabled", args.get_str("name").unwrap_or_default()).into())
                    }),
            )
            .expect("addon enable");
        commands
            .register(
                CommandSpec::new("fail", "")
                    .exec(|_args, _context| async { Err(CommandError::new("nope")) }),
            )
            .expect("fail");

        let actor = Rc::new(RequisitionActor::new(server.clone(), Environment::new()));
        let front = Rc::new(RequisitionFront::new(Rc::new(LoopbackTransport::new(actor))));
        let client = System::default();
        let remote = block_on(connect_front(client.clone(), front)).expect("connect");
        Fixture { server, client, remote }
    }

    #[test]
    fn proxies_mirror_server_commands() {
        let Fixture { client, remote, .. } = fixture();
        assert_eq!(remote.registered(), vec!["addon", "addon enable", "fail"]);
        let enable = client.command("addon enable").expect("proxy");
        assert_eq!(
            enable.params[0].param_type.resolve(client.types()).expect("remote").spec("addon enable", "name"),
            TypeSpec::remote("addon enable", "name")
        );
        assert!(client.command("addon").expect("parent").is_parent());
    }

    #[test]
    fn client_requisition_asks_the_server() {
        let Fixture { client, .. } = fixture();
        let requisition = Requisition::new(client, Environment::new());

        assert_eq!(block_on(requisition.update("addon enable Foo")), Status::Error);
        assert_eq!(requisition.message(), "Can't use 'Foo'.");

        assert_eq!(block_on(requisition.update("addon enable ")), Status::Incomplete);
        let name = requisition.assignment("name").expect("name");
        let predictions: Vec<_> = name.predictions().iter().map(|prediction| prediction.name.clone()).collect();
        assert_eq!(predictions, vec!["Adblock", "Cookies"]);
    }

    #[test]
    fn execution_is_forwarded() {
        let Fixture { client, .. } = fixture();
        let requisition = Requisition::new(client, Environment::new());

        let output = block_on(requisition.update_exec("addon enable Cookies"));
        assert!(!output.is_error);
        assert_eq!(output.data, TypedValue::String("Cookies enabled".into()));

        let failed = block_on(requisition.update_exec("fail"));
        assert!(failed.is_error);
        assert_eq!(failed.data.to_json(), json!("nope"));
    }

    #[test]
    fn remote_type_lookups_reach_the_server() {
        let Fixture { client, .. } = fixture();
        let requisition = Requisition::new(client.clone(), Environment::new());
        let remote_type = client.param_type("addon enable", "name").expect("remote type");
        let entries = block_on(remote_type.lookup(&requisition.execution_context())).expect("lookup");
        let names: Vec<_> = entries.into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, vec!["Adblock", "Cookies"]);
    }

    #[test]
    fn server_changes_refresh_the_proxies() {
        let Fixture { server, client, remote } = fixture();
        let mut watching = Box::pin(remote.watch());
        assert!(watching.as_mut().now_or_never().is_none());

        server
            .commands()
            .register(CommandSpec::new("late", "").exec(|_args, _context| async { Ok("ok".into()) }))
            .expect("late");
        assert!(watching.as_mut().now_or_never().is_none());
        assert!(client.commands().contains("late"));

        server.commands().unregister("fail");
        assert!(watching.as_mut().now_or_never().is_none());
        assert!(!client.commands().contains("fail"));
        drop(watching);
        assert_eq!(remote.registered(), vec!["addon", "addon enable", "late"]);

        remote.detach();
        assert!(client.commands().is_empty());
    }

    #[test]
    fn local_commands_win_over_remote_ones() {
        let Fixture { client, remote, .. } = fixture();
        remote.detach();
        client
            .commands()
            .register(CommandSpec::new("fail", "local").exec(|_args, _context| async { Ok("fine".into()) }))
            .expect("local fail");
        assert_eq!(block_on(remote.refresh()), Ok(2));
        assert_eq!(client.command("fail").expect("fail").description, "local");
    }

    #[test]
    fn malformed_remote_options_are_rejected() {
        let types = TypeRegistry::with_builtins();
        let front = Rc::new(RequisitionFront::new(Rc::new(crate::transport::NoopTransport)));
        install_remote_type(&types, front).expect("install");
        let err = types.resolve(&TypeSpec::inline("remote", json!({ "commandName": "x" }))).err();
        assert!(matches!(err, Some(TypeError::InvalidOptions { .. })));
    }
}
