//! Server side of the bridge: one requisition answering remote operations.

use std::{cell::RefCell, rc::Rc};

use cmdline_contract::{
    BridgeEvent, BridgeFault, BridgeFaultCode, BridgeFrame, BridgeOp, BridgeReply, ParseTypeReply, RequestId,
    SelectionLookupItem,
};
use cmdline_engine::{CommandsSubscription, Environment, Requisition, RequisitionError, System, TypeError};
use futures::{channel::mpsc, lock::Mutex};
use tracing::{debug, warn};

type EventSenders = Rc<RefCell<Vec<mpsc::UnboundedSender<BridgeEvent>>>>;

/// Runs bridge operations against a requisition owned by this actor.
///
/// Operations are serialized: each one updates the requisition and reads it back before the next
/// one starts. Registry changes are pushed to every [`RequisitionActor::events`] stream.
pub struct RequisitionActor {
    system: System,
    requisition: Requisition,
    serial: Mutex<()>,
    listeners: EventSenders,
    subscription: RefCell<Option<CommandsSubscription>>,
}

impl RequisitionActor {
    /// Actor over a fresh requisition in `system`.
    pub fn new(system: System, environment: Environment) -> Self {
        let listeners = EventSenders::default();
        let forward = listeners.clone();
        let subscription = system.commands().subscribe(move || {
            forward
                .borrow_mut()
                .retain(|sender| sender.unbounded_send(BridgeEvent::CommandsChanged).is_ok());
        });
        let requisition = Requisition::new(system.clone(), environment);
        Self {
            system,
            requisition,
            serial: Mutex::new(()),
            listeners,
            subscription: RefCell::new(Some(subscription)),
        }
    }

    /// System the actor serves.
    pub fn system(&self) -> &System {
        &self.system
    }

    /// Requisition driven by remote calls.
    pub fn requisition(&self) -> &Requisition {
        &self.requisition
    }

    /// New stream of change notifications. Ends when the actor is destroyed.
    pub fn events(&self) -> mpsc::UnboundedReceiver<BridgeEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.listeners.borrow_mut().push(sender);
        receiver
    }

    /// Runs one operation.
    ///
    /// # Errors
    ///
    /// Returns a fault when the operation names an unknown command or parameter, or when a
    /// selection lookup fails. Failing commands are not faults; they produce error outputs.
    pub async fn handle(&self, op: BridgeOp) -> Result<BridgeReply, BridgeFault> {
        let _serial = self.serial.lock().await;
        let name = op.name();
        debug!(op = name, "bridge request");
        let reply = self.dispatch(op).await;
        if let Err(fault) = &reply {
            warn!(op = name, code = ?fault.code, message = %fault.message, "bridge request failed");
        }
        reply
    }

    /// Decodes a request frame, runs it and encodes the reply or fault frame.
    pub async fn handle_frame(&self, text: &str) -> String {
        let (id, answer) = match BridgeFrame::decode(text) {
            Ok(BridgeFrame::Request { id, call }) => (id, self.handle(call).await),
            Ok(_) => (
                RequestId(0),
                Err(BridgeFault::new(BridgeFaultCode::Protocol, "expected a request frame")),
            ),
            Err(err) => (RequestId(0), Err(BridgeFault::new(BridgeFaultCode::Protocol, err.to_string()))),
        };
        let frame = match answer {
            Ok(reply) => BridgeFrame::Reply { id, reply },
            Err(fault) => BridgeFrame::Fault { id, fault },
        };
        frame.encode().unwrap_or_else(|err| {
            warn!(error = %err, "could not encode bridge reply");
            let fault = BridgeFault::new(BridgeFaultCode::Protocol, err.to_string());
            BridgeFrame::Fault { id, fault }.encode().unwrap_or_default()
        })
    }

    /// Stops change notifications and ends every event stream.
    pub fn destroy(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
        self.listeners.borrow_mut().clear();
        debug!("requisition actor destroyed");
    }

    async fn dispatch(&self, op: BridgeOp) -> Result<BridgeReply, BridgeFault> {
        let requisition = &self.requisition;
        match op {
            BridgeOp::Specs { custom_props } => Ok(BridgeReply::Specs(self.system.specs(custom_props.as_deref()))),
            BridgeOp::Execute { typed } => Ok(BridgeReply::Execute(requisition.update_exec(&typed).await.to_json())),
            BridgeOp::State { typed, start, rank } => {
                requisition.update(&typed).await;
                Ok(BridgeReply::State(requisition.state_data(start, rank)))
            }
            BridgeOp::ParseType { typed, param } => {
                requisition.update(&typed).await;
                let assignment = requisition.require_assignment(&param).map_err(requisition_fault)?;
                Ok(BridgeReply::ParseType(ParseTypeReply {
                    status: assignment.status(),
                    message: assignment.message(),
                    predictions: assignment
                        .predictions()
                        .iter()
                        .map(|prediction| prediction.name.clone())
                        .collect(),
                }))
            }
            BridgeOp::IncrementType { typed, param } => {
                requisition.update(&typed).await;
                let text = requisition.increment(&param).await.map_err(requisition_fault)?;
                Ok(BridgeReply::IncrementType(text))
            }
            BridgeOp::DecrementType { typed, param } => {
                requisition.update(&typed).await;
                let text = requisition.decrement(&param).await.map_err(requisition_fault)?;
                Ok(BridgeReply::DecrementType(text))
            }
            BridgeOp::GetSelectionLookup {
                command_name,
                param_name,
            } => {
                let param_type = self
                    .system
                    .param_type(&command_name, &param_name)
                    .map_err(requisition_fault)?;
                let context = requisition.execution_context();
                let entries = param_type.lookup(&context).await.map_err(type_fault)?;
                Ok(BridgeReply::SelectionLookup(
                    entries
                        .into_iter()
                        .map(|entry| SelectionLookupItem { name: entry.name })
                        .collect(),
                ))
            }
            BridgeOp::GetSelectionData {
                command_name,
                param_name,
            } => {
                let param_type = self
                    .system
                    .param_type(&command_name, &param_name)
                    .map_err(requisition_fault)?;
                let context = requisition.execution_context();
                let data = param_type.data(&context).await.map_err(type_fault)?;
                Ok(BridgeReply::SelectionData(data))
            }
        }
    }
}

fn requisition_fault(err: RequisitionError) -> BridgeFault {
    let code = match &err {
        RequisitionError::NoSuchCommand(_) => BridgeFaultCode::NoSuchCommand,
        RequisitionError::NoSuchParameter { .. } => BridgeFaultCode::NoSuchParameter,
        RequisitionError::Detached => BridgeFaultCode::Disconnected,
        RequisitionError::Type(_) => BridgeFaultCode::Protocol,
    };
    BridgeFault::new(code, err.to_string())
}

fn type_fault(err: TypeError) -> BridgeFault {
    BridgeFault::new(BridgeFaultCode::Protocol, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdline_contract::{Status, TypeSpec};
    use cmdline_engine::{
        types::{LookupEntry, SelectionType, Type},
        CommandSpec, ParamSpec, TypedValue,
    };
    use futures::{executor::block_on, StreamExt};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn actor() -> RequisitionActor {
        let system = System::default();
        let addons: Rc<dyn Type> = Rc::new(
            SelectionType::with_lookup(|_context| async {
                Ok(vec![LookupEntry::named("Adblock"), LookupEntry::named("Cookies")])
            })
            .named("addon"),
        );
        let commands = system.commands();
        commands.register(CommandSpec::new("addon", "Manage add-ons")).expect("addon");
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
                CommandSpec::new("volume", "")
                    .param(ParamSpec::new("level", TypeSpec::inline("number", json!({ "min": 0, "max": 10 }))))
                    .exec(|_args, _context| async { Ok(TypedValue::Null.into()) }),
            )
            .expect("volume");
        RequisitionActor::new(system, Environment::new())
    }

    #[test]
    fn execute_updates_then_runs() {
        let actor = actor();
        let reply = block_on(actor.handle(BridgeOp::Execute {
            typed: "addon enable Cookies".into(),
        }));
        let Ok(BridgeReply::Execute(output)) = reply else {
            panic!("expected an execute reply");
        };
        assert_eq!(output.data, json!("Cookies enabled"));
        assert!(!output.is_error);

        let reply = block_on(actor.handle(BridgeOp::Execute {
            typed: "addon enable Foo".into(),
        }));
        let Ok(BridgeReply::Execute(output)) = reply else {
            panic!("expected an execute reply");
        };
        assert!(output.is_error);
    }

    #[test]
    fn parse_type_reports_one_parameter() {
        let actor = actor();
        let reply = block_on(actor.handle(BridgeOp::ParseType {
            typed: "addon enable ".into(),
            param: "name".into(),
        }));
        assert_eq!(
            reply,
            Ok(BridgeReply::ParseType(ParseTypeReply {
                status: Status::Incomplete,
                message: "Value required for 'name'.".into(),
                predictions: vec!["Adblock".into(), "Cookies".into()],
            }))
        );

        let missing = block_on(actor.handle(BridgeOp::ParseType {
            typed: "addon enable ".into(),
            param: "colour".into(),
        }));
        assert_eq!(missing.map_err(|fault| fault.code), Err(BridgeFaultCode::NoSuchParameter));
    }

    #[test]
    fn stepping_returns_the_new_argument_text() {
        let actor = actor();
        let reply = block_on(actor.handle(BridgeOp::IncrementType {
            typed: "volume 9".into(),
            param: "level".into(),
        }));
        assert_eq!(reply, Ok(BridgeReply::IncrementType(Some("10".into()))));
        assert_eq!(actor.requisition().typed(), "volume 10");

        let reply = block_on(actor.handle(BridgeOp::DecrementType {
            typed: "addon enable Adblock".into(),
            param: "name".into(),
        }));
        assert_eq!(reply, Ok(BridgeReply::DecrementType(Some("Adblock".into()))));
    }

    #[test]
    fn selection_lookups_strip_values() {
        let actor = actor();
        let reply = block_on(actor.handle(BridgeOp::GetSelectionLookup {
            command_name: "addon enable".into(),
            param_name: "name".into(),
        }));
        assert_eq!(
            reply,
            Ok(BridgeReply::SelectionLookup(vec![
                SelectionLookupItem { name: "Adblock".into() },
                SelectionLookupItem { name: "Cookies".into() },
            ]))
        );

        let unknown = block_on(actor.handle(BridgeOp::GetSelectionData {
            command_name: "addon frobnicate".into(),
            param_name: "name".into(),
        }));
        assert_eq!(unknown.map_err(|fault| fault.code), Err(BridgeFaultCode::NoSuchCommand));
    }

    #[test]
    fn registry_changes_reach_event_streams_until_destroyed() {
        let actor = actor();
        let mut events = actor.events();
        actor
            .system()
            .commands()
            .register(CommandSpec::new("late", "").exec(|_args, _context| async { Ok("ok".into()) }))
            .expect("late");
        assert_eq!(block_on(events.next()), Some(BridgeEvent::CommandsChanged));

        actor.destroy();
        actor.system().commands().unregister("late");
        assert_eq!(block_on(events.next()), None);
    }

    #[test]
    fn malformed_frames_become_protocol_faults() {
        let actor = actor();
        let answer = block_on(actor.handle_frame("not json"));
        let Ok(BridgeFrame::Fault { id, fault }) = BridgeFrame::decode(&answer) else {
            panic!("expected a fault frame, got {answer}");
        };
        assert_eq!(id, RequestId(0));
        assert_eq!(fault.code, BridgeFaultCode::Protocol);
    }
}
