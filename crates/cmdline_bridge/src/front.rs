//! Client side of the bridge.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use cmdline_contract::{
    BridgeEvent, BridgeFrame, BridgeOp, BridgeReply, CommandDescriptor, ExecOutput, ParseTypeReply, RequestId,
    SelectionLookupItem, StateData,
};
use futures::{
    lock::Mutex,
    stream::{LocalBoxStream, StreamExt},
    FutureExt,
};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{error::BridgeError, transport::Transport};

struct CachedSpecs {
    custom_props: Option<Vec<String>>,
    specs: Vec<CommandDescriptor>,
}

/// Proxy for a remote [`crate::RequisitionActor`].
///
/// Every call carries a fresh request id. A `state` reply, or a `parseType` reply for some
/// parameter, that arrives after a newer call of the same kind was issued is dropped with
/// [`BridgeError::Superseded`]. Specs are cached until the actor reports a registry change.
pub struct RequisitionFront {
    transport: Rc<dyn Transport>,
    next_id: Cell<u64>,
    latest: RefCell<BTreeMap<String, u64>>,
    specs: RefCell<Option<CachedSpecs>>,
    events: Mutex<Option<LocalBoxStream<'static, String>>>,
}

impl RequisitionFront {
    /// Front over `transport`, taking its event stream.
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        let events = transport.events();
        Self {
            transport,
            next_id: Cell::new(0),
            latest: RefCell::new(BTreeMap::new()),
            specs: RefCell::new(None),
            events: Mutex::new(events),
        }
    }

    /// Sends one operation and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Fault`] when the actor rejects the call, [`BridgeError::Superseded`]
    /// for stale replies and transport or protocol errors otherwise.
    pub async fn call(&self, op: BridgeOp) -> Result<BridgeReply, BridgeError> {
        let id = self.next_id.get().wrapping_add(1);
        self.next_id.set(id);
        let name = op.name();
        let sequence = sequence_key(&op);
        if let Some(key) = &sequence {
            self.latest.borrow_mut().insert(key.clone(), id);
        }

        let request = BridgeFrame::Request {
            id: RequestId(id),
            call: op,
        }
        .encode()?;
        trace!(op = name, id, "bridge call");
        let answer = self.transport.request(request).await?;
        let reply = match BridgeFrame::decode(&answer)? {
            BridgeFrame::Reply {
                id: RequestId(answered),
                reply,
            } if answered == id => reply,
            BridgeFrame::Fault {
                id: RequestId(answered),
                fault,
            } if answered == id || answered == 0 => {
                debug!(op = name, id, code = ?fault.code, "bridge call rejected");
                return Err(BridgeError::Fault(fault));
            }
            other => {
                return Err(BridgeError::Protocol(format!(
                    "unexpected answer to request {id}: {other:?}"
                )))
            }
        };

        if let Some(key) = sequence {
            if self.latest.borrow().get(&key) != Some(&id) {
                debug!(op = name, id, "dropping superseded reply");
                return Err(BridgeError::Superseded { op: name });
            }
        }
        Ok(reply)
    }

    /// Command listing, served from cache while no change was reported.
    pub async fn specs(&self, custom_props: Option<&[String]>) -> Result<Vec<CommandDescriptor>, BridgeError> {
        // A listener parked in `next_event` owns the stream, so pending changes cannot be seen here.
        if self.try_drain().is_some() {
            if let Some(cached) = self.specs.borrow().as_ref() {
                if cached.custom_props.as_deref() == custom_props {
                    return Ok(cached.specs.clone());
                }
            }
        } else {
            trace!("event stream busy, bypassing the specs cache");
        }

        let custom_props = custom_props.map(<[String]>::to_vec);
        let reply = self
            .call(BridgeOp::Specs {
                custom_props: custom_props.clone(),
            })
            .await?;
        let specs = match reply {
            BridgeReply::Specs(specs) => specs,
            other => return Err(mismatch("specs", &other)),
        };
        *self.specs.borrow_mut() = Some(CachedSpecs {
            custom_props,
            specs: specs.clone(),
        });
        Ok(specs)
    }

    /// Executes `typed` remotely.
    pub async fn execute(&self, typed: &str) -> Result<ExecOutput, BridgeError> {
        match self.call(BridgeOp::Execute { typed: typed.into() }).await? {
            BridgeReply::Execute(output) => Ok(output),
            other => Err(mismatch("execute", &other)),
        }
    }

    /// Remote requisition state for `typed` with the cursor at `start`.
    pub async fn state(&self, typed: &str, start: usize, rank: i64) -> Result<StateData, BridgeError> {
        let op = BridgeOp::State {
            typed: typed.into(),
            start,
            rank,
        };
        match self.call(op).await? {
            BridgeReply::State(state) => Ok(state),
            other => Err(mismatch("state", &other)),
        }
    }

    /// Status of one parameter for `typed`.
    pub async fn parse_type(&self, typed: &str, param: &str) -> Result<ParseTypeReply, BridgeError> {
        let op = BridgeOp::ParseType {
            typed: typed.into(),
            param: param.into(),
        };
        match self.call(op).await? {
            BridgeReply::ParseType(reply) => Ok(reply),
            other => Err(mismatch("parseType", &other)),
        }
    }

    /// Next argument text for `param`, absent when no change is possible.
    pub async fn increment_type(&self, typed: &str, param: &str) -> Result<Option<String>, BridgeError> {
        let op = BridgeOp::IncrementType {
            typed: typed.into(),
            param: param.into(),
        };
        match self.call(op).await? {
            BridgeReply::IncrementType(text) => Ok(text),
            other => Err(mismatch("incrementType", &other)),
        }
    }

    /// Previous argument text for `param`, absent when no change is possible.
    pub async fn decrement_type(&self, typed: &str, param: &str) -> Result<Option<String>, BridgeError> {
        let op = BridgeOp::DecrementType {
            typed: typed.into(),
            param: param.into(),
        };
        match self.call(op).await? {
            BridgeReply::DecrementType(text) => Ok(text),
            other => Err(mismatch("decrementType", &other)),
        }
    }

    /// Names offered by a selection parameter.
    pub async fn selection_lookup(
        &self,
        command_name: &str,
        param_name: &str,
    ) -> Result<Vec<SelectionLookupItem>, BridgeError> {
        let op = BridgeOp::GetSelectionLookup {
            command_name: command_name.into(),
            param_name: param_name.into(),
        };
        match self.call(op).await? {
            BridgeReply::SelectionLookup(items) => Ok(items),
            other => Err(mismatch("getSelectionLookup", &other)),
        }
    }

    /// Raw dataset behind a selection parameter.
    pub async fn selection_data(&self, command_name: &str, param_name: &str) -> Result<Value, BridgeError> {
        let op = BridgeOp::GetSelectionData {
            command_name: command_name.into(),
            param_name: param_name.into(),
        };
        match self.call(op).await? {
            BridgeReply::SelectionData(data) => Ok(data),
            other => Err(mismatch("getSelectionData", &other)),
        }
    }

    /// Waits for the next event. Returns `None` once the actor side is gone.
    pub async fn next_event(&self) -> Option<BridgeEvent> {
        let mut events = self.events.lock().await;
        let stream = events.as_mut()?;
        while let Some(text) = stream.next().await {
            if let Some(event) = self.accept_event(&text) {
                return Some(event);
            }
        }
        None
    }

    /// Events already delivered, without waiting.
    ///
    /// Empty while another task is waiting in [`RequisitionFront::next_event`].
    pub fn drain_events(&self) -> Vec<BridgeEvent> {
        self.try_drain().unwrap_or_default()
    }

    /// Forgets cached specs.
    pub fn invalidate_specs(&self) {
        self.specs.borrow_mut().take();
    }

    /// Closes the transport.
    pub fn disconnect(&self) {
        debug!("disconnecting requisition front");
        self.transport.close();
    }

    /// `None` when the stream is held by a waiting listener.
    fn try_drain(&self) -> Option<Vec<BridgeEvent>> {
        let mut events = self.events.try_lock()?;
        let mut drained = Vec::new();
        if let Some(stream) = events.as_mut() {
            while let Some(Some(text)) = stream.next().now_or_never() {
                drained.extend(self.accept_event(&text));
            }
        }
        Some(drained)
    }

    fn accept_event(&self, text: &str) -> Option<BridgeEvent> {
        match BridgeFrame::decode(text) {
            Ok(BridgeFrame::Event { event }) => {
                match event {
                    BridgeEvent::CommandsChanged => {
                        debug!("remote commands changed");
                        self.invalidate_specs();
                    }
                }
                Some(event)
            }
            Ok(other) => {
                warn!(frame = ?other, "ignoring non-event frame on the event stream");
                None
            }
            Err(err) => {
                warn!(error = %err, "ignoring undecodable event frame");
                None
            }
        }
    }
}

fn sequence_key(op: &BridgeOp) -> Option<String> {
    match op {
        BridgeOp::State { .. } => Some("state".to_string()),
        BridgeOp::ParseType { param, .. } => Some(format!("parseType:{param}")),
        _ => None,
    }
}

fn mismatch(expected: &str, reply: &BridgeReply) -> BridgeError {
    BridgeError::Protocol(format!("expected a `{expected}` reply, got {reply:?}"))
}
