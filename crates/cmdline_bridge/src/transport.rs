//! Frame transports between a [`crate::RequisitionFront`] and a [`crate::RequisitionActor`].

use std::{cell::RefCell, future::Future, pin::Pin, rc::Rc};

use cmdline_contract::BridgeFrame;
use futures::stream::{LocalBoxStream, StreamExt};
use tracing::{debug, trace, warn};

use crate::{actor::RequisitionActor, error::TransportError};

/// Object-safe boxed future used by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Carries encoded [`BridgeFrame`]s to the actor and back.
pub trait Transport {
    /// Sends one encoded request frame and resolves with the encoded answer frame.
    fn request<'a>(&'a self, frame: String) -> TransportFuture<'a, Result<String, TransportError>>;

    /// Encoded event frames pushed by the peer. Only the first call returns the stream.
    fn events(&self) -> Option<LocalBoxStream<'static, String>>;

    /// Releases the connection. Later requests fail with [`TransportError::Closed`].
    fn close(&self);
}

/// Transport with no peer, used until a real connection is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn request<'a>(&'a self, _frame: String) -> TransportFuture<'a, Result<String, TransportError>> {
        Box::pin(async { Err(TransportError::Unavailable("no bridge peer configured".to_string())) })
    }

    fn events(&self) -> Option<LocalBoxStream<'static, String>> {
        None
    }

    fn close(&self) {}
}

/// In-process transport that still round-trips every frame through its JSON encoding.
///
/// Closing the transport destroys the actor.
pub struct LoopbackTransport {
    actor: RefCell<Option<Rc<RequisitionActor>>>,
    events: RefCell<Option<LocalBoxStream<'static, String>>>,
}

impl LoopbackTransport {
    /// Connects to `actor`.
    pub fn new(actor: Rc<RequisitionActor>) -> Self {
        let events = actor
            .events()
            .filter_map(|event| async move {
                match (BridgeFrame::Event { event }).encode() {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!(error = %err, "dropping unencodable bridge event");
                        None
                    }
                }
            })
            .boxed_local();
        Self {
            actor: RefCell::new(Some(actor)),
            events: RefCell::new(Some(events)),
        }
    }

    /// Whether [`Transport::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.actor.borrow().is_none()
    }
}

impl Transport for LoopbackTransport {
    fn request<'a>(&'a self, frame: String) -> TransportFuture<'a, Result<String, TransportError>> {
        let actor = self.actor.borrow().clone();
        Box::pin(async move {
            let actor = actor.ok_or(TransportError::Closed)?;
            trace!(bytes = frame.len(), "loopback request");
            Ok(actor.handle_frame(&frame).await)
        })
    }

    fn events(&self) -> Option<LocalBoxStream<'static, String>> {
        self.events.borrow_mut().take()
    }

    fn close(&self) {
        if let Some(actor) = self.actor.borrow_mut().take() {
            debug!("closing loopback transport");
            actor.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdline_contract::{BridgeOp, BridgeReply, RequestId};
    use cmdline_engine::{Environment, System};
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    #[test]
    fn noop_transport_reports_unavailable() {
        assert_eq!(
            block_on(NoopTransport.request("{}".to_string())),
            Err(TransportError::Unavailable("no bridge peer configured".to_string()))
        );
        assert!(NoopTransport.events().is_none());
    }

    #[test]
    fn loopback_round_trips_frames_until_closed() {
        let actor = Rc::new(RequisitionActor::new(System::default(), Environment::new()));
        let transport = LoopbackTransport::new(actor);
        let request = BridgeFrame::Request {
            id: RequestId(7),
            call: BridgeOp::Specs { custom_props: None },
        }
        .encode()
        .expect("encode");

        let answer = block_on(transport.request(request.clone())).expect("answer");
        assert_eq!(
            BridgeFrame::decode(&answer).expect("decode"),
            BridgeFrame::Reply {
                id: RequestId(7),
                reply: BridgeReply::Specs(Vec::new())
            }
        );

        assert!(transport.events().is_some());
        assert!(transport.events().is_none());
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(block_on(transport.request(request)), Err(TransportError::Closed));
    }
}
