//! Remote bridge between a client that collects typed text and a server that owns the commands.
//!
//! A [`RequisitionActor`] answers bridge operations against a server-side requisition. A
//! [`RequisitionFront`] issues them over a [`Transport`] as JSON frames. [`connect_front`]
//! mirrors the server's commands into a client [`cmdline_engine::System`] as proxies, and
//! [`SessionCache`] shares one front between several local consumers.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod actor;
pub mod error;
pub mod front;
pub mod remote;
pub mod sessions;
pub mod transport;

pub use actor::RequisitionActor;
pub use error::{BridgeError, TransportError};
pub use front::RequisitionFront;
pub use remote::{connect_front, install_remote_type, RemoteCommands, RemoteOptions, RemoteType};
pub use sessions::{SessionCache, SessionLease};
pub use transport::{LoopbackTransport, NoopTransport, Transport, TransportFuture};
