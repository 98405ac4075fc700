//! HTTP/2 session layer.
//!
//! - [`SessionRegistry`]: one active session per origin, stale sessions after GOAWAY
//! - [`SessionHandle`]: a shared session with its reference count
//! - [`H2Connector`]: the `http2`-backed transport
//! - [`push`]: server push dispatch

pub mod connector;
pub mod handle;
pub mod options;
pub mod push;
pub mod registry;
pub mod transport;

pub use connector::H2Connector;
pub use handle::{SessionControl, SessionHandle};
pub use options::{PreconnectedSocket, SessionOptions};
pub use push::{PushEvent, PushHandler, PushedRequest, PushedResponse, PushedStream};
pub use registry::{SessionLease, SessionRegistry};
pub use transport::{SessionConnector, SessionEvent, SessionTransport};
