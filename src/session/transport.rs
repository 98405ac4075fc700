use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::session::handle::SessionControl;
use crate::session::options::SessionOptions;
use crate::session::push::PushedStream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a session transport reports, in order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Connect phase finished, the session accepts streams.
    Connected,
    /// The server pushed a stream.
    Push(PushedStream),
    /// The server retired the session; open streams may still complete.
    GoAway { error_code: u32, last_stream_id: u32 },
    /// The connect phase exceeded `connect_timeout`.
    Timeout,
    Error(NetError),
    /// The transport is gone. Always the last event.
    Close,
}

/// A session transport being opened: its control surface and the event
/// channel, created before the connect starts.
pub struct SessionTransport {
    pub control: Arc<dyn SessionControl>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTransport")
            .field("destroyed", &self.control.is_destroyed())
            .finish()
    }
}

/// Opens HTTP/2 session transports.
pub trait SessionConnector: Send + Sync + 'static {
    /// Start connecting to `origin` and return immediately. Progress and
    /// failures arrive on the returned event channel.
    ///
    /// Called with the registry's map entry for `origin` locked: must not
    /// block, and must not call back into the [`SessionRegistry`]
    /// (`has_origin` and friends would deadlock).
    ///
    /// [`SessionRegistry`]: crate::session::SessionRegistry
    fn open(&self, origin: &Origin, options: &SessionOptions) -> SessionTransport;
}
