use crate::http::h2settings::H2Settings;
use crate::socket::stream::BoxedSocket;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A connected socket handed to a new session instead of dialing.
///
/// Taken at most once: the first session that opens with it owns it.
#[derive(Clone)]
pub struct PreconnectedSocket(Arc<Mutex<Option<BoxedSocket>>>);

impl PreconnectedSocket {
    pub fn new(socket: BoxedSocket) -> Self {
        Self(Arc::new(Mutex::new(Some(socket))))
    }

    pub fn take(&self) -> Option<BoxedSocket> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl fmt::Debug for PreconnectedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let available = self.0.lock().map(|s| s.is_some()).unwrap_or(false);
        f.debug_struct("PreconnectedSocket").field("available", &available).finish()
    }
}

/// Options for establishing an HTTP/2 session. Unset fields fall back to
/// the connector's defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Deadline for the whole connect phase (dial, TLS, SETTINGS exchange).
    pub connect_timeout: Option<Duration>,
    /// SETTINGS sent to the server.
    pub settings: Option<H2Settings>,
    /// Verify the server certificate, on both the ALPN dial and the
    /// connector's own TLS dial.
    pub reject_unauthorized: Option<bool>,
    /// Use this socket instead of dialing.
    pub transport: Option<PreconnectedSocket>,
}

impl SessionOptions {
    /// Field-wise merge, `extra` wins wherever it sets a field.
    pub fn merge(&self, extra: &SessionOptions) -> SessionOptions {
        SessionOptions {
            connect_timeout: extra.connect_timeout.or(self.connect_timeout),
            settings: extra.settings.or(self.settings),
            reject_unauthorized: extra.reject_unauthorized.or(self.reject_unauthorized),
            transport: extra.transport.clone().or_else(|| self.transport.clone()),
        }
    }

    pub fn with_transport(socket: BoxedSocket) -> Self {
        Self { transport: Some(PreconnectedSocket::new(socket)), ..Default::default() }
    }
}
