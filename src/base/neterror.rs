use thiserror::Error;

/// Coarse classification of a [`NetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A connect-phase deadline was exceeded.
    Timeout,
    /// The peer aborted a stream (e.g. a pushed stream was reset).
    Abort,
    /// The transport failed or closed.
    Transport,
    /// The request itself could not be issued (bad URL, bad body, ...).
    Request,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic
    #[error("Operation failed")]
    Failed,
    #[error("Operation aborted")]
    Aborted,
    #[error("Operation timed out")]
    TimedOut,

    // Connection Errors
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("ALPN negotiation failed")]
    AlpnNegotiationFailed,
    #[error("SSL version or cipher mismatch")]
    SslVersionOrCipherMismatch,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("HTTP/2 protocol error")]
    Http2ProtocolError,
    #[error("HTTP/2 server refused stream")]
    Http2ServerRefusedStream,
    #[error("HTTP/2 RST_STREAM NO_ERROR received")]
    Http2RstStreamNoErrorReceived,
    #[error("HTTP/2 pushed stream not available")]
    Http2PushedStreamNotAvailable,
    #[error("HTTP/2 claimed pushed stream reset by server")]
    Http2ClaimedPushedStreamResetByServer,
    #[error("HTTP/2 stream closed")]
    Http2StreamClosed,

    // Body handling (custom codes)
    #[error("Response body error")]
    HttpBodyError,
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Response body is not valid JSON")]
    JsonParseError,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::TimedOut => -7,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressUnreachable => -109,
            NetError::SocketNotConnected => -112,
            NetError::SslVersionOrCipherMismatch => -113,
            NetError::ConnectionTimedOut => -118,
            NetError::AlpnNegotiationFailed => -122,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::ContentDecodingFailed => -330,
            NetError::Http2ProtocolError => -337,
            NetError::Http2ServerRefusedStream => -351,
            NetError::Http2RstStreamNoErrorReceived => -372,
            NetError::Http2PushedStreamNotAvailable => -373,
            NetError::Http2ClaimedPushedStreamResetByServer => -374,
            NetError::Http2StreamClosed => -376,
            // Custom codes start at -10000 to stay clear of Chromium's ranges
            NetError::HttpBodyError => -10000,
            NetError::InvalidUtf8 => -10001,
            NetError::JsonParseError => -10002,
            NetError::Unknown(code) => *code,
        }
    }

    /// Classify this error into one of the coarse [`ErrorKind`]s.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::TimedOut | NetError::ConnectionTimedOut => ErrorKind::Timeout,
            NetError::Aborted | NetError::Http2ClaimedPushedStreamResetByServer => {
                ErrorKind::Abort
            }
            NetError::InvalidUrl
            | NetError::UnknownUrlScheme
            | NetError::ContentDecodingFailed
            | NetError::HttpBodyError
            | NetError::InvalidUtf8
            | NetError::JsonParseError => ErrorKind::Request,
            _ => ErrorKind::Transport,
        }
    }

    /// Whether this error stands for an expected, orderly shutdown rather
    /// than a genuine failure, e.g. a session that closed right after being
    /// created because the peer sent GOAWAY.
    pub fn is_orderly_close(&self) -> bool {
        matches!(self, NetError::ConnectionClosed | NetError::Http2RstStreamNoErrorReceived)
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -7 => NetError::TimedOut,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -109 => NetError::AddressUnreachable,
            -112 => NetError::SocketNotConnected,
            -113 => NetError::SslVersionOrCipherMismatch,
            -118 => NetError::ConnectionTimedOut,
            -122 => NetError::AlpnNegotiationFailed,

            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -330 => NetError::ContentDecodingFailed,
            -337 => NetError::Http2ProtocolError,
            -351 => NetError::Http2ServerRefusedStream,
            -372 => NetError::Http2RstStreamNoErrorReceived,
            -373 => NetError::Http2PushedStreamNotAvailable,
            -374 => NetError::Http2ClaimedPushedStreamResetByServer,
            -376 => NetError::Http2StreamClosed,

            -10000 => NetError::HttpBodyError,
            -10001 => NetError::InvalidUtf8,
            -10002 => NetError::JsonParseError,
            _ => NetError::Unknown(code),
        }
    }
}

impl From<std::io::Error> for NetError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;

        match e.kind() {
            IoKind::ConnectionRefused => NetError::ConnectionRefused,
            IoKind::ConnectionReset => NetError::ConnectionReset,
            IoKind::ConnectionAborted => NetError::ConnectionAborted,
            IoKind::NotConnected => NetError::SocketNotConnected,
            IoKind::TimedOut => NetError::ConnectionTimedOut,
            IoKind::UnexpectedEof | IoKind::BrokenPipe => NetError::ConnectionClosed,
            _ => NetError::ConnectionFailed,
        }
    }
}
