//! HTTP/2 SETTINGS sent when a session is established.
//!
//! Based on RFC 9113 section 6.5.2 defaults and Chromium's spdy_session.h.

/// HTTP/2 SETTINGS configuration.
/// Values are sent in the SETTINGS frame during connection setup.
/// A zero `max_concurrent_streams` or `max_header_list_size` is not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2Settings {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1) - HPACK dynamic table size
    pub header_table_size: u32,
    /// SETTINGS_ENABLE_PUSH (0x2) - Server push enabled
    pub enable_push: bool,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    pub max_concurrent_streams: u32,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4) - Flow control window
    pub initial_window_size: u32,
    /// SETTINGS_MAX_FRAME_SIZE (0x5) - Maximum frame payload
    pub max_frame_size: u32,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6) - Maximum header block size
    pub max_header_list_size: u32,
}

impl Default for H2Settings {
    /// Protocol defaults, push accepted.
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: 0,
            initial_window_size: 65535,
            max_frame_size: 16384,
            max_header_list_size: 0,
        }
    }
}

impl H2Settings {
    /// Chrome 120+ HTTP/2 SETTINGS.
    /// Based on Chromium source (spdy_session.h) and live captures.
    pub fn chrome() -> Self {
        Self {
            header_table_size: 65536,
            enable_push: false, // Chrome disabled push in 2022
            max_concurrent_streams: 1000,
            initial_window_size: 6291456, // 6MB - Chrome's aggressive window
            max_frame_size: 16384,        // 16KB - RFC default
            max_header_list_size: 262144, // 256KB
        }
    }

    pub fn with_push(mut self, enable_push: bool) -> Self {
        self.enable_push = enable_push;
        self
    }
}
