//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): network error codes matching Chromium's `net_error_list.h`
//! - [`Origin`](origin::Origin): the pooling and session-sharing scope

pub mod context;
pub mod neterror;
pub mod origin;
