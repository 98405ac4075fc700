//! HTTP layer: transport selection, connections and request/response types.

pub mod connection;
pub mod decoder;
pub mod fetch;
pub mod h2settings;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod streamfactory;

// Re-exports for convenience
pub use h2settings::H2Settings;
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use responsebody::ResponseBody;
