pub mod cors;
pub mod request_log;

pub use cors::cors_layer;
pub use request_log::{request_log, REQUEST_ID_HEADER};
