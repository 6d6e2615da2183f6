pub mod cancellation;
pub mod http;
pub mod path_sanitize;
pub mod subprocess;
