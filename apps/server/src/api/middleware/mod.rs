pub mod request_id;
pub mod security;

pub use request_id::request_id_middleware;
pub use security::security_headers_middleware;
