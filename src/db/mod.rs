pub mod entities;
pub mod schema;
pub mod services;

pub use schema::{connect_with_retry, ensure_schema, retry_with_delay};
