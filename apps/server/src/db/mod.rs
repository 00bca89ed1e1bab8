//! Data access layer

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{InMemoryStore, StoreOp};
pub use postgres::PostgresStore;
pub use traits::{HospitalStore, StoreTransaction};
