//! Domain records and request payloads

pub mod adt;
pub mod pharmacy;

pub use adt::*;
pub use pharmacy::*;
