pub mod adt;
pub mod pharmacy;

pub use adt::adt_routes;
pub use pharmacy::pharmacy_routes;
