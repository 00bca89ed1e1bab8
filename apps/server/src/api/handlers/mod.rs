pub mod adt;
pub mod health;
pub mod pharmacy;
