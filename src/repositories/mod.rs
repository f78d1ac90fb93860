pub mod exception_store;
pub mod production_store;

pub use exception_store::ExceptionStore;
pub use production_store::{lock_mo, ProductionFilter, ProductionStore};
