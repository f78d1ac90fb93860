pub mod admin;
pub mod common;
pub mod exceptions;
pub mod external;
pub mod health;
pub mod mo;
pub mod pic;
pub mod production;
pub mod receiver;
pub mod statistics;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
