//! Persisted domain models and request DTOs.

pub mod appointment;
pub mod patient;
pub mod room;
pub mod stats;
pub mod user;

pub use appointment::*;
pub use patient::*;
pub use room::*;
pub use stats::*;
pub use user::*;
