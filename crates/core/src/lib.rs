#![forbid(unsafe_code)]

pub mod error;
pub mod gating;
pub mod model;
pub mod time;

pub use error::{GateError, ModelError};
pub use gating::ContentGate;
pub use time::Clock;
