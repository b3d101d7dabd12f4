mod mutation;
mod reconcile;
mod service;

// Public API of the progress subsystem.
pub use crate::error::ProgressError;
pub use service::ProgressService;
