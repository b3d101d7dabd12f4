#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod progress;
pub mod retry;

pub use lms_core::Clock;

pub use api::{HttpProgressApi, ProgressApi};
pub use config::ApiConfig;
pub use error::{ApiError, ErrorKind, ProgressError};
pub use notify::{ChannelNotifier, Notification, Notifier, RetryAction, TracingNotifier};
pub use progress::ProgressService;
pub use retry::RetryPolicy;
