#![forbid(unsafe_code)]

pub mod cache;

pub use cache::{Cached, ProgressCache, ProgressSnapshot, QueryKey, StorageError};
