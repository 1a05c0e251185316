//! Shared primitives for the switchboard crates

mod error;

pub use error::HttpError;
