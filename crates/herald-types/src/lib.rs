//! Shared types and error hierarchy for Herald.

pub mod error;
pub mod event;
pub mod util;

pub use error::{ConfigError, HeraldError, ResponseError, UrlError};
pub use event::*;
