//! Core types for the enterprise usage stats collector.

pub mod error;
pub mod measure;
pub mod source;
pub mod time;

pub use error::{DbErrorCode, Error, Result};
pub use measure::*;
pub use source::*;
pub use time::*;
