//! Domain types shared by the taskflow crates.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::CoreError;
