//! Common types for the twscrape workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, resolve_secret};
