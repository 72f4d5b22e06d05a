pub mod config;
pub mod error;

pub use config::SealboxConfig;
pub use error::{ErrorKind, SealboxError, SealboxResult};
