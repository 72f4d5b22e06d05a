//! Shared plumbing for the sealbox binaries.

pub mod logging;
