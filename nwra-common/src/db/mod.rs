//! Database initialisation for processing state

pub mod init;

pub use init::*;
