pub mod chain;
pub mod config;
pub mod contract;
pub mod deposit;
pub mod error;
pub mod file_storage;
pub mod header;
pub mod keys;
pub mod log;
pub mod merkle;

pub use error::Error;
