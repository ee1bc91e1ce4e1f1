pub mod aws;
pub mod config;
pub mod error;
pub mod keys;
pub mod session;

pub use error::{Result, TunnelError};
