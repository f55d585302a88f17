pub mod commands;
pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod storage;
pub mod vault;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;

pub use digest::ContentDigest;
pub use error::{HashdropError, Result};
pub use vault::Vault;
