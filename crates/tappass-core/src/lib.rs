//! Core types, policy, and scan-cycle orchestration for TapPass.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! credential store and the audit sink are traits; `tappass-store-sqlite`
//! provides the reference backend.

pub mod attempt;
pub mod audit;
pub mod clock;
pub mod credential;
pub mod decision;
pub mod error;
pub mod policy;
pub mod session;
pub mod store;

pub use error::{Error, PersistenceError, Result};

#[cfg(test)]
mod tests;
