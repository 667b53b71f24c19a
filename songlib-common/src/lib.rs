//! Shared plumbing for the songlib services
//!
//! Carries the pieces both the gateway side and the song service need:
//! the common error type, environment configuration, the domain models and
//! queue payload shapes, the dual-tier cache provider, and the queue client
//! with its consumer manager.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;
pub mod queue;

pub use error::{Error, Result};
