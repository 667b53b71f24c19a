//! songlib-service library interface
//!
//! Exposes the database layer and the ingestion/catalog services for
//! integration testing; the binary in `main.rs` wires them to the real
//! broker and cache store.

pub mod db;
pub mod services;
