//! Shared wire types for the MEC platform workspace.
//!
//! Keep cross-crate DTOs here so the server, tests, and future clients agree
//! on one serialization of the Mp1 and management payloads.

#![warn(missing_docs)]

/// Shared API DTOs for cross-crate use.
pub mod api;
