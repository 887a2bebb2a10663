//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the round data model and the in-process cache
//! read by the HTTP surface. All types here are pure Rust with
//! serialization support.

/// Round data model and latest-round cache.
pub mod round;
