//! # Refscope Core
//!
//! `refscope-core` is the library powering the `refscope` CLI. It inspects any gRPC server that
//! exposes the Server Reflection Protocol, without compile-time knowledge of its Protobuf schema.
//!
//! ## Key Components
//!
//! * **[`target`]:** Turns a chain id or an explicit address into a single [`target::Target`].
//! * **[`session::ReflectionSession`]:** Owns the connection and the reflection client for one
//!   invocation. Dropping the session releases both.
//! * **[`resolver::ServiceResolver`]:** Lists services and resolves service or method names,
//!   enriching "not found" errors with the names that do exist.
//! * **[`walker::TypeGraph`]:** Collects every message and enum reachable from a set of root
//!   messages, once each, in first-discovery order.
//! * **[`render`]:** Canonical, deterministic proto-like rendering of descriptors.
//! * **[`inspect`]:** The four inspection operations the CLI exposes, writing to any `io::Write`.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost-reflect` and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod error;
pub mod inspect;
pub mod reflection;
pub mod render;
pub mod resolver;
pub mod session;
pub mod target;
pub mod walker;

// Re-exports
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
