//! # Server Reflection
//!
//! Protocol level access to `grpc.reflection.v1`: listing services and fetching the
//! `FileDescriptorProto`s that describe a symbol. Higher layers turn those files into
//! `prost_reflect` descriptors.
pub mod client;
