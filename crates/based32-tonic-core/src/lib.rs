#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated protocol types for the `transcriber` package.
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/transcriber.rs"));

    /// Serialized file descriptor set, registered with the gRPC
    /// reflection service by the server binary.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/transcriber_descriptor.bin"));
}
