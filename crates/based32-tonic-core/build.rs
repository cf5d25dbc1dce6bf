//! Builds the gRPC client and server code for the `transcriber.proto`
//! definition.
//!
//! The `data` fields are explicitly marked with `.bytes(...)` so they are
//! deserialized as the `Bytes` type (from the `bytes` crate) instead of
//! the default `Vec<u8>`, enabling zero-copy handling of payloads as they
//! move between the stream and the worker pool.
//!
//! A file descriptor set is emitted alongside the generated code so the
//! server can register the gRPC reflection service.

use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("transcriber_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([
            ".transcriber.EncodeRequest.data",
            ".transcriber.DecodeResponse.data",
        ])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/transcriber.proto"], &["proto"])
        .unwrap();
}
