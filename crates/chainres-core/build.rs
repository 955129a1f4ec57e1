/// Builds the gRPC client and server code for the `chainres.proto` definition
/// using `tonic-prost-build`.
///
/// Every message in the `chainres` package additionally derives
/// `serde::Deserialize` with `#[serde(default)]`, so JSON fixtures can be read
/// straight into the wire types without a parallel set of structs.
///
/// # Files and Paths
///
/// - Proto file: `proto/chainres.proto`
/// - Includes: `proto/`
///
/// # Output
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("chainres");
/// }
/// ```
///
/// The encoded descriptor set is written to `chainres_descriptor.bin` for gRPC
/// reflection.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("chainres_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .type_attribute(".chainres", "#[derive(serde::Deserialize)]")
        .type_attribute(".chainres", "#[serde(default)]")
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/chainres.proto"], &["proto"])
        .unwrap();
}
