use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("telemetryx_descriptor.bin"))
        .compile_protos(
            &[
                "proto/common.proto",
                "proto/rules.proto",
                "proto/analytics.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
