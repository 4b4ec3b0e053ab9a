use std::env;
use std::fs;
use std::path::Path;

// Embeds the workspace VERSION as DEEPSCAN_VERSION for `deepscan --version`.
fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let version_file = Path::new(&manifest_dir)
        .ancestors()
        .nth(2)
        .expect("deepscan-app sits two levels below the workspace root")
        .join("VERSION");

    println!("cargo:rerun-if-changed={}", version_file.display());

    let raw = fs::read_to_string(&version_file).unwrap_or_else(|error| {
        panic!("cannot read deepscan version from {}: {error}", version_file.display())
    });
    let version = raw.trim();
    assert!(
        !version.is_empty(),
        "{} holds no deepscan release version",
        version_file.display()
    );

    println!("cargo:rustc-env=DEEPSCAN_VERSION={version}");
}
