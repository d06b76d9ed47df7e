use std::env;

fn main() {
    println!("cargo:rerun-if-changed=linker.ld");
    println!("cargo:rerun-if-changed=src/boot.S");

    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("aarch64") {
        return;
    }

    cc::Build::new()
        .compiler("aarch64-linux-gnu-gcc")
        .file("src/boot.S")
        .flag("-xassembler-with-cpp")
        .compile("boot");

    // Let rustc pass -T directly to the linker.
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    println!("cargo:rustc-link-arg=-T{manifest_dir}/linker.ld");
}
