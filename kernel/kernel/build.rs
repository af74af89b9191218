fn main() {
    // The loader resolves the image entry from the ELF header; point it at
    // the handoff symbol instead of a default `_start`.
    println!("cargo:rustc-link-arg-bins=--entry=uefi_start");
}
