use std::process::Command;

fn main() {
    // libvirt dynamic library
    println!("cargo:rustc-link-lib=dylib=virt");

    // git hash
    let git_hash = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .unwrap_or_else(|| String::from("unknown"));
    println!("cargo:rustc-env=GIT_HASH={}", git_hash.trim());
    println!("cargo:rerun-if-changed=.git/HEAD");
}
