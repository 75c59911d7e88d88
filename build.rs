//! Link setup for the device binary
//!
//! Host builds (tests, tooling) link nothing extra. Bare-metal ARM builds get
//! the memory map and, with the `firmware` feature, the prebuilt runtime
//! archive named by `MPBOOT_LIBMICROPYTHON`.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=link/v5.ld");
    println!("cargo:rerun-if-env-changed=MPBOOT_LIBMICROPYTHON");

    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_arch != "arm" || target_os != "none" {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    println!("cargo:rustc-link-search=native={}", manifest_dir.join("link").display());
    println!("cargo:rustc-link-arg-bins=-Tv5.ld");

    if env::var_os("CARGO_FEATURE_FIRMWARE").is_some() {
        match env::var("MPBOOT_LIBMICROPYTHON") {
            Ok(archive) => {
                println!("cargo:rustc-link-arg-bins={archive}");
                println!("cargo:rustc-link-lib=c");
                println!("cargo:rustc-link-lib=m");
            }
            Err(_) => println!(
                "cargo:warning=MPBOOT_LIBMICROPYTHON is not set; the runtime archive will not be linked"
            ),
        }
    }
}
