use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Embed the Windows manifest that requests administrator privileges.
    // SendInput into an elevated game window is dropped otherwise.
    let _ = embed_resource::compile("scrapbook-bot.rc", embed_resource::NONE);
    println!("cargo:rerun-if-changed=scrapbook-bot.rc");
    println!("cargo:rerun-if-changed=scrapbook-bot.exe.manifest");

    // Copy runtime assets next to the executable
    copy_config();
    copy_mask();
}

/// Returns target/release (or target/debug).
fn target_dir() -> PathBuf {
    let out_dir = env::var("OUT_DIR").unwrap();
    // OUT_DIR is something like target/release/build/scrapbook-bot-xxx/out
    Path::new(&out_dir)
        .ancestors()
        .nth(3) // Go up 3 levels: out -> hash -> build -> release
        .expect("Could not find target directory")
        .to_path_buf()
}

/// Copies config.json to the target directory.
fn copy_config() {
    let config_src = Path::new("config.json");
    let config_dst = target_dir().join("config.json");

    if config_src.exists() {
        let _ = fs::copy(config_src, &config_dst);
        println!("cargo:rerun-if-changed=config.json");
    }
}

/// Copies the volatile-region mask to the target directory.
fn copy_mask() {
    let mask_src = Path::new("resources/mask.png");
    let mask_dst = target_dir().join("mask.png");

    if mask_src.exists() {
        let _ = fs::copy(mask_src, &mask_dst);
        println!("cargo:rerun-if-changed=resources/mask.png");
    }
}
