// Build scripts signal errors by panicking; there is no caller to
// return Result to. Cargo treats a non-zero exit as a build failure.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Build script for the cutout app crate.
//!
//! ## Tailwind CSS
//!
//! Runs `npx @tailwindcss/cli` to compile `crates/cutout/tailwind.css`
//! (which scans this crate and `cutout-io` for utility classes) into
//! `$OUT_DIR/assets/tailwind.css`, exposed as `TAILWIND_CSS_PATH`.
//!
//! ## Removal worker
//!
//! Builds `crates/cutout-worker` with `wasm-pack --target no-modules`
//! and exposes the glue and binary as `WORKER_JS_PATH` and
//! `WORKER_WASM_PATH` for `include_str!` / `include_bytes!`.
//!
//! Both steps need Node.js and wasm-pack and only run when the app is
//! compiled for `wasm32`. Host builds (`cargo test`, `cargo clippy`)
//! embed empty placeholders; the app then has no worker and falls back
//! to removing on the main thread.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::{env, fs};

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let workspace_root = manifest_dir
        .parent()
        .and_then(Path::parent)
        .expect("could not find workspace root");

    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if target_arch == "wasm32" {
        build_tailwind_css(&manifest_dir, workspace_root, &out_dir);
        build_worker_wasm(workspace_root, &out_dir);
    } else {
        write_placeholders(&out_dir);
    }
}

/// Empty stylesheet and worker assets for host builds.
fn write_placeholders(out_dir: &Path) {
    let dir = out_dir.join("placeholder");
    fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("failed to create {}: {e}", dir.display()));

    for (file, key) in [
        ("tailwind.css", "TAILWIND_CSS_PATH"),
        ("cutout_worker.js", "WORKER_JS_PATH"),
        ("cutout_worker_bg.wasm", "WORKER_WASM_PATH"),
    ] {
        let path = dir.join(file);
        fs::write(&path, "").unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
        println!("cargo:rustc-env={key}={}", path.display());
    }
}

/// Compile Tailwind CSS via `npx @tailwindcss/cli`.
fn build_tailwind_css(manifest_dir: &Path, workspace_root: &Path, out_dir: &Path) {
    let input = manifest_dir.join("tailwind.css");
    let assets_dir = out_dir.join("assets");
    let output = assets_dir.join("tailwind.css");

    fs::create_dir_all(&assets_dir)
        .unwrap_or_else(|e| panic!("failed to create {}: {e}", assets_dir.display()));

    println!("cargo:rerun-if-changed={}", input.display());

    // Tailwind scans these for class names.
    let crates_dir = workspace_root.join("crates");
    register_rs_sources(&crates_dir.join("cutout"));
    register_rs_sources(&crates_dir.join("cutout-io"));

    let input_lossy = input.to_string_lossy();
    let output_lossy = output.to_string_lossy();
    let mut args: Vec<&str> = vec!["@tailwindcss/cli", "-i", &input_lossy, "-o", &output_lossy];

    if env::var("PROFILE").unwrap_or_default() == "release" {
        args.push("--minify");
    }

    let status = Command::new("npx").args(&args).status().unwrap_or_else(|e| {
        panic!(
            "failed to run `npx @tailwindcss/cli`: {e}\n\
             \n\
             Tailwind CSS is compiled from build.rs and requires Node.js / npm.\n\
             Install Node.js (https://nodejs.org/) and ensure `npx` is on PATH."
        )
    });
    assert!(status.success(), "`npx @tailwindcss/cli` exited with {status}");

    println!("cargo:rustc-env=TAILWIND_CSS_PATH={}", output.display());
}

/// Build the removal worker via `wasm-pack`.
fn build_worker_wasm(workspace_root: &Path, out_dir: &Path) {
    let worker_crate = workspace_root.join("crates/cutout-worker");
    let core_crate = workspace_root.join("crates/cutout-core");
    let worker_pkg_dir = out_dir.join("worker-pkg");

    let watched = [&worker_crate, &core_crate];
    for krate in watched {
        register_rs_sources(&krate.join("src"));
        println!("cargo:rerun-if-changed={}", krate.join("Cargo.toml").display());
    }

    let js_path = worker_pkg_dir.join("cutout_worker.js");
    let wasm_path = worker_pkg_dir.join("cutout_worker_bg.wasm");

    // wasm-pack takes tens of seconds; skip it when the output is newer
    // than every worker and core source.
    let up_to_date = js_path.exists()
        && fs::metadata(&wasm_path)
            .and_then(|m| m.modified())
            .is_ok_and(|built| {
                watched.iter().all(|krate| {
                    !is_any_newer_than(&krate.join("src"), built)
                        && !fs::metadata(krate.join("Cargo.toml"))
                            .and_then(|m| m.modified())
                            .is_ok_and(|t| t > built)
                })
            });

    if !up_to_date {
        // Host flags and wrappers (coverage instrumentation, for one)
        // break the wasm32 sub-build.
        let status = Command::new("wasm-pack")
            .args([
                "build",
                &worker_crate.to_string_lossy(),
                "--target",
                "no-modules",
                "--no-typescript",
                "--out-dir",
                &worker_pkg_dir.to_string_lossy(),
            ])
            .env_remove("RUSTFLAGS")
            .env_remove("CARGO_ENCODED_RUSTFLAGS")
            .env_remove("RUSTC_WRAPPER")
            .env_remove("RUSTC_WORKSPACE_WRAPPER")
            .status()
            .unwrap_or_else(|e| {
                panic!(
                    "failed to run `wasm-pack build`: {e}\n\
                     \n\
                     The web worker requires wasm-pack to compile.\n\
                     Install: cargo install wasm-pack"
                )
            });
        assert!(
            status.success(),
            "`wasm-pack build` for cutout-worker exited with {status}"
        );
        assert!(js_path.exists(), "expected worker JS at {}", js_path.display());
        assert!(wasm_path.exists(), "expected worker WASM at {}", wasm_path.display());
    }

    println!("cargo:rustc-env=WORKER_JS_PATH={}", js_path.display());
    println!("cargo:rustc-env=WORKER_WASM_PATH={}", wasm_path.display());
}

/// Recursively emit `cargo:rerun-if-changed` for every `.rs` file
/// under `dir`.
fn register_rs_sources(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            register_rs_sources(&path);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            println!("cargo:rerun-if-changed={}", path.display());
        }
    }
}

/// Whether any `.rs` or `.toml` file under `dir` is newer than
/// `reference`.
fn is_any_newer_than(dir: &Path, reference: std::time::SystemTime) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        if path.is_dir() {
            is_any_newer_than(&path, reference)
        } else {
            path.extension().is_some_and(|ext| ext == "rs" || ext == "toml")
                && fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .is_ok_and(|t| t > reference)
        }
    })
}
