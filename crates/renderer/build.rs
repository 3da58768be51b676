// Compiles the GLSL sources in `<workspace>/shaders` to SPIR-V in
// `<target dir>/shaders`, named `<file>.spv` (e.g. `particle.comp.spv`).
// The target dir is `CARGO_TARGET_DIR` when set, `<workspace>/target`
// otherwise. The output directory is exported to the crate as
// `EMBER_SHADER_DIR`, so it is known even when nothing was compiled.
//
// glslc is taken from `$VULKAN_SDK/bin`, then from `PATH`. Without it the
// build continues and GPU tests that need the modules skip themselves.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 3] = ["vert", "frag", "comp"];

fn glslc() -> Option<PathBuf> {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let name = if cfg!(target_os = "windows") { "Bin/glslc.exe" } else { "bin/glslc" };
        let path = Path::new(&sdk).join(name);
        if path.exists() {
            return Some(path);
        }
    }
    let on_path = Command::new("glslc").arg("--version").output();
    matches!(on_path, Ok(out) if out.status.success()).then(|| PathBuf::from("glslc"))
}

fn target_dir(workspace: &Path) -> PathBuf {
    println!("cargo:rerun-if-env-changed=CARGO_TARGET_DIR");
    match env::var_os("CARGO_TARGET_DIR").map(PathBuf::from) {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => workspace.join(dir),
        None => workspace.join("target"),
    }
}

fn needs_compile(src: &Path, dst: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(src), modified(dst)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let workspace = manifest_dir.join("../..");
    let shader_dir = workspace.join("shaders");
    let out_dir = target_dir(&workspace).join("shaders");
    println!("cargo:rustc-env=EMBER_SHADER_DIR={}", out_dir.display());

    println!("cargo:rerun-if-changed={}", shader_dir.display());

    let Ok(entries) = fs::read_dir(&shader_dir) else {
        println!("cargo:warning=no shader directory at {}", shader_dir.display());
        return;
    };
    let Some(glslc) = glslc() else {
        println!("cargo:warning=glslc not found; particle shaders were not compiled");
        return;
    };
    if let Err(e) = fs::create_dir_all(&out_dir) {
        println!("cargo:warning=cannot create {}: {}", out_dir.display(), e);
        return;
    }

    for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        println!("cargo:rerun-if-changed={}", path.display());
        let out_file = out_dir.join(format!("{file_name}.spv"));
        if !needs_compile(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg("--target-env=vulkan1.2")
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => panic!("glslc failed for {} ({})", path.display(), s),
            Err(e) => panic!("failed to run glslc for {}: {}", path.display(), e),
        }
    }
}
