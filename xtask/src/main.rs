// Build automation tool - suppress style lints
#![allow(clippy::needless_borrow)]
#![allow(clippy::collapsible_if)]

use mpboot::config::{BUNDLE_MAGIC, ENTRY_RECORD_NAME};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shell_escape::escape;
use std::env;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::process::Command;

const DEVICE_TARGET: &str = "armv7a-none-eabi";
const BINARY_NAME: &str = "mpboot";

fn run(cmd: &mut Command) -> anyhow::Result<()> {
    eprintln!("[RUN] {}", render_command(cmd));
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("command failed: {:?}", cmd);
    }
    Ok(())
}

fn render_command(cmd: &Command) -> String {
    let mut parts = vec![escape(cmd.get_program().to_string_lossy()).into_owned()];
    for arg in cmd.get_args() {
        parts.push(escape(arg.to_string_lossy()).into_owned());
    }
    parts.join(" ")
}

fn cargo() -> Command {
    Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".into()))
}

fn root() -> anyhow::Result<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("xtask is not inside a workspace"))
}

fn ensure_dist() -> anyhow::Result<PathBuf> {
    let dist = root()?.join("build/dist");
    fs::create_dir_all(&dist)?;
    Ok(dist)
}

fn have(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

fn find_objcopy() -> Option<&'static str> {
    ["rust-objcopy", "llvm-objcopy", "arm-none-eabi-objcopy"]
        .into_iter()
        .find(|c| have(c))
}

/// Firmware build settings from `mpboot.toml` at the workspace root
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FirmwareConfig {
    target: Option<String>,
    release: Option<bool>,
    libmicropython: Option<PathBuf>,
    features: Vec<String>,
}

fn read_firmware_config() -> anyhow::Result<FirmwareConfig> {
    let path = root()?.join("mpboot.toml");
    if !path.exists() {
        return Ok(FirmwareConfig::default());
    }
    let text = fs::read_to_string(&path)?;
    let config = toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("invalid {}: {}", path.display(), e))?;
    Ok(config)
}

fn task_fmt() -> anyhow::Result<()> {
    run(cargo().args(["fmt", "--all"]))
}

fn task_fmt_check() -> anyhow::Result<()> {
    run(cargo().args(["fmt", "--all", "--", "--check"]))
}

fn task_clippy() -> anyhow::Result<()> {
    run(cargo().args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]))
}

fn task_test() -> anyhow::Result<()> {
    run(cargo().args(["test", "-p", "mpboot"]))
}

fn task_check() -> anyhow::Result<()> {
    task_fmt_check()?;
    task_clippy()?;
    task_test()
}

fn task_env_check() -> anyhow::Result<()> {
    let mut missing = Vec::new();
    for tool in ["cargo", "rustup"] {
        match tool_version(tool) {
            Some(v) => eprintln!("[VER] {}: {}", tool, v),
            None => missing.push(tool),
        }
    }
    match find_objcopy() {
        Some(objcopy) => eprintln!("[VER] objcopy: {}", objcopy),
        None => eprintln!("[WARN] no objcopy found; install with: cargo install cargo-binutils"),
    }

    let installed = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default();
    if !installed.lines().any(|t| t.trim() == DEVICE_TARGET) {
        eprintln!(
            "[WARN] {} not installed; run: rustup target add {}",
            DEVICE_TARGET, DEVICE_TARGET
        );
    }

    let config = read_firmware_config()?;
    let archive = config
        .libmicropython
        .or_else(|| env::var_os("MPBOOT_LIBMICROPYTHON").map(PathBuf::from));
    match archive {
        Some(path) if path.exists() => eprintln!("[OK] runtime archive: {}", path.display()),
        Some(path) => eprintln!("[WARN] runtime archive missing: {}", path.display()),
        None => eprintln!("[WARN] MPBOOT_LIBMICROPYTHON not set"),
    }

    if !missing.is_empty() {
        anyhow::bail!("missing tools: {}", missing.join(", "));
    }
    Ok(())
}

fn task_firmware() -> anyhow::Result<PathBuf> {
    let config = read_firmware_config()?;
    let target = config.target.as_deref().unwrap_or(DEVICE_TARGET);
    let release = config.release.unwrap_or(true);
    let profile_dir = if release { "release" } else { "debug" };

    let mut features = vec!["firmware".to_string()];
    features.extend(config.features.iter().cloned());

    let mut cmd = cargo();
    cmd.current_dir(root()?)
        .args(["build", "--bin", BINARY_NAME, "--target", target])
        .args(["--features", &features.join(",")]);
    if release {
        cmd.arg("--release");
    }
    if let Some(archive) = &config.libmicropython {
        cmd.env("MPBOOT_LIBMICROPYTHON", archive);
    }
    run(&mut cmd)?;

    let elf = root()?
        .join("target")
        .join(target)
        .join(profile_dir)
        .join(BINARY_NAME);
    if !elf.exists() {
        anyhow::bail!("expected build output at {}", elf.display());
    }

    let dist = ensure_dist()?;
    let elf_out = dist.join(format!("{}.elf", BINARY_NAME));
    fs::copy(&elf, &elf_out)?;
    eprintln!("[ARTIFACT] {}", elf_out.display());

    let Some(objcopy) = find_objcopy() else {
        eprintln!("[WARN] no objcopy found; skipping raw binary");
        return Ok(elf_out);
    };
    let bin_out = dist.join(format!("{}.bin", BINARY_NAME));
    let mut strip = Command::new(objcopy);
    strip.args(["-O", "binary"]).arg(&elf_out).arg(&bin_out);
    run(&mut strip)?;
    eprintln!("[ARTIFACT] {}", bin_out.display());
    Ok(bin_out)
}

/// Lay out named precompiled modules as a linkable bytecode bundle
///
/// An entry record naming `entry` is appended after the modules.
fn pack_bundle(modules: &[(String, Vec<u8>)], entry: &str) -> anyhow::Result<Vec<u8>> {
    if !modules.iter().any(|(name, _)| name == entry) {
        anyhow::bail!("entry module '{}' is not in the bundle", entry);
    }
    let mut records: Vec<(&[u8], &[u8])> = modules
        .iter()
        .map(|(name, code)| (name.as_bytes(), code.as_slice()))
        .collect();
    records.push((ENTRY_RECORD_NAME, entry.as_bytes()));

    let name_pool = 16 + records.len() * 8;
    let bytecode_pool = name_pool + records.iter().map(|(name, _)| name.len()).sum::<usize>();

    let mut out = Vec::new();
    for word in [BUNDLE_MAGIC, u32::try_from(name_pool)?, u32::try_from(bytecode_pool)?] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&u32::try_from(records.len())?.to_le_bytes());
    for (name, code) in &records {
        out.extend_from_slice(&u32::try_from(name.len())?.to_le_bytes());
        out.extend_from_slice(&u32::try_from(code.len())?.to_le_bytes());
    }
    for (name, _) in &records {
        out.extend_from_slice(name);
    }
    for (_, code) in &records {
        out.extend_from_slice(code);
    }
    Ok(out)
}

/// Module name for a compiled file: `lib/motors.mpy` is `motors`
fn module_name(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("cannot derive a module name from {}", path.display()))
}

fn task_bundle(args: &[String]) -> anyhow::Result<PathBuf> {
    let Some(entry_path) = args.first() else {
        anyhow::bail!("usage: bundle <main.mpy> [module.mpy ...]");
    };
    let entry = module_name(Path::new(entry_path))?;

    let mut modules: Vec<(String, Vec<u8>)> = Vec::new();
    for path in args {
        let name = module_name(Path::new(path))?;
        if modules.iter().any(|(existing, _)| *existing == name) {
            anyhow::bail!("two modules are named '{}'", name);
        }
        let bytes = fs::read(path).map_err(|e| anyhow::anyhow!("{}: {}", path, e))?;
        eprintln!("[BUNDLE] {} as '{}' ({} bytes)", path, name, bytes.len());
        modules.push((name, bytes));
    }

    let out = ensure_dist()?.join("bytecode.bin");
    fs::write(&out, pack_bundle(&modules, &entry)?)?;
    eprintln!("[ARTIFACT] {} (entry '{}')", out.display(), entry);
    Ok(out)
}

fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn append_checksum(path: &Path) -> anyhow::Result<()> {
    let dist = ensure_dist()?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sum = sha256_file(path)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dist.join("SHA256SUMS"))?;
    writeln!(f, "{}  {}", sum, name)?;
    eprintln!("[CHECKSUM] {}  {}", sum, name);
    Ok(())
}

fn tool_version(cmd: &str) -> Option<String> {
    let out = Command::new(cmd).arg("--version").output().ok()?;
    let first = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .next()
            .unwrap_or("")
            .to_string()
    };
    let mut s = first(&out.stdout);
    if s.is_empty() {
        s = first(&out.stderr);
    }
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn write_manifest() -> anyhow::Result<()> {
    let dist = ensure_dist()?;
    let mut artifacts = vec![];
    for name in [
        format!("{}.elf", BINARY_NAME),
        format!("{}.bin", BINARY_NAME),
        "bytecode.bin".to_string(),
    ] {
        let path = dist.join(&name);
        if path.exists() {
            let size = path.metadata().map(|m| m.len()).unwrap_or(0);
            let sum = sha256_file(&path).ok();
            artifacts.push(serde_json::json!({
                "name": name,
                "path": path.to_string_lossy(),
                "bytes": size,
                "sha256": sum,
            }));
        }
    }

    let manifest = serde_json::json!({
        "versions": {
            "rustc": tool_version("rustc"),
            "cargo": tool_version("cargo"),
            "objcopy": find_objcopy(),
        },
        "target": DEVICE_TARGET,
        "artifacts": artifacts,
        "meta": {
            "timestamp": std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
            "mpboot_version": mpboot::VERSION,
            "xtask_version": env!("CARGO_PKG_VERSION"),
        }
    });
    let out = dist.join("MANIFEST.json");
    fs::write(&out, serde_json::to_vec_pretty(&manifest)?)?;
    eprintln!("[ARTIFACT] {}", out.display());
    Ok(())
}

fn task_package(args: &[String]) -> anyhow::Result<()> {
    let binary = task_firmware()?;
    append_checksum(&binary)?;
    if !args.is_empty() {
        let bundle = task_bundle(args)?;
        append_checksum(&bundle)?;
    }
    write_manifest()
}

fn task_clean() -> anyhow::Result<()> {
    eprintln!("[CLEAN] Cleaning build artifacts...");
    run(cargo().args(["clean"]))?;

    let build_dir = root()?.join("build");
    if build_dir.exists() {
        fs::remove_dir_all(&build_dir)?;
        eprintln!("[CLEAN] Removed build directory: {}", build_dir.display());
    }
    Ok(())
}

fn print_help() {
    eprintln!(
        "xtask commands:\n  fmt | fmt-check | clippy | test | check | env-check | clean\n  firmware                      # build the device binary\n  bundle <main.mpy> [mod.mpy..] # pack named bytecode modules; the first is the entry\n  package [main.mpy ..]         # firmware + bundle + checksums + MANIFEST.json\n\nSettings are read from mpboot.toml (target, release, libmicropython, features).\n\nExamples:\n  cargo run -p xtask -- check\n  cargo run -p xtask -- firmware\n  cargo run -p xtask -- package build/main.mpy"
    );
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| "help".into());
    let rest: Vec<String> = args.collect();
    match cmd.as_str() {
        "fmt" => task_fmt(),
        "fmt-check" => task_fmt_check(),
        "clippy" => task_clippy(),
        "test" => task_test(),
        "check" => task_check(),
        "env-check" => task_env_check(),
        "firmware" => task_firmware().map(|_| ()),
        "bundle" => task_bundle(&rest).map(|_| ()),
        "package" => task_package(&rest),
        "clean" => task_clean(),
        _ => {
            print_help();
            Ok(())
        }
    }
}
