//! Build automation for talos-kube
//!
//! Usage: cargo xtask <command>
//!
//! Available commands:
//! - build: Build the project
//! - test: Run tests (optionally the Docker-backed ones)
//! - smoke: Create and delete a throwaway cluster with the release binary
//! - dist: Create distribution packages
//! - ci: Run CI checks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BIN: &str = "talos-kube";
const SMOKE_CLUSTER: &str = "talos-kube-smoke";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for talos-kube")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Also run tests that need a Docker daemon and talosctl
        #[arg(long)]
        docker: bool,
    },
    /// Create, inspect and delete a throwaway cluster (needs Docker and talosctl)
    Smoke {
        /// Number of worker nodes
        #[arg(long, default_value = "0")]
        workers: u32,
    },
    /// Create distribution packages
    Dist {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },
    /// Run CI checks (format, clippy, test)
    Ci,
    /// Format code
    Format {
        /// Check formatting without modifying files
        #[arg(long)]
        check: bool,
    },
    /// Run clippy
    Clippy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    sh.change_dir(project_root());

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { docker } => test(&sh, docker),
        Commands::Smoke { workers } => smoke(&sh, workers),
        Commands::Dist { target } => dist(&sh, target),
        Commands::Ci => ci(&sh),
        Commands::Format { check } => format(&sh, check),
        Commands::Clippy => clippy(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building {}...", BIN);

    if release {
        cmd!(sh, "cargo build --release").run()?;
        println!("✅ Release build completed: target/release/{}", BIN);
    } else {
        cmd!(sh, "cargo build").run()?;
        println!("✅ Debug build completed: target/debug/{}", BIN);
    }

    Ok(())
}

fn test(sh: &Shell, docker: bool) -> Result<()> {
    println!("🧪 Running tests...");

    cmd!(sh, "cargo test --all").run()?;
    if docker {
        println!("\n🐳 Running Docker-backed tests...");
        cmd!(sh, "cargo test --all -- --ignored --test-threads=1").run()?;
    }

    println!("✅ All tests passed");
    Ok(())
}

fn smoke(sh: &Shell, workers: u32) -> Result<()> {
    build(sh, true)?;
    let binary = project_root().join("target/release").join(BIN);
    let workers = workers.to_string();
    let temp_dir = sh.create_temp_dir()?;
    let kubeconfig = temp_dir.path().join("kubeconfig");

    println!("\n🚀 Creating {}...", SMOKE_CLUSTER);
    let created = cmd!(
        sh,
        "{binary} create -n {SMOKE_CLUSTER} --workers {workers} --kubeconfig {kubeconfig}"
    )
    .run();

    cmd!(sh, "{binary} status -n {SMOKE_CLUSTER}").run().ok();

    println!("\n🧹 Deleting {}...", SMOKE_CLUSTER);
    cmd!(sh, "{binary} delete -n {SMOKE_CLUSTER} --kubeconfig {kubeconfig}")
        .run()
        .context("Failed to delete smoke cluster")?;

    created.context("Smoke cluster creation failed")?;
    println!("\n✅ Smoke test passed");
    Ok(())
}

fn dist(sh: &Shell, target: Option<String>) -> Result<()> {
    println!("📦 Creating distribution package...");

    if let Some(ref target_triple) = target {
        cmd!(sh, "cargo build --release --target {target_triple}").run()?;
    } else {
        cmd!(sh, "cargo build --release").run()?;
    }

    let dist_dir = project_root().join("dist");
    sh.create_dir(&dist_dir)?;

    let binary_src = match target {
        Some(ref target_triple) => {
            project_root().join(format!("target/{}/release/{}", target_triple, BIN))
        }
        None => project_root().join("target/release").join(BIN),
    };
    sh.copy_file(&binary_src, dist_dir.join(BIN))?;

    let version = env!("CARGO_PKG_VERSION");
    let archive_name = format!("{}-{}.tar.gz", BIN, version);

    cmd!(sh, "tar -czf {archive_name} -C dist {BIN}")
        .run()
        .context("Failed to create tarball")?;

    println!("✅ Distribution package created: {}", archive_name);
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔍 Running CI checks...");

    println!("\n📝 Checking formatting...");
    format(sh, true)?;

    println!("\n🔧 Running clippy...");
    clippy(sh)?;

    println!("\n🧪 Running tests...");
    test(sh, false)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("✅ Code formatting is correct");
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
        println!("✅ Code formatted");
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --all-targets --all-features -- -D warnings").run()?;
    println!("✅ Clippy checks passed");
    Ok(())
}

fn project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .to_path_buf()
}
