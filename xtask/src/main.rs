//! Build-and-run tasks: cross-compile the kernel and boot it under QEMU.

use std::process::Command;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const TARGET: &str = "aarch64-unknown-none";

#[derive(Parser)]
#[command(name = "xtask", about = "Caldera build and run tasks")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Build the kernel for aarch64-unknown-none
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Build the kernel, then boot it with a virtio-gpu device
    Run {
        #[arg(long)]
        release: bool,
        /// Skip the display window; serial console only
        #[arg(long)]
        headless: bool,
    },
}

fn main() -> Result<()> {
    match Cli::parse().task {
        Task::Build { release } => {
            build(release)?;
        }
        Task::Run { release, headless } => {
            let kernel = build(release)?;
            run(&kernel, headless)?;
        }
    }
    Ok(())
}

fn build(release: bool) -> Result<String> {
    let mut cmd = Command::new("cargo");
    cmd.args(["build", "-p", "caldera-kernel", "--target", TARGET]);
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status().context("failed to spawn cargo")?;
    if !status.success() {
        bail!("kernel build failed");
    }
    let profile = if release { "release" } else { "debug" };
    Ok(format!("target/{TARGET}/{profile}/caldera-kernel"))
}

fn run(kernel: &str, headless: bool) -> Result<()> {
    let mut cmd = Command::new("qemu-system-aarch64");
    cmd.args([
        "-M",
        "virt",
        "-cpu",
        "cortex-a53",
        "-m",
        "256M",
        "-kernel",
        kernel,
        "-device",
        "virtio-gpu-device",
        "-serial",
        "mon:stdio",
    ]);
    if headless {
        cmd.args(["-display", "none"]);
    }
    let status = cmd
        .status()
        .context("failed to spawn qemu-system-aarch64")?;
    if !status.success() {
        bail!("qemu exited with {status}");
    }
    Ok(())
}
