use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Lottery helper tasks (compile contracts, local deploy, clippy, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the Solidity contracts with Hardhat to refresh artifacts
    Compile,
    /// Compile, then deploy to the local node and update the frontend files
    DeployLocal {
        /// Skip the Hardhat compile step
        #[arg(long)]
        skip_compile: bool,
        #[arg(long, default_value = "http://127.0.0.1:8545")]
        rpc_url: String,
    },
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run the workspace tests
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Compile => compile_contracts(&root)?,
        Commands::DeployLocal {
            skip_compile,
            rpc_url,
        } => {
            if !skip_compile {
                compile_contracts(&root)?;
            }
            deploy_local(&root, &rpc_url)?;
        }
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test => run_tests(&root)?,
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn compile_contracts(root: &Path) -> Result<()> {
    let config = root.join("hardhat.config.js");
    ensure!(
        config.exists(),
        "missing Hardhat project at {}",
        root.display()
    );
    let mut cmd = Command::new("npx");
    cmd.arg("hardhat").arg("compile").current_dir(root);
    run_command(cmd, "npx hardhat compile")
}

/// Uses the first Hardhat dev account unless PRIVATE_KEY is already set.
fn deploy_local(root: &Path, rpc_url: &str) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("lottery-deploy")
        .arg("--")
        .arg("deploy")
        .arg("--network")
        .arg("hardhat")
        .arg("--rpc-url")
        .arg(rpc_url)
        .current_dir(root);
    if std::env::var_os("PRIVATE_KEY").is_none() {
        cmd.env(
            "PRIVATE_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
    }
    run_command(cmd, "lottery-deploy deploy --network hardhat")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")
}

fn run_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").arg("--workspace").current_dir(root);
    run_command(cmd, "cargo test --workspace")
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {label}");
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
