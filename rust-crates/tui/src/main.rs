use color_eyre::eyre::{
    Result,
    eyre,
};
use deployments::{
    ABI_FILE,
    ADDRESSES_FILE,
    DEPLOYMENTS_ROOT,
};
use lottery_client::wallets;
use std::path::PathBuf;

mod client;
mod ui;

struct CliArgs {
    config: client::AppConfig,
    log_dir: PathBuf,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: lottery-tui --wallet <name> [--wallet <name> ...] [--rpc-url <url>]\n\
         [--wallet-dir <path>] [--registry <path>] [--abi <path>] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --rpc-url <url>     JSON-RPC endpoint (default {})\n\
           --wallet <name>     Keystore to unlock; repeat to switch accounts with 'a'\n\
           --wallet-dir <path> Keystore directory (defaults to ~/.foundry/keystores)\n\
           --registry <path>   Contract address registry (default {}/{})\n\
           --abi <path>        Contract ABI file (default {}/{})\n\
           --log-dir <path>    Directory for the daily log file (default {})",
        client::DEFAULT_RPC_URL,
        DEPLOYMENTS_ROOT,
        ADDRESSES_FILE,
        DEPLOYMENTS_ROOT,
        ABI_FILE,
        DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

const DEFAULT_LOG_DIR: &str = "logs";

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut rpc_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_names: Vec<String> = Vec::new();
    let mut registry: Option<PathBuf> = None;
    let mut abi: Option<PathBuf> = None;
    let mut log_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if rpc_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                rpc_url = Some(url);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_names.contains(&name) {
                    return Err(eyre!("--wallet {name} given twice"));
                }
                wallet_names.push(name);
            }
            "--registry" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--registry requires a path argument"))?;
                if registry.is_some() {
                    return Err(eyre!("--registry may only be specified once"));
                }
                registry = Some(expand(&path));
            }
            "--abi" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--abi requires a path argument"))?;
                if abi.is_some() {
                    return Err(eyre!("--abi may only be specified once"));
                }
                abi = Some(expand(&path));
            }
            "--log-dir" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                if log_dir.is_some() {
                    return Err(eyre!("--log-dir may only be specified once"));
                }
                log_dir = Some(expand(&path));
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    if wallet_names.is_empty() {
        return Err(eyre!("Specify --wallet <name> to select a keystore"));
    }
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let deployments_root = PathBuf::from(DEPLOYMENTS_ROOT);

    Ok(CliArgs {
        config: client::AppConfig {
            rpc_url: rpc_url.unwrap_or_else(|| client::DEFAULT_RPC_URL.to_string()),
            wallets: client::WalletConfig::Keystore {
                names: wallet_names,
                dir,
            },
            registry_path: registry.unwrap_or_else(|| deployments_root.join(ADDRESSES_FILE)),
            abi_path: abi.unwrap_or_else(|| deployments_root.join(ABI_FILE)),
        },
        log_dir: log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let CliArgs { config, log_dir } = parse_cli_args()?;
    let _guard = client::init_tracing(&log_dir);
    tracing::info!(rpc_url = %config.rpc_url, "starting lottery client");
    client::run_app(config).await
}
