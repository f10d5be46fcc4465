mod artifact;
mod proxy;
mod wallets;

use alloy::{
    network::{
        EthereumWallet,
        TransactionBuilder,
    },
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
        aliases::U96,
        utils::parse_ether,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::{
        TransactionReceipt,
        TransactionRequest,
    },
    sol_types::SolConstructor,
};
use anyhow::{
    Context,
    Result,
    anyhow,
};
use clap::{
    Args,
    Parser,
    Subcommand,
};
use deployments::{
    DEPLOYMENTS_ROOT,
    DeploymentRecord,
    DeploymentStore,
    NetworkConfig,
    networks::{
        MOCK_BASE_FEE_ETHER,
        MOCK_GAS_PRICE_LINK,
        MOCK_SUBSCRIPTION_FUND_ETHER,
    },
};
use lottery_abi::{
    raffle_types::Raffle,
    vrf_mock_types::VRFCoordinatorV2Mock,
};
use std::path::PathBuf;
use tracing::{
    info,
    warn,
};

use crate::artifact::Artifact;

const DEFAULT_RAFFLE_ARTIFACT: &str = "artifacts/contracts/Raffle.sol/Raffle.json";
const DEFAULT_VRF_MOCK_ARTIFACT: &str =
    "artifacts/contracts/test/VRFCoordinatorV2Mock.sol/VRFCoordinatorV2Mock.json";
const DEFAULT_UPGRADE_ARTIFACT: &str = "artifacts/contracts/RaffleV2.sol/RaffleV2.json";

#[derive(Parser, Debug)]
#[command(
    name = "lottery-deploy",
    about = "Deploy the raffle contract and maintain the contract address registry",
    version
)]
struct Cli {
    /// Directory holding the address registry, ABI file and deployment log
    #[arg(long, global = true, default_value = DEPLOYMENTS_ROOT)]
    deployments_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy Raffle (and the VRF coordinator mock on the local chain)
    Deploy(DeployArgs),
    /// Point the registered proxy at a new implementation
    Upgrade(UpgradeArgs),
    /// Record an address deployed elsewhere
    Register {
        /// Chain id, decimal or 0x-prefixed hex
        #[arg(long)]
        chain_id: String,
        #[arg(long)]
        address: String,
        /// Artifact whose ABI should be written next to the registry
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Print the registry and the latest deployment per chain
    Show,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// JSON-RPC endpoint (defaults to the network's default, if any)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Network name from the built-in table; inferred from the chain id when omitted
    #[arg(long)]
    network: Option<String>,

    /// Hex private key of the deployer
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Keystore name, used when no private key is given
    #[arg(long)]
    wallet: Option<String>,

    /// Keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,
}

#[derive(Args, Debug)]
struct DeployArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Compiled Raffle artifact
    #[arg(long, default_value = DEFAULT_RAFFLE_ARTIFACT)]
    artifact: PathBuf,

    /// Compiled VRFCoordinatorV2Mock artifact (local chain only)
    #[arg(long, default_value = DEFAULT_VRF_MOCK_ARTIFACT)]
    vrf_mock_artifact: PathBuf,

    /// Deploy even if a live contract is registered or the bytecode is unchanged
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct UpgradeArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Compiled artifact of the new implementation
    #[arg(long, default_value = DEFAULT_UPGRADE_ARTIFACT)]
    artifact: PathBuf,
}

/// Signing provider bound to a known network.
struct Connection {
    provider: DynProvider,
    network: &'static NetworkConfig,
    rpc_url: String,
    chain_key: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let root = PathBuf::from(shellexpand::tilde(&cli.deployments_dir).into_owned());
    let store = DeploymentStore::open(root).context("opening deployment store")?;

    match cli.command {
        Command::Deploy(args) => deploy(&store, args).await,
        Command::Upgrade(args) => upgrade(&store, args).await,
        Command::Register {
            chain_id,
            address,
            artifact,
        } => register(&store, &chain_id, &address, artifact),
        Command::Show => show(&store),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn register(
    store: &DeploymentStore,
    chain_id: &str,
    address: &str,
    artifact: Option<PathBuf>,
) -> Result<()> {
    let chain_id = deployments::normalize_chain_id(chain_id)?;
    let added = store
        .record_address(&chain_id, address)
        .context("recording contract address")?;
    if added {
        info!(%chain_id, %address, "address registered");
    } else {
        info!(%chain_id, %address, "address already registered");
    }
    if let Some(path) = artifact {
        let artifact = Artifact::load(&path)?;
        store.write_abi(&artifact.abi).context("writing contract ABI")?;
        info!(contract = artifact.name(), path = %store.abi_path().display(), "ABI written");
    }
    Ok(())
}

fn show(store: &DeploymentStore) -> Result<()> {
    let registry = store.load_registry()?;
    if registry.is_empty() {
        println!("No contracts registered in {}", store.registry_path().display());
        return Ok(());
    }
    for (chain_id, addresses) in registry.chains() {
        let network = chain_id
            .parse::<u64>()
            .ok()
            .and_then(deployments::network_config)
            .map(|n| n.name)
            .unwrap_or("unknown network");
        println!("chain {chain_id} ({network})");
        for (i, address) in addresses.iter().enumerate() {
            let marker = if i == 0 { "*" } else { " " };
            println!("  {marker} {address}");
        }
        if let Some(record) = store.latest_record(chain_id)? {
            println!(
                "    last deployed {} at block {} (bytecode {})",
                record.deployed_at,
                record
                    .deployment_block
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| String::from("?")),
                record.bytecode_hash
            );
        }
    }
    Ok(())
}

async fn connect(args: &ConnectionArgs) -> Result<Connection> {
    let signer = wallets::load_signer(
        args.private_key.as_deref(),
        args.wallet.as_deref(),
        args.wallet_dir.as_deref(),
    )?;
    let deployer = signer.address();

    let named = match args.network.as_deref() {
        Some(name) => Some(
            deployments::network_by_name(name)
                .ok_or_else(|| anyhow!("unknown network '{name}'"))?,
        ),
        None => None,
    };
    let rpc_url = args
        .rpc_url
        .clone()
        .or_else(|| named.and_then(|n| n.default_rpc_url).map(str::to_string))
        .ok_or_else(|| anyhow!("--rpc-url is required for this network"))?;

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url.parse().context("parsing RPC URL")?)
        .erased();
    let chain_id = provider
        .get_chain_id()
        .await
        .context("fetching chain id")?;
    let network = match named {
        Some(network) if network.chain_id != chain_id => {
            return Err(anyhow!(
                "--network {} expects chain {}, but {rpc_url} reports {chain_id}",
                network.name,
                network.chain_id
            ));
        }
        Some(network) => network,
        None => deployments::network_config(chain_id)
            .ok_or_else(|| anyhow!("no network configuration for chain {chain_id}"))?,
    };
    info!(%network, %deployer, %rpc_url, "connected");
    Ok(Connection {
        provider,
        network,
        rpc_url,
        chain_key: chain_id.to_string(),
    })
}

async fn has_code(provider: &DynProvider, address: Address) -> Result<bool> {
    let code = provider
        .get_code_at(address)
        .await
        .with_context(|| format!("fetching code at {address}"))?;
    Ok(!code.is_empty())
}

/// A logged deployment is reused only if its bytecode matches and it still
/// exists on chain; a restarted local node keeps the log but loses the code.
fn should_reuse(previous: &DeploymentRecord, bytecode_hash: &str, code_present: bool) -> bool {
    previous.is_compatible_with_hash(bytecode_hash) && code_present
}

/// Forgets registered addresses without code and returns the first live one.
async fn live_registered_address(
    store: &DeploymentStore,
    conn: &Connection,
) -> Result<Option<Address>> {
    let registry = store.load_registry()?;
    let mut live = None;
    for raw in registry.addresses(&conn.chain_key) {
        let address = raw
            .parse::<Address>()
            .with_context(|| format!("registry entry {raw} is not an address"))?;
        if has_code(&conn.provider, address).await? {
            live.get_or_insert(address);
        } else {
            warn!(%address, chain_id = %conn.chain_key, "no code at registered address, removing it");
            store.remove_address(&conn.chain_key, raw)?;
        }
    }
    Ok(live)
}

async fn deploy(store: &DeploymentStore, args: DeployArgs) -> Result<()> {
    let conn = connect(&args.connection).await?;
    let network = conn.network;
    let chain_key = conn.chain_key.clone();

    if let Some(current) = live_registered_address(store, &conn).await? {
        if !args.force {
            warn!(
                %current,
                chain_id = %chain_key,
                "a lottery is already registered for this chain; use `upgrade` for a new \
                 implementation or pass --force to deploy another contract"
            );
            println!("{current}");
            return Ok(());
        }
        warn!(
            %current,
            "the client keeps resolving the first registered address after this deployment"
        );
    }

    let raffle_artifact = Artifact::load(&args.artifact)?;
    let bytecode_hash = deployments::compute_bytecode_hash(&raffle_artifact.bytecode);
    if !args.force
        && let Some(previous) = store.latest_record(&chain_key)?
        && previous.is_compatible_with_hash(&bytecode_hash)
    {
        let address = previous
            .contract_address
            .parse::<Address>()
            .context("parsing logged contract address")?;
        if should_reuse(&previous, &bytecode_hash, has_code(&conn.provider, address).await?) {
            info!(
                %address,
                "bytecode unchanged since last deployment; reusing it (pass --force to redeploy)"
            );
            store.record_address(&chain_key, &previous.contract_address)?;
            store.write_abi(&raffle_artifact.abi)?;
            println!("{address}");
            return Ok(());
        }
        warn!(%address, "last logged deployment has no code on chain, deploying again");
    }

    let (coordinator, subscription_id) = if network.is_local() {
        let mock_artifact = Artifact::load(&args.vrf_mock_artifact)?;
        deploy_vrf_mock(&conn.provider, &mock_artifact, network).await?
    } else {
        let coordinator = network
            .vrf_coordinator
            .ok_or_else(|| anyhow!("{network} has no VRF coordinator"))?
            .parse::<Address>()
            .context("parsing VRF coordinator address")?;
        let subscription_id = network
            .subscription_id
            .ok_or_else(|| anyhow!("{network} has no VRF subscription id"))?;
        (coordinator, subscription_id)
    };

    let constructor = Raffle::constructorCall {
        vrfCoordinatorV2: coordinator,
        participationFee: parse_ether(network.participation_fee_ether)
            .context("parsing participation fee")?,
        gasLane: network
            .key_hash
            .parse::<B256>()
            .context("parsing VRF key hash")?,
        subscriptionId: subscription_id,
        callBackGasLimit: network.callback_gas_limit,
        interval: U256::from(network.interval_seconds),
    };
    info!(contract = raffle_artifact.name(), "deploying");
    let receipt = deploy_contract(
        &conn.provider,
        raffle_artifact.deploy_code(&constructor.abi_encode()),
        network.block_confirmations,
    )
    .await
    .context("deploying Raffle")?;
    let raffle = receipt
        .contract_address
        .ok_or_else(|| anyhow!("Raffle deployment receipt has no contract address"))?;
    info!(%raffle, block = ?receipt.block_number, "Raffle deployed");

    if !network.is_local() {
        warn!(
            "add {raffle} as a consumer of VRF subscription {subscription_id} before the first draw"
        );
    }

    store
        .record_address(&chain_key, &raffle.to_string())
        .context("recording contract address")?;
    store
        .write_abi(&raffle_artifact.abi)
        .context("writing contract ABI")?;
    let mut record = DeploymentRecord::new(
        chain_key,
        raffle.to_string(),
        bytecode_hash,
        conn.rpc_url,
    );
    record.vrf_coordinator = Some(coordinator.to_string());
    record.subscription_id = Some(subscription_id);
    record.deployment_block = receipt.block_number;
    store.append(record).context("recording deployment")?;

    println!("{raffle}");
    info!(
        registry = %store.registry_path().display(),
        abi = %store.abi_path().display(),
        "frontend files updated"
    );
    Ok(())
}

/// Deploys a new implementation and points the first registered proxy at it.
async fn upgrade(store: &DeploymentStore, args: UpgradeArgs) -> Result<()> {
    let conn = connect(&args.connection).await?;
    let registry = store.load_registry()?;
    let proxy = registry
        .resolve(&conn.chain_key)
        .ok_or_else(|| {
            anyhow!(
                "no proxy registered for chain {}; has it been deployed?",
                conn.chain_key
            )
        })?
        .parse::<Address>()
        .context("parsing registered proxy address")?;
    let previous = proxy::implementation_of(&conn.provider, proxy)
        .await?
        .ok_or_else(|| anyhow!("{proxy} is not an EIP-1967 proxy (implementation slot empty)"))?;
    info!(%proxy, %previous, "current implementation");

    let artifact = Artifact::load(&args.artifact)?;
    let bytecode_hash = deployments::compute_bytecode_hash(&artifact.bytecode);
    info!(contract = artifact.name(), "deploying new implementation");
    // initialisation happens through the proxy, so no constructor arguments
    let receipt = deploy_contract(
        &conn.provider,
        artifact.deploy_code(&[]),
        conn.network.block_confirmations,
    )
    .await
    .context("deploying new implementation")?;
    let implementation = receipt
        .contract_address
        .ok_or_else(|| anyhow!("implementation deployment receipt has no contract address"))?;

    let receipt = proxy::upgrade_proxy(
        &conn.provider,
        proxy,
        implementation,
        conn.network.block_confirmations,
    )
    .await?;
    info!(%proxy, %implementation, block = ?receipt.block_number, "proxy upgraded");

    store
        .write_abi(&artifact.abi)
        .context("writing contract ABI")?;
    let mut record = DeploymentRecord::new(
        conn.chain_key,
        proxy.to_string(),
        bytecode_hash,
        conn.rpc_url,
    );
    record.deployment_block = receipt.block_number;
    store.append(record).context("recording upgrade")?;
    println!("{implementation}");
    Ok(())
}

async fn deploy_contract(
    provider: &DynProvider,
    code: Bytes,
    confirmations: u64,
) -> Result<TransactionReceipt> {
    let tx = TransactionRequest::default().with_deploy_code(code);
    let receipt = provider
        .send_transaction(tx)
        .await
        .context("sending deployment transaction")?
        .with_required_confirmations(confirmations)
        .get_receipt()
        .await
        .context("waiting for deployment receipt")?;
    if !receipt.status() {
        return Err(anyhow!(
            "deployment transaction {} reverted",
            receipt.transaction_hash
        ));
    }
    Ok(receipt)
}

/// Deploys the coordinator mock, then creates and funds a subscription on it.
async fn deploy_vrf_mock(
    provider: &DynProvider,
    artifact: &Artifact,
    network: &NetworkConfig,
) -> Result<(Address, u64)> {
    info!("local network detected, deploying VRF coordinator mock");
    let constructor = VRFCoordinatorV2Mock::constructorCall {
        baseFee: to_u96(parse_ether(MOCK_BASE_FEE_ETHER)?)?,
        gasPriceLink: U96::from(MOCK_GAS_PRICE_LINK),
    };
    let receipt = deploy_contract(
        provider,
        artifact.deploy_code(&constructor.abi_encode()),
        network.block_confirmations,
    )
    .await
    .context("deploying VRFCoordinatorV2Mock")?;
    let address = receipt
        .contract_address
        .ok_or_else(|| anyhow!("mock deployment receipt has no contract address"))?;
    info!(%address, "VRFCoordinatorV2Mock deployed");

    let mock = VRFCoordinatorV2Mock::new(address, provider.clone());
    let receipt = mock
        .createSubscription()
        .send()
        .await
        .context("creating VRF subscription")?
        .get_receipt()
        .await
        .context("waiting for subscription receipt")?;
    let subscription_id = receipt
        .inner
        .logs()
        .iter()
        .find_map(|log| {
            log.log_decode::<VRFCoordinatorV2Mock::SubscriptionCreated>()
                .ok()
        })
        .map(|log| log.inner.data.subId)
        .ok_or_else(|| anyhow!("createSubscription emitted no SubscriptionCreated event"))?;

    mock.fundSubscription(
        subscription_id,
        to_u96(parse_ether(MOCK_SUBSCRIPTION_FUND_ETHER)?)?,
    )
    .send()
    .await
    .context("funding VRF subscription")?
    .get_receipt()
    .await
    .context("waiting for funding receipt")?;
    info!(subscription_id, "VRF subscription created and funded");
    Ok((address, subscription_id))
}

fn to_u96(value: U256) -> Result<U96> {
    let narrow = u128::try_from(value).map_err(|_| anyhow!("{value} does not fit in uint96"))?;
    U96::try_from(narrow).map_err(|_| anyhow!("{value} does not fit in uint96"))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn to_u96__accepts_ether_amounts() {
        let ten_ether = parse_ether("10").unwrap();

        let converted = to_u96(ten_ether).unwrap();

        assert_eq!(U96::from(10_000_000_000_000_000_000u128), converted);
    }

    #[test]
    fn to_u96__rejects_overflow() {
        let too_big = U256::from(1u8) << 96;

        assert!(to_u96(too_big).is_err());
    }

    #[test]
    fn raffle_constructor__encodes_six_static_words() {
        let hardhat = deployments::network_config(31337).unwrap();
        let constructor = Raffle::constructorCall {
            vrfCoordinatorV2: Address::repeat_byte(0x11),
            participationFee: parse_ether(hardhat.participation_fee_ether).unwrap(),
            gasLane: hardhat.key_hash.parse().unwrap(),
            subscriptionId: 1,
            callBackGasLimit: hardhat.callback_gas_limit,
            interval: U256::from(hardhat.interval_seconds),
        };

        let encoded = constructor.abi_encode();

        assert_eq!(6 * 32, encoded.len());
        assert_eq!(&[0x11; 20][..], &encoded[12..32]);
    }

    #[test]
    fn cli__deploy_reads_private_key_flag() {
        let cli = Cli::try_parse_from([
            "lottery-deploy",
            "deploy",
            "--network",
            "hardhat",
            "--private-key",
            "0x01",
        ])
        .unwrap();

        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };
        assert_eq!(Some("hardhat"), args.connection.network.as_deref());
        assert_eq!(Some("0x01"), args.connection.private_key.as_deref());
        assert!(!args.force);
        assert_eq!(DEPLOYMENTS_ROOT, cli.deployments_dir);
    }

    #[test]
    fn cli__upgrade_defaults_to_v2_artifact() {
        let cli = Cli::try_parse_from([
            "lottery-deploy",
            "upgrade",
            "--rpc-url",
            "http://127.0.0.1:8545",
        ])
        .unwrap();

        let Command::Upgrade(args) = cli.command else {
            panic!("expected upgrade command");
        };
        assert_eq!(PathBuf::from(DEFAULT_UPGRADE_ARTIFACT), args.artifact);
        assert_eq!(
            Some("http://127.0.0.1:8545"),
            args.connection.rpc_url.as_deref()
        );
    }

    #[test]
    fn should_reuse__requires_matching_bytecode_and_live_code() {
        // given
        let previous = DeploymentRecord::new(
            "31337",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "aa",
            "http://127.0.0.1:8545",
        );

        // when
        let live_same = should_reuse(&previous, "aa", true);
        let restarted_node = should_reuse(&previous, "aa", false);
        let changed_bytecode = should_reuse(&previous, "bb", true);

        // then
        assert!(live_same);
        assert!(!restarted_node);
        assert!(!changed_bytecode);
    }
}
