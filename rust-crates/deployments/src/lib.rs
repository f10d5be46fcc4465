use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub mod networks;
pub mod registry;

pub use networks::{
    NETWORKS,
    NetworkConfig,
    network_by_name,
    network_config,
};
pub use registry::{
    ChainRegistry,
    normalize_chain_id,
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
pub const ADDRESSES_FILE: &str = "contract_addresses.json";
pub const ABI_FILE: &str = "contract_abi.json";
const DEPLOYMENTS_FILE: &str = "deployments.json";

/// One entry of the deployment log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub chain_id: String,
    pub contract_address: String,
    pub bytecode_hash: String,
    pub network_url: String,
    #[serde(default)]
    pub vrf_coordinator: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<u64>,
    #[serde(default)]
    pub deployment_block: Option<u64>,
}

impl DeploymentRecord {
    pub fn new(
        chain_id: impl Into<String>,
        contract_address: impl Into<String>,
        bytecode_hash: impl Into<String>,
        network_url: impl Into<String>,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            chain_id: chain_id.into(),
            contract_address: contract_address.into(),
            bytecode_hash: bytecode_hash.into(),
            network_url: network_url.into(),
            vrf_coordinator: None,
            subscription_id: None,
            deployment_block: None,
        }
    }

    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.bytecode_hash == hash
    }
}

/// The `.deployments` directory: address registry, ABI file and deployment log.
#[derive(Clone, Debug)]
pub struct DeploymentStore {
    root: PathBuf,
}

impl DeploymentStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).with_context(|| {
                format!("Failed to create deployments directory {}", root.display())
            })?;
        }
        Ok(Self { root })
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(ADDRESSES_FILE)
    }

    pub fn abi_path(&self) -> PathBuf {
        self.root.join(ABI_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(DEPLOYMENTS_FILE)
    }

    pub fn load_registry(&self) -> Result<ChainRegistry> {
        ChainRegistry::load(self.registry_path())
    }

    /// Records `address` for `chain_id` and persists the registry.
    pub fn record_address(&self, chain_id: &str, address: &str) -> Result<bool> {
        let mut registry = self.load_registry()?;
        let changed = registry.record(chain_id, address)?;
        if changed {
            registry.save(self.registry_path())?;
        }
        Ok(changed)
    }

    /// Forgets `address` for `chain_id` and persists the registry.
    pub fn remove_address(&self, chain_id: &str, address: &str) -> Result<bool> {
        let mut registry = self.load_registry()?;
        let changed = registry.remove(chain_id, address)?;
        if changed {
            registry.save(self.registry_path())?;
        }
        Ok(changed)
    }

    pub fn write_abi(&self, abi: &serde_json::Value) -> Result<()> {
        write_abi(self.abi_path(), abi)
    }

    pub fn read_abi(&self) -> Result<Option<serde_json::Value>> {
        read_abi(self.abi_path())
    }

    pub fn load_log(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(self.log_path())
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load_log()?;
        records.push(record);
        write_records(self.log_path(), &records)
    }

    pub fn latest_record(&self, chain_id: &str) -> Result<Option<DeploymentRecord>> {
        let key = normalize_chain_id(chain_id)?;
        Ok(self
            .load_log()?
            .into_iter()
            .rev()
            .find(|record| record.chain_id == key))
    }
}

pub fn compute_bytecode_hash(bytecode: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytecode.as_ref());
    format!("{:x}", hasher.finalize())
}

pub fn write_abi(path: impl AsRef<Path>, abi: &serde_json::Value) -> Result<()> {
    if !abi.is_array() {
        return Err(anyhow!("Contract ABI must be a JSON array"));
    }
    let json = serde_json::to_vec_pretty(abi).context("Failed to serialize contract ABI")?;
    fs::write(path.as_ref(), json).with_context(|| {
        format!("Failed to write contract ABI to {}", path.as_ref().display())
    })?;
    Ok(())
}

pub fn read_abi(path: impl AsRef<Path>) -> Result<Option<serde_json::Value>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path)
        .with_context(|| format!("Failed to read contract ABI at {}", path.display()))?;
    let abi = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse contract ABI at {}", path.display()))?;
    Ok(Some(abi))
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read(path).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    if let Ok(records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(vec![record]);
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a list of deployments"
    ))
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn record_address__persists_registry_file() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::open(dir.path().join(".deployments")).unwrap();

        // when
        let first = store.record_address("31337", ADDRESS).unwrap();
        let second = store.record_address("31337", ADDRESS).unwrap();

        // then
        assert!(first);
        assert!(!second);
        let registry = ChainRegistry::load(store.registry_path()).unwrap();
        assert_eq!(Some(ADDRESS), registry.resolve("31337"));
    }

    #[test]
    fn remove_address__persists_registry_file() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::open(dir.path()).unwrap();
        store.record_address("31337", ADDRESS).unwrap();

        // when
        let removed = store.remove_address("31337", ADDRESS).unwrap();

        // then
        assert!(removed);
        assert!(store.load_registry().unwrap().is_empty());
        assert!(!store.remove_address("31337", ADDRESS).unwrap());
    }

    #[test]
    fn append__keeps_deployment_history_in_order() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::open(dir.path()).unwrap();
        let older = DeploymentRecord::new("31337", ADDRESS, "aa", "http://127.0.0.1:8545");
        let mut newer = older.clone();
        newer.bytecode_hash = "bb".to_string();

        // when
        store.append(older.clone()).unwrap();
        store.append(newer.clone()).unwrap();

        // then
        assert_eq!(vec![older, newer.clone()], store.load_log().unwrap());
        assert_eq!(Some(newer), store.latest_record("0x7a69").unwrap());
        assert_eq!(None, store.latest_record("4").unwrap());
    }

    #[test]
    fn write_abi__rejects_non_array_documents() {
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::open(dir.path()).unwrap();

        assert!(store.write_abi(&serde_json::json!({"abi": []})).is_err());
        assert_eq!(None, store.read_abi().unwrap());
    }

    #[test]
    fn write_abi__round_trips_through_read_abi() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::open(dir.path()).unwrap();
        let abi = serde_json::json!([{"type": "function", "name": "participate"}]);

        // when
        store.write_abi(&abi).unwrap();

        // then
        assert_eq!(Some(abi), store.read_abi().unwrap());
    }

    #[test]
    fn compute_bytecode_hash__is_hex_sha256() {
        let hash = compute_bytecode_hash(b"");

        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            hash
        );
    }
}
