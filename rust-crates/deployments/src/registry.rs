use anyhow::{
    Context,
    Result,
    anyhow,
    ensure,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

/// Chain id → deployed contract addresses, oldest first.
///
/// Serialized as a flat JSON object, e.g. `{ "31337": ["0x5FbD..."] }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRegistry {
    entries: BTreeMap<String, Vec<String>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a registry file. A missing or blank file is an empty registry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path).with_context(|| {
            format!("Failed to read contract registry at {}", path.display())
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_slice(&data)
            .with_context(|| {
                format!("Failed to parse contract registry at {}", path.display())
            })?;

        let mut registry = Self::default();
        for (chain_id, addresses) in raw {
            for address in addresses {
                registry.record(&chain_id, &address).with_context(|| {
                    format!("Invalid registry entry for chain {chain_id}")
                })?;
            }
        }
        Ok(registry)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .context("Failed to serialize contract registry")?;
        fs::write(path.as_ref(), json).with_context(|| {
            format!(
                "Failed to write contract registry to {}",
                path.as_ref().display()
            )
        })?;
        Ok(())
    }

    /// First address recorded for `chain_id`, if any.
    pub fn resolve(&self, chain_id: &str) -> Option<&str> {
        let key = normalize_chain_id(chain_id).ok()?;
        self.entries
            .get(&key)
            .and_then(|addresses| addresses.first())
            .map(String::as_str)
    }

    pub fn addresses(&self, chain_id: &str) -> &[String] {
        normalize_chain_id(chain_id)
            .ok()
            .and_then(|key| self.entries.get(&key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Appends `address` under `chain_id` unless it is already listed.
    /// Returns whether the registry changed.
    pub fn record(&mut self, chain_id: &str, address: &str) -> Result<bool> {
        let key = normalize_chain_id(chain_id)?;
        validate_address(address)?;
        let addresses = self.entries.entry(key).or_default();
        if addresses
            .iter()
            .any(|known| known.eq_ignore_ascii_case(address))
        {
            return Ok(false);
        }
        addresses.push(address.to_string());
        Ok(true)
    }

    /// Drops `address` from `chain_id`, and the chain once it has no addresses left.
    /// Returns whether the registry changed.
    pub fn remove(&mut self, chain_id: &str, address: &str) -> Result<bool> {
        let key = normalize_chain_id(chain_id)?;
        let Some(addresses) = self.entries.get_mut(&key) else {
            return Ok(false);
        };
        let before = addresses.len();
        addresses.retain(|known| !known.eq_ignore_ascii_case(address));
        let changed = addresses.len() != before;
        if addresses.is_empty() {
            self.entries.remove(&key);
        }
        Ok(changed)
    }

    pub fn chains(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(chain_id, addresses)| (chain_id.as_str(), addresses.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

/// Accepts `"31337"` or `"0x7a69"` and returns the decimal form.
pub fn normalize_chain_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed
        .map(|id| id.to_string())
        .map_err(|e| anyhow!("Invalid chain id {raw:?}: {e}"))
}

fn validate_address(address: &str) -> Result<()> {
    let digits = address
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Contract address {address:?} must start with 0x"))?;
    ensure!(
        digits.len() == 40,
        "Contract address {address:?} must be 20 bytes (40 hex chars)"
    );
    hex::decode(digits)
        .with_context(|| format!("Contract address {address:?} is not valid hex"))?;
    Ok(())
}
