use alloy::signers::local::PrivateKeySigner;
use anyhow::{
    Context,
    Result,
    anyhow,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::path::{
    Path,
    PathBuf,
};

pub fn default_keystore_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_keystore_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_keystore_dir(),
    }
}

/// `<dir>/<name>` or `<dir>/<name>.json`, whichever exists.
pub fn keystore_path(dir: &Path, name: &str) -> Result<PathBuf> {
    [dir.join(name), dir.join(format!("{name}.json"))]
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow!("Keystore '{name}' not found in {}", dir.display()))
}

pub fn signer_from_private_key(raw: &str) -> Result<PrivateKeySigner> {
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(cleaned);
    let bytes = hex::decode(cleaned).context("decoding private key")?;
    if bytes.len() != 32 {
        anyhow::bail!("private key must be 32 bytes (64 hex chars)");
    }
    PrivateKeySigner::from_slice(&bytes).context("private key is not a valid secp256k1 scalar")
}

pub fn unlock_keystore(path: &Path, name: &str) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for keystore '{name}': ");
    let password = prompt_password(prompt).context("Failed to read keystore password")?;
    let secret = decrypt_key(path, password.as_bytes())
        .map_err(|_| anyhow!("Invalid password for keystore '{name}'"))?;
    PrivateKeySigner::from_slice(&secret)
        .with_context(|| format!("Keystore '{name}' contained unsupported key material"))
}

/// Private key wins over a keystore; one of the two is required.
pub fn load_signer(
    private_key: Option<&str>,
    wallet: Option<&str>,
    wallet_dir: Option<&str>,
) -> Result<PrivateKeySigner> {
    if let Some(key) = private_key {
        return signer_from_private_key(key);
    }
    let name = wallet.ok_or_else(|| {
        anyhow!("Provide --private-key (or PRIVATE_KEY) or --wallet <keystore name>")
    })?;
    let dir = resolve_keystore_dir(wallet_dir).context("resolving keystore directory")?;
    let path = keystore_path(&dir, name)?;
    unlock_keystore(&path, name)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    // first default hardhat/anvil account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn signer_from_private_key__derives_dev_account() {
        let signer = signer_from_private_key(DEV_KEY).unwrap();

        assert_eq!(DEV_ADDRESS, signer.address().to_checksum(None));
    }

    #[test]
    fn signer_from_private_key__rejects_short_key() {
        let result = signer_from_private_key("0xdeadbeef");

        assert!(result.is_err());
    }

    #[test]
    fn load_signer__prefers_private_key_over_keystore() {
        let signer = load_signer(Some(DEV_KEY), Some("missing"), Some("/nonexistent")).unwrap();

        assert_eq!(DEV_ADDRESS, signer.address().to_checksum(None));
    }

    #[test]
    fn keystore_path__finds_file_with_or_without_extension() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        std::fs::write(dir.path().join("deployer"), "{}").unwrap();
        std::fs::write(dir.path().join("alice.json"), "{}").unwrap();

        // when
        let plain = keystore_path(dir.path(), "deployer").unwrap();
        let json = keystore_path(dir.path(), "alice").unwrap();
        let missing = keystore_path(dir.path(), "bob");

        // then
        assert_eq!(dir.path().join("deployer"), plain);
        assert_eq!(dir.path().join("alice.json"), json);
        assert!(missing.is_err());
    }
}
