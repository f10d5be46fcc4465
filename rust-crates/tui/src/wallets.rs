use alloy::signers::local::PrivateKeySigner;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, sorted by name. A `.json` extension is optional.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.extension().and_then(|ext| ext.to_str()) {
            None | Some("json") => path.file_stem(),
            Some(_) => continue,
        };
        let name = name
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?;
        if name.starts_with('.') {
            continue;
        }
        wallets.push(WalletDescriptor::new(name, path.clone()));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_with_password(descriptor, &password)
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    PrivateKeySigner::from_slice(&secret).map_err(|e| {
        eyre!(
            "Wallet '{}' contained unsupported key material: {e}",
            descriptor.name
        )
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn touch(dir: &Path, file: &str) {
        fs::write(dir.join(file), "{}").unwrap();
    }

    #[test]
    fn list_wallets__accepts_plain_and_json_keystores() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        touch(dir.path(), "deployer");
        touch(dir.path(), "alice.json");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), ".DS_Store");
        fs::create_dir(dir.path().join("nested")).unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(vec!["alice", "deployer"], names);
    }

    #[test]
    fn list_wallets__missing_dir_is_empty() {
        let dir = TempDir::new("keystores").unwrap();

        let wallets = list_wallets(&dir.path().join("absent")).unwrap();

        assert!(wallets.is_empty());
    }

    #[test]
    fn find_wallet__unknown_name_errors() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        touch(dir.path(), "alice.json");

        // when
        let result = find_wallet(dir.path(), "bob");

        // then
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Wallet 'bob' not found"), "{message}");
    }

    // Web3 Secret Storage pbkdf2 test vector, password "testpassword".
    const PBKDF2_KEYSTORE: &str = r#"{
        "crypto": {
            "cipher": "aes-128-ctr",
            "cipherparams": {"iv": "6087dab2f9fdbbfaddc31a909735c1e6"},
            "ciphertext": "5318b4d5bcd28de64ee5559e671353e16f075ecae9f99c7a79a38af5f869aa46",
            "kdf": "pbkdf2",
            "kdfparams": {
                "c": 262144,
                "dklen": 32,
                "prf": "hmac-sha256",
                "salt": "ae3cd4e7013836a3df6bd7241b12db061dbe2c6785853cce422d148a624ce0bd"
            },
            "mac": "517ead924a9d0dc3124507e3393d175ce3ff7c1e96529c6c555ce9e51205e9b2"
        },
        "id": "3198bc9c-6672-5ab3-d995-4942343ae5b6",
        "version": 3
    }"#;

    #[test]
    fn unlock_with_password__decrypts_v3_keystore() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        fs::write(dir.path().join("alice.json"), PBKDF2_KEYSTORE).unwrap();
        let descriptor = find_wallet(dir.path(), "alice").unwrap();

        // when
        let signer = unlock_with_password(&descriptor, "testpassword").unwrap();
        let wrong = unlock_with_password(&descriptor, "wrong");

        // then
        let secret =
            alloy::hex::decode("7a28b5ba57c53603b0b07b56bba752f7784bf506fa95edc395f5cf6c7514fe9d")
                .unwrap();
        let expected = PrivateKeySigner::from_slice(&secret).unwrap();
        assert_eq!(expected.address(), signer.address());
        assert!(wrong.is_err());
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        let home = std::env::var("HOME").unwrap();

        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        assert_eq!(PathBuf::from(home).join("keys"), dir);
    }
}
