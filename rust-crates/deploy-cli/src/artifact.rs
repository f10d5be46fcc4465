use alloy::primitives::Bytes;
use anyhow::{
    Context,
    Result,
    anyhow,
};
use serde::Deserialize;
use serde_json::Value;
use std::{
    fs,
    path::Path,
};

/// Compiled contract as emitted by Hardhat (`bytecode: "0x.."`) or Foundry
/// (`bytecode: { object: "0x.." }`).
#[derive(Clone, Debug)]
pub struct Artifact {
    pub contract_name: Option<String>,
    pub abi: Value,
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Plain(String),
    Object { object: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    abi: Value,
    bytecode: RawBytecode,
}

impl Artifact {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading artifact {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing artifact {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let artifact: RawArtifact = serde_json::from_str(raw)?;
        if !artifact.abi.is_array() {
            return Err(anyhow!("artifact abi must be a JSON array"));
        }
        let hex = match artifact.bytecode {
            RawBytecode::Plain(hex) | RawBytecode::Object { object: hex } => hex,
        };
        let bytecode: Bytes = hex
            .parse()
            .map_err(|e| anyhow!("artifact bytecode is not hex: {e}"))?;
        if bytecode.is_empty() {
            return Err(anyhow!(
                "artifact has no bytecode; is the contract abstract or an interface?"
            ));
        }
        Ok(Self {
            contract_name: artifact.contract_name,
            abi: artifact.abi,
            bytecode,
        })
    }

    pub fn name(&self) -> &str {
        self.contract_name.as_deref().unwrap_or("contract")
    }

    /// Creation code followed by ABI-encoded constructor arguments.
    pub fn deploy_code(&self, constructor_args: &[u8]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(constructor_args);
        code.into()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn parse__hardhat_artifact() {
        // given
        let raw = r#"{
            "contractName": "Raffle",
            "abi": [{"type": "function", "name": "participate", "inputs": [], "outputs": [], "stateMutability": "payable"}],
            "bytecode": "0x6080604052"
        }"#;

        // when
        let artifact = Artifact::parse(raw).unwrap();

        // then
        assert_eq!("Raffle", artifact.name());
        assert_eq!(5, artifact.bytecode.len());
        assert_eq!(1, artifact.abi.as_array().unwrap().len());
    }

    #[test]
    fn parse__foundry_artifact() {
        let raw = r#"{"abi": [], "bytecode": {"object": "0x60806040", "sourceMap": ""}}"#;

        let artifact = Artifact::parse(raw).unwrap();

        assert_eq!(4, artifact.bytecode.len());
        assert_eq!("contract", artifact.name());
    }

    #[test]
    fn parse__interface_without_bytecode_is_rejected() {
        let raw = r#"{"abi": [], "bytecode": "0x"}"#;

        let result = Artifact::parse(raw);

        assert!(result.is_err());
    }

    #[test]
    fn deploy_code__appends_constructor_arguments() {
        // given
        let artifact = Artifact::parse(r#"{"abi": [], "bytecode": "0x6080"}"#).unwrap();

        // when
        let code = artifact.deploy_code(&[0xaa, 0xbb]);

        // then
        assert_eq!(vec![0x60, 0x80, 0xaa, 0xbb], code.to_vec());
    }
}
