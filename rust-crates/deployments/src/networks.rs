use std::fmt;

pub const HARDHAT_CHAIN_ID: u64 = 31337;
pub const RINKEBY_CHAIN_ID: u64 = 4;

/// Raffle constructor parameters and deployment policy for a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: &'static str,
    /// Public networks need an explicit RPC endpoint.
    pub default_rpc_url: Option<&'static str>,
    /// `None` means a coordinator mock is deployed alongside the raffle.
    pub vrf_coordinator: Option<&'static str>,
    pub link_token: &'static str,
    /// Entry fee in ether, as a decimal string.
    pub participation_fee_ether: &'static str,
    pub key_hash: &'static str,
    pub subscription_id: Option<u64>,
    pub callback_gas_limit: u32,
    pub interval_seconds: u64,
    pub block_confirmations: u64,
}

impl NetworkConfig {
    pub fn is_local(&self) -> bool {
        self.vrf_coordinator.is_none()
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}

const KEY_HASH: &str =
    "0xd89b2bf150e3b9e13446986e571fb9cab24b13cea0a43ea20a6049a85cc807cc";
const LINK_TOKEN: &str = "0x01BE23585060835E02B77ef475b0Cc51aA1e0709";

pub const NETWORKS: [NetworkConfig; 2] = [
    NetworkConfig {
        chain_id: HARDHAT_CHAIN_ID,
        name: "hardhat",
        default_rpc_url: Some("http://127.0.0.1:8545"),
        vrf_coordinator: None,
        link_token: LINK_TOKEN,
        participation_fee_ether: "0.5",
        key_hash: KEY_HASH,
        subscription_id: None,
        callback_gas_limit: 400_000,
        interval_seconds: 30,
        block_confirmations: 1,
    },
    NetworkConfig {
        chain_id: RINKEBY_CHAIN_ID,
        name: "rinkeby",
        default_rpc_url: None,
        vrf_coordinator: Some("0x6168499c0cFfCaCD319c818142124B7A15E857ab"),
        link_token: LINK_TOKEN,
        participation_fee_ether: "0.01",
        key_hash: KEY_HASH,
        subscription_id: Some(8621),
        callback_gas_limit: 400_000,
        interval_seconds: 30,
        block_confirmations: 6,
    },
];

pub fn network_config(chain_id: u64) -> Option<&'static NetworkConfig> {
    NETWORKS.iter().find(|network| network.chain_id == chain_id)
}

pub fn network_by_name(name: &str) -> Option<&'static NetworkConfig> {
    NETWORKS
        .iter()
        .find(|network| network.name.eq_ignore_ascii_case(name))
}

/// Fee funded into a freshly created mock VRF subscription, in ether.
pub const MOCK_SUBSCRIPTION_FUND_ETHER: &str = "10";
/// `VRFCoordinatorV2Mock` constructor: base fee (ether) and gas price per LINK (wei).
pub const MOCK_BASE_FEE_ETHER: &str = "0.25";
pub const MOCK_GAS_PRICE_LINK: u64 = 1_000_000_000;

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn network_config__local_chain_uses_coordinator_mock() {
        let hardhat = network_config(HARDHAT_CHAIN_ID).unwrap();

        assert!(hardhat.is_local());
        assert_eq!(1, hardhat.block_confirmations);
    }

    #[test]
    fn network_config__public_chain_has_subscription() {
        let rinkeby = network_by_name("Rinkeby").unwrap();

        assert!(!rinkeby.is_local());
        assert_eq!(Some(8621), rinkeby.subscription_id);
        assert_eq!(6, rinkeby.block_confirmations);
    }

    #[test]
    fn network_config__unknown_chain_is_none() {
        assert!(network_config(1).is_none());
    }
}
