use alloy::{
    json_abi::JsonAbi,
    sol,
};
use std::fmt;

pub mod raffle_types {
    use super::*;

    sol! {
        #[sol(rpc)]
        #[derive(Debug)]
        contract Raffle {
            event HasParticipated(address indexed player);
            event RequestedRaffleWinner(uint256 indexed requestId);
            event WinnerPicked(address indexed winner);

            constructor(
                address vrfCoordinatorV2,
                uint256 participationFee,
                bytes32 gasLane,
                uint64 subscriptionId,
                uint32 callBackGasLimit,
                uint256 interval
            );

            function participate() external payable;
            function checkUpkeep(bytes calldata checkData)
                external
                view
                returns (bool upkeepNeeded, bytes memory performData);
            function performUpkeep(bytes calldata performData) external;

            function getParticipationFee() external view returns (uint256);
            function getNumberOfPlayers() external view returns (uint256);
            function getPlayer(uint256 index) external view returns (address);
            function getRaffleState() external view returns (uint8);
            function getWinner() external view returns (address);
            function getTimeInterval() external view returns (uint256);
            function getLastTimeStamp() external view returns (uint256);
            function getCallBackGasLimit() external view returns (uint32);
        }
    }
}

pub mod vrf_mock_types {
    use super::*;

    sol! {
        #[sol(rpc)]
        #[derive(Debug)]
        contract VRFCoordinatorV2Mock {
            event SubscriptionCreated(uint64 indexed subId, address owner);

            constructor(uint96 baseFee, uint96 gasPriceLink);

            function createSubscription() external returns (uint64 subId);
            function fundSubscription(uint64 subId, uint96 amount) external;
        }
    }
}

pub mod proxy_types {
    use super::*;

    sol! {
        /// UUPS implementations expose the upgrade entry point themselves.
        #[sol(rpc)]
        #[derive(Debug)]
        contract UpgradeableProxy {
            function upgradeTo(address newImplementation) external;
        }

        /// Admin contract of a transparent proxy.
        #[sol(rpc)]
        #[derive(Debug)]
        contract ProxyAdmin {
            function upgrade(address proxy, address implementation) external;
        }
    }
}

/// EIP-1967 storage slot holding the implementation address of a proxy.
pub const IMPLEMENTATION_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";
/// EIP-1967 storage slot holding the admin address of a transparent proxy.
pub const ADMIN_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";

/// Functions the client calls; a deployed ABI missing any of them is unusable.
pub const REQUIRED_FUNCTIONS: [&str; 6] = [
    "participate",
    "getParticipationFee",
    "getNumberOfPlayers",
    "getPlayer",
    "getRaffleState",
    "getWinner",
];

pub const REQUIRED_EVENTS: [&str; 1] = ["WinnerPicked"];

/// Round state as reported by `getRaffleState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    Open,
    Calculating,
    Unknown(u8),
}

impl From<u8> for RaffleState {
    fn from(raw: u8) -> Self {
        match raw {
            0 => RaffleState::Open,
            1 => RaffleState::Calculating,
            other => RaffleState::Unknown(other),
        }
    }
}

impl fmt::Display for RaffleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaffleState::Open => write!(f, "Open"),
            RaffleState::Calculating => write!(f, "Calculating"),
            RaffleState::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// Names of required functions and events absent from `abi`.
pub fn missing_entries(abi: &JsonAbi) -> Vec<String> {
    let functions = REQUIRED_FUNCTIONS
        .iter()
        .filter(|name| !abi.functions.contains_key(**name))
        .map(|name| format!("function {name}"));
    let events = REQUIRED_EVENTS
        .iter()
        .filter(|name| !abi.events.contains_key(**name))
        .map(|name| format!("event {name}"));
    functions.chain(events).collect()
}

pub fn parse_abi(value: serde_json::Value) -> Result<JsonAbi, serde_json::Error> {
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::{
        primitives::{
            U256,
            keccak256,
        },
        sol_types::{
            SolCall,
            SolEvent,
        },
    };
    use raffle_types::Raffle;

    fn abi_fixture(functions: &[&str], events: &[&str]) -> serde_json::Value {
        let mut entries: Vec<serde_json::Value> = functions
            .iter()
            .map(|name| {
                serde_json::json!({
                    "type": "function",
                    "name": name,
                    "inputs": [],
                    "outputs": [],
                    "stateMutability": "view"
                })
            })
            .collect();
        entries.extend(events.iter().map(|name| {
            serde_json::json!({
                "type": "event",
                "name": name,
                "inputs": [],
                "anonymous": false
            })
        }));
        serde_json::Value::Array(entries)
    }

    #[test]
    fn missing_entries__empty_for_complete_abi() {
        // given
        let abi = parse_abi(abi_fixture(&REQUIRED_FUNCTIONS, &REQUIRED_EVENTS)).unwrap();

        // when
        let missing = missing_entries(&abi);

        // then
        assert!(missing.is_empty(), "unexpected missing entries: {missing:?}");
    }

    #[test]
    fn missing_entries__lists_absent_functions_and_events() {
        // given
        let abi = parse_abi(abi_fixture(&["participate", "getParticipationFee"], &[]))
            .unwrap();

        // when
        let missing = missing_entries(&abi);

        // then
        let expected = vec![
            "function getNumberOfPlayers".to_string(),
            "function getPlayer".to_string(),
            "function getRaffleState".to_string(),
            "function getWinner".to_string(),
            "event WinnerPicked".to_string(),
        ];
        assert_eq!(expected, missing);
    }

    #[test]
    fn bindings__selectors_match_solidity_signatures() {
        assert_eq!(
            &keccak256("participate()")[..4],
            &Raffle::participateCall::SELECTOR[..]
        );
        assert_eq!(
            &keccak256("getPlayer(uint256)")[..4],
            &Raffle::getPlayerCall::SELECTOR[..]
        );
        assert_eq!(
            &keccak256("getWinner()")[..4],
            &Raffle::getWinnerCall::SELECTOR[..]
        );
        assert_eq!("WinnerPicked(address)", Raffle::WinnerPicked::SIGNATURE);
    }

    #[test]
    fn missing_entries__accepts_deployed_raffle_surface() {
        // given
        let deployed_functions = [
            "participate",
            "checkUpkeep",
            "performUpkeep",
            "fulfillRandomWords",
            "getParticipationFee",
            "getNumberOfPlayers",
            "getPlayer",
            "getRaffleState",
            "getWinner",
            "getLastTimeStamp",
            "getTimeInterval",
            "getCallBackGasLimit",
        ];
        let deployed_events = ["HasParticipated", "RequestedRaffleWinner", "WinnerPicked"];
        let abi = parse_abi(abi_fixture(&deployed_functions, &deployed_events)).unwrap();

        // when
        let missing = missing_entries(&abi);

        // then
        assert!(missing.is_empty(), "deployed Raffle ABI rejected: {missing:?}");
    }

    #[test]
    fn required_functions__are_all_bound() {
        use alloy::json_abi::Function;
        let bound = [
            Raffle::participateCall::SIGNATURE,
            Raffle::getParticipationFeeCall::SIGNATURE,
            Raffle::getNumberOfPlayersCall::SIGNATURE,
            Raffle::getPlayerCall::SIGNATURE,
            Raffle::getRaffleStateCall::SIGNATURE,
            Raffle::getWinnerCall::SIGNATURE,
        ];

        let names: Vec<String> = bound
            .iter()
            .map(|signature| Function::parse(signature).unwrap().name)
            .collect();

        assert_eq!(REQUIRED_FUNCTIONS.to_vec(), names);
    }

    #[test]
    fn proxy_slots__match_eip1967_derivation() {
        // slot = keccak256("eip1967.proxy.<name>") - 1
        let implementation =
            U256::from_be_bytes(keccak256("eip1967.proxy.implementation").0) - U256::from(1);
        let admin = U256::from_be_bytes(keccak256("eip1967.proxy.admin").0) - U256::from(1);

        assert_eq!(IMPLEMENTATION_SLOT.parse::<U256>().unwrap(), implementation);
        assert_eq!(ADMIN_SLOT.parse::<U256>().unwrap(), admin);
    }

    #[test]
    fn raffle_state__maps_known_discriminants() {
        assert_eq!(RaffleState::Open, RaffleState::from(0));
        assert_eq!(RaffleState::Calculating, RaffleState::from(1));
        assert_eq!(RaffleState::Unknown(7), RaffleState::from(7));
    }
}
