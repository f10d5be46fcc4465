use alloy::{
    primitives::{
        Address,
        B256,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
    },
    rpc::types::TransactionReceipt,
};
use anyhow::{
    Context,
    Result,
    anyhow,
};
use lottery_abi::{
    ADMIN_SLOT,
    IMPLEMENTATION_SLOT,
    proxy_types::{
        ProxyAdmin,
        UpgradeableProxy,
    },
};
use tracing::info;

/// How the implementation behind a proxy gets swapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeRoute {
    /// Transparent proxy; its admin contract performs the upgrade.
    Admin(Address),
    /// UUPS proxy; the implementation exposes `upgradeTo` itself.
    Uups,
}

impl UpgradeRoute {
    pub fn from_admin_slot(word: U256) -> Self {
        match slot_address(word) {
            Some(admin) => UpgradeRoute::Admin(admin),
            None => UpgradeRoute::Uups,
        }
    }
}

/// Address held by an EIP-1967 slot. `None` for an empty slot.
pub fn slot_address(word: U256) -> Option<Address> {
    let address = Address::from_word(B256::from(word.to_be_bytes::<32>()));
    (!address.is_zero()).then_some(address)
}

async fn read_slot(provider: &DynProvider, proxy: Address, slot: &str) -> Result<U256> {
    let slot: U256 = slot.parse().context("parsing EIP-1967 slot")?;
    provider
        .get_storage_at(proxy, slot)
        .await
        .with_context(|| format!("reading storage of {proxy}"))
}

pub async fn implementation_of(provider: &DynProvider, proxy: Address) -> Result<Option<Address>> {
    Ok(slot_address(read_slot(provider, proxy, IMPLEMENTATION_SLOT).await?))
}

/// Points `proxy` at `implementation` and checks the implementation slot afterwards.
pub async fn upgrade_proxy(
    provider: &DynProvider,
    proxy: Address,
    implementation: Address,
    confirmations: u64,
) -> Result<TransactionReceipt> {
    let route = UpgradeRoute::from_admin_slot(read_slot(provider, proxy, ADMIN_SLOT).await?);
    info!(%proxy, %implementation, ?route, "upgrading proxy");
    let pending = match route {
        UpgradeRoute::Admin(admin) => {
            ProxyAdmin::new(admin, provider.clone())
                .upgrade(proxy, implementation)
                .send()
                .await
        }
        UpgradeRoute::Uups => {
            UpgradeableProxy::new(proxy, provider.clone())
                .upgradeTo(implementation)
                .send()
                .await
        }
    }
    .context("sending upgrade transaction")?;
    let receipt = pending
        .with_required_confirmations(confirmations)
        .get_receipt()
        .await
        .context("waiting for upgrade receipt")?;
    if !receipt.status() {
        return Err(anyhow!(
            "upgrade transaction {} reverted",
            receipt.transaction_hash
        ));
    }

    let current = implementation_of(provider, proxy).await?;
    if current != Some(implementation) {
        return Err(anyhow!(
            "proxy {proxy} points at {current:?} after the upgrade, expected {implementation}"
        ));
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn word_of(address: Address) -> U256 {
        U256::from_be_bytes(address.into_word().0)
    }

    #[test]
    fn slot_address__empty_slot_is_none() {
        assert_eq!(None, slot_address(U256::ZERO));
    }

    #[test]
    fn slot_address__reads_right_aligned_address() {
        let implementation = Address::repeat_byte(0x42);

        assert_eq!(Some(implementation), slot_address(word_of(implementation)));
    }

    #[test]
    fn from_admin_slot__picks_route_by_admin_presence() {
        // given
        let admin = Address::repeat_byte(0xad);

        // when
        let transparent = UpgradeRoute::from_admin_slot(word_of(admin));
        let uups = UpgradeRoute::from_admin_slot(U256::ZERO);

        // then
        assert_eq!(UpgradeRoute::Admin(admin), transparent);
        assert_eq!(UpgradeRoute::Uups, uups);
    }
}
