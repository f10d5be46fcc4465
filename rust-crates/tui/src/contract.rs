use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use futures::{
    StreamExt,
    stream::LocalBoxStream,
};
use lottery_abi::{
    RaffleState,
    raffle_types::Raffle,
};
use std::time::Duration;

const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParticipationReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WinnerAnnouncement {
    pub lottery: Address,
    pub winner: Address,
}

pub type WinnerStream = LocalBoxStream<'static, Result<WinnerAnnouncement>>;

/// Read/write access to a deployed raffle contract.
///
/// Every call names the contract address explicitly; the gateway itself is
/// bound to a chain connection, not to a deployment.
pub trait LotteryGateway {
    fn chain_id(&self) -> impl Future<Output = Result<u64>>;

    fn account_balance(&self, account: Address) -> impl Future<Output = Result<U256>>;

    fn participation_fee(&self, lottery: Address) -> impl Future<Output = Result<U256>>;

    fn number_of_players(&self, lottery: Address) -> impl Future<Output = Result<U256>>;

    fn has_participated(
        &self,
        lottery: Address,
        account: Address,
    ) -> impl Future<Output = Result<bool>>;

    fn raffle_state(&self, lottery: Address) -> impl Future<Output = Result<RaffleState>>;

    fn recent_winner(&self, lottery: Address) -> impl Future<Output = Result<Address>>;

    /// Sends `participate()` with `fee` attached and returns as soon as the
    /// node accepted the transaction.
    fn submit_participation(
        &self,
        lottery: Address,
        account: Address,
        fee: U256,
    ) -> impl Future<Output = Result<TxHash>>;

    fn await_confirmation(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<ParticipationReceipt>>;

    /// Installs a `WinnerPicked` filter. Dropping the stream removes the listener.
    fn watch_winners(&self, lottery: Address) -> impl Future<Output = Result<WinnerStream>>;
}

/// Looks `account` up among the first `count` players, stopping at the first match.
pub async fn contains_player<F, Fut>(count: U256, account: Address, mut player_at: F) -> Result<bool>
where
    F: FnMut(U256) -> Fut,
    Fut: Future<Output = Result<Address>>,
{
    let mut index = U256::ZERO;
    while index < count {
        if player_at(index).await? == account {
            return Ok(true);
        }
        index += U256::from(1);
    }
    Ok(false)
}

#[derive(Clone)]
pub struct AlloyGateway {
    provider: DynProvider,
}

impl AlloyGateway {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    /// Connects over HTTP with every signer registered on the provider wallet.
    /// Transactions pick their signer from the `from` field.
    pub fn connect(rpc_url: &str, signers: Vec<PrivateKeySigner>) -> Result<Self> {
        let mut signers = signers.into_iter();
        let first = signers
            .next()
            .ok_or_else(|| eyre!("At least one wallet is required to connect"))?;
        let mut wallet = EthereumWallet::new(first);
        for signer in signers {
            wallet.register_signer(signer);
        }
        let url = rpc_url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL {rpc_url}"))?;
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(url)
            .erased();
        Ok(Self::new(provider))
    }

    fn raffle(&self, lottery: Address) -> Raffle::RaffleInstance<DynProvider> {
        Raffle::new(lottery, self.provider.clone())
    }
}

impl LotteryGateway for AlloyGateway {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .wrap_err("eth_chainId request failed")
    }

    async fn account_balance(&self, account: Address) -> Result<U256> {
        self.provider
            .get_balance(account)
            .await
            .wrap_err_with(|| format!("fetching balance of {account} failed"))
    }

    async fn participation_fee(&self, lottery: Address) -> Result<U256> {
        self.raffle(lottery)
            .getParticipationFee()
            .call()
            .await
            .wrap_err("getParticipationFee call failed")
    }

    async fn number_of_players(&self, lottery: Address) -> Result<U256> {
        self.raffle(lottery)
            .getNumberOfPlayers()
            .call()
            .await
            .wrap_err("getNumberOfPlayers call failed")
    }

    /// The contract keeps no per-address flag, so the player list is scanned.
    async fn has_participated(&self, lottery: Address, account: Address) -> Result<bool> {
        let raffle = self.raffle(lottery);
        let players = raffle
            .getNumberOfPlayers()
            .call()
            .await
            .wrap_err("getNumberOfPlayers call failed")?;
        contains_player(players, account, |index| {
            let call = raffle.getPlayer(index);
            async move {
                call.call()
                    .await
                    .wrap_err_with(|| format!("getPlayer({index}) call failed"))
            }
        })
        .await
    }

    async fn raffle_state(&self, lottery: Address) -> Result<RaffleState> {
        let raw = self
            .raffle(lottery)
            .getRaffleState()
            .call()
            .await
            .wrap_err("getRaffleState call failed")?;
        Ok(RaffleState::from(raw))
    }

    async fn recent_winner(&self, lottery: Address) -> Result<Address> {
        self.raffle(lottery)
            .getWinner()
            .call()
            .await
            .wrap_err("getWinner call failed")
    }

    async fn submit_participation(
        &self,
        lottery: Address,
        account: Address,
        fee: U256,
    ) -> Result<TxHash> {
        let pending = self
            .raffle(lottery)
            .participate()
            .value(fee)
            .from(account)
            .send()
            .await
            .wrap_err("participate transaction was not accepted")?;
        Ok(*pending.tx_hash())
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> Result<ParticipationReceipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(confirmations)
            .with_timeout(Some(CONFIRMATION_TIMEOUT))
            .get_receipt()
            .await
            .wrap_err_with(|| format!("waiting for transaction {tx_hash} failed"))?;
        if !receipt.status() {
            return Err(eyre!("transaction {tx_hash} reverted"));
        }
        Ok(ParticipationReceipt {
            tx_hash,
            block_number: receipt.block_number,
        })
    }

    async fn watch_winners(&self, lottery: Address) -> Result<WinnerStream> {
        let poller = self
            .raffle(lottery)
            .WinnerPicked_filter()
            .watch()
            .await
            .wrap_err("installing WinnerPicked filter failed")?;
        let stream = poller.into_stream().map(move |item| {
            item.map(|(event, _log)| WinnerAnnouncement {
                lottery,
                winner: event.winner,
            })
            .map_err(|e| eyre!("decoding WinnerPicked log failed: {e}"))
        });
        Ok(stream.boxed_local())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::cell::Cell;

    fn players() -> Vec<Address> {
        vec![
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
        ]
    }

    #[tokio::test]
    async fn contains_player__stops_at_first_match() {
        // given
        let players = players();
        let lookups = Cell::new(0);

        // when
        let found = contains_player(U256::from(players.len()), players[1], |index| {
            lookups.set(lookups.get() + 1);
            let player = players[index.to::<usize>()];
            async move { Ok(player) }
        })
        .await
        .unwrap();

        // then
        assert!(found);
        assert_eq!(2, lookups.get());
    }

    #[tokio::test]
    async fn contains_player__absent_account_scans_every_index() {
        // given
        let players = players();
        let lookups = Cell::new(0);

        // when
        let found = contains_player(
            U256::from(players.len()),
            Address::repeat_byte(0xff),
            |index| {
                lookups.set(lookups.get() + 1);
                let player = players[index.to::<usize>()];
                async move { Ok(player) }
            },
        )
        .await
        .unwrap();

        // then
        assert!(!found);
        assert_eq!(3, lookups.get());
    }

    #[tokio::test]
    async fn contains_player__propagates_lookup_failure() {
        let result = contains_player(U256::from(2), Address::ZERO, |_| async {
            Err::<Address, _>(eyre!("execution reverted"))
        })
        .await;

        assert!(result.is_err());
    }
}
