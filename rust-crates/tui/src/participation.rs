use crate::{
    contract::{
        LotteryGateway,
        ParticipationReceipt,
        WinnerAnnouncement,
        WinnerStream,
    },
    notifications::{
        NotificationKind,
        Notifications,
    },
    session::{
        SessionEvent,
        SessionState,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
    U256,
    utils::format_ether,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use deployments::ChainRegistry;
use futures::StreamExt;
use lottery_abi::RaffleState;
use std::time::Instant;
use tracing::{
    debug,
    error,
    info,
    warn,
};


const MAX_ERRORS: usize = 50;
pub const REQUIRED_CONFIRMATIONS: u64 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LotterySnapshot {
    pub participation_fee: Option<U256>,
    pub number_of_players: Option<U256>,
    pub has_current_account_participated: bool,
    pub raffle_state: Option<RaffleState>,
    pub recent_winner: Option<Address>,
    pub account_balance: Option<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingParticipation {
    pub tx_hash: TxHash,
    pub lottery: Address,
    pub account: Address,
    pub submitted_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Busy {
    Submitting,
    AwaitingConfirmation(PendingParticipation),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewState {
    Disconnected,
    Resolving {
        lottery: Address,
    },
    Ready {
        lottery: Address,
        snapshot: LotterySnapshot,
        busy: Option<Busy>,
    },
    Unsupported {
        chain_id: u64,
    },
}

impl ViewState {
    pub fn lottery(&self) -> Option<Address> {
        match self {
            ViewState::Resolving { lottery } | ViewState::Ready { lottery, .. } => {
                Some(*lottery)
            }
            ViewState::Disconnected | ViewState::Unsupported { .. } => None,
        }
    }

    pub fn snapshot(&self) -> Option<&LotterySnapshot> {
        match self {
            ViewState::Ready { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn busy(&self) -> Option<&Busy> {
        match self {
            ViewState::Ready { busy, .. } => busy.as_ref(),
            _ => None,
        }
    }
}

/// Why a refresh ran. Decides the status line left after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    WalletEnabled,
    ChainChanged,
    AccountChanged,
    WinnerPicked,
    PostTransaction,
    Manual,
}

/// Winner listener bound to one contract address. Dropping it unsubscribes.
struct WinnerSubscription {
    lottery: Address,
    stream: WinnerStream,
}

pub struct ParticipationViewModel<G> {
    gateway: G,
    registry: ChainRegistry,
    session: SessionState,
    state: ViewState,
    subscription: Option<WinnerSubscription>,
    notifications: Notifications,
    confirmations: u64,
    status: String,
    errors: Vec<String>,
    refresh_count: u64,
}

impl<G: LotteryGateway> ParticipationViewModel<G> {
    pub fn new(gateway: G, registry: ChainRegistry) -> Self {
        Self {
            gateway,
            registry,
            session: SessionState::default(),
            state: ViewState::Disconnected,
            subscription: None,
            notifications: Notifications::default(),
            confirmations: REQUIRED_CONFIRMATIONS,
            status: String::from("Connecting..."),
            errors: Vec::new(),
            refresh_count: 0,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut Notifications {
        &mut self.notifications
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    pub fn has_winner_listener(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    pub fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        let changed = self.session.apply(&event);
        if !changed {
            debug!(?event, "session event without effect");
            return;
        }
        match event {
            SessionEvent::Disconnected => self.unmount("Wallet disconnected"),
            SessionEvent::AccountChanged(_) => {
                if let ViewState::Ready { snapshot, .. } = &mut self.state {
                    snapshot.has_current_account_participated = false;
                    snapshot.account_balance = None;
                }
                self.remount(Trigger::AccountChanged).await;
            }
            SessionEvent::ChainChanged(_) => self.remount(Trigger::ChainChanged).await,
            SessionEvent::WalletEnabled { .. } => {
                self.remount(Trigger::WalletEnabled).await
            }
        }
    }

    fn unmount(&mut self, status: &str) {
        if self.subscription.take().is_some() {
            debug!("winner listener removed");
        }
        self.state = ViewState::Disconnected;
        self.set_status(status);
    }

    /// Re-resolves the contract for the current chain and refreshes it.
    pub async fn remount(&mut self, trigger: Trigger) {
        let (Some(chain_id), Some(_account), true) = (
            self.session.chain_id,
            self.session.account,
            self.session.is_connected,
        ) else {
            self.unmount("Please connect a wallet");
            return;
        };

        let resolved = self
            .registry
            .resolve(&chain_id.to_string())
            .map(|raw| raw.parse::<Address>());
        let lottery = match resolved {
            Some(Ok(lottery)) => lottery,
            Some(Err(e)) => {
                self.mark_unsupported(chain_id);
                self.push_errors(vec![format!(
                    "Registry entry for chain {chain_id} is not an address: {e}"
                )]);
                return;
            }
            None => {
                self.mark_unsupported(chain_id);
                return;
            }
        };

        if self.state.lottery() != Some(lottery) {
            info!(%lottery, chain_id, "resolved lottery contract");
            self.state = ViewState::Resolving { lottery };
        }
        self.ensure_winner_listener(lottery).await;
        self.refresh(trigger).await;
    }

    fn mark_unsupported(&mut self, chain_id: u64) {
        if self.subscription.take().is_some() {
            debug!(chain_id, "winner listener removed for unsupported chain");
        }
        warn!(chain_id, "no lottery deployed on chain");
        self.state = ViewState::Unsupported { chain_id };
        self.set_status(format!(
            "No lottery contract on chain {chain_id}; switch to a supported network"
        ));
    }

    async fn ensure_winner_listener(&mut self, lottery: Address) {
        if let Some(current) = &self.subscription {
            if current.lottery == lottery {
                return;
            }
            debug!(old = %current.lottery, new = %lottery, "replacing winner listener");
        }
        // the old listener goes away before the new one is installed
        self.subscription = None;
        match self.gateway.watch_winners(lottery).await {
            Ok(stream) => {
                self.subscription = Some(WinnerSubscription { lottery, stream });
            }
            Err(e) => {
                self.push_errors(vec![format!("Could not watch WinnerPicked: {e}")]);
            }
        }
    }

    /// Reads every snapshot field. Failed reads keep the previous value.
    pub async fn refresh(&mut self, trigger: Trigger) {
        let Some(lottery) = self.state.lottery() else {
            debug!(?trigger, "refresh skipped without a resolved lottery");
            return;
        };
        let account = self.session.account;
        debug!(?trigger, %lottery, "refreshing lottery snapshot");

        let gateway = &self.gateway;
        let (fee, players, participated, raffle_state, winner, balance) = futures::join!(
            gateway.participation_fee(lottery),
            gateway.number_of_players(lottery),
            async {
                match account {
                    Some(account) => gateway.has_participated(lottery, account).await.map(Some),
                    None => Ok(None),
                }
            },
            gateway.raffle_state(lottery),
            gateway.recent_winner(lottery),
            async {
                match account {
                    Some(account) => gateway.account_balance(account).await.map(Some),
                    None => Ok(None),
                }
            },
        );

        let previous = std::mem::replace(&mut self.state, ViewState::Disconnected);
        let (mut snapshot, busy) = match previous {
            ViewState::Ready { snapshot, busy, .. } => (snapshot, busy),
            _ => (LotterySnapshot::default(), None),
        };
        let mut errors = Vec::new();
        match fee {
            Ok(fee) => snapshot.participation_fee = Some(fee),
            Err(e) => errors.push(format!("Reading participation fee failed: {e}")),
        }
        match players {
            Ok(players) => snapshot.number_of_players = Some(players),
            Err(e) => errors.push(format!("Reading number of players failed: {e}")),
        }
        match participated {
            Ok(Some(participated)) => snapshot.has_current_account_participated = participated,
            Ok(None) => snapshot.has_current_account_participated = false,
            Err(e) => errors.push(format!("Reading participation flag failed: {e}")),
        }
        match raffle_state {
            Ok(state) => snapshot.raffle_state = Some(state),
            Err(e) => errors.push(format!("Reading raffle state failed: {e}")),
        }
        match winner {
            Ok(winner) => snapshot.recent_winner = Some(winner),
            Err(e) => errors.push(format!("Reading recent winner failed: {e}")),
        }
        match balance {
            Ok(balance) => snapshot.account_balance = balance,
            Err(e) => errors.push(format!("Reading account balance failed: {e}")),
        }

        self.state = ViewState::Ready {
            lottery,
            snapshot,
            busy,
        };
        self.refresh_count += 1;
        if !errors.is_empty() {
            self.push_errors(errors);
            return;
        }
        match trigger {
            // keeps the confirmation message visible
            Trigger::PostTransaction => {}
            Trigger::Manual => self.set_status("Refreshed"),
            _ => self.set_status("Ready"),
        }
    }

    pub fn can_participate(&self) -> bool {
        match &self.state {
            ViewState::Ready { snapshot, busy, .. } => {
                busy.is_none()
                    && !snapshot.has_current_account_participated
                    && snapshot.participation_fee.is_some()
                    && self.session.account.is_some()
            }
            _ => false,
        }
    }

    fn set_busy(&mut self, value: Option<Busy>) {
        if let ViewState::Ready { busy, .. } = &mut self.state {
            *busy = value;
        }
    }

    /// Sends the participation transaction. On success the view-model waits
    /// in `AwaitingConfirmation` until `confirm_participation` resolves it.
    pub async fn submit_participation(&mut self) -> Result<PendingParticipation> {
        if !self.can_participate() {
            return Err(eyre!("Participation is not available right now"));
        }
        let (
            ViewState::Ready {
                lottery, snapshot, ..
            },
            Some(account),
        ) = (&self.state, self.session.account)
        else {
            return Err(eyre!("Participation is not available right now"));
        };
        let lottery = *lottery;
        let fee = snapshot
            .participation_fee
            .ok_or_else(|| eyre!("Participation fee is unknown"))?;

        self.set_busy(Some(Busy::Submitting));
        self.set_status(format!(
            "Participating with {} ETH...",
            format_ether(fee)
        ));
        match self.gateway.submit_participation(lottery, account, fee).await {
            Ok(tx_hash) => {
                info!(%tx_hash, %lottery, %account, "participation submitted");
                let pending = PendingParticipation {
                    tx_hash,
                    lottery,
                    account,
                    submitted_at: Instant::now(),
                };
                self.set_busy(Some(Busy::AwaitingConfirmation(pending.clone())));
                self.set_status(format!("Waiting for confirmation of {tx_hash}..."));
                Ok(pending)
            }
            Err(e) => {
                self.set_busy(None);
                self.push_errors(vec![format!("Participation failed: {e}")]);
                Err(e)
            }
        }
    }

    pub async fn confirm_participation(
        &mut self,
        pending: PendingParticipation,
    ) -> Result<ParticipationReceipt> {
        let outcome = self
            .gateway
            .await_confirmation(pending.tx_hash, self.confirmations)
            .await;
        self.set_busy(None);
        match outcome {
            Ok(receipt) => {
                info!(
                    tx_hash = %receipt.tx_hash,
                    block = ?receipt.block_number,
                    elapsed_ms = pending.submitted_at.elapsed().as_millis() as u64,
                    "participation confirmed"
                );
                self.notifications
                    .push(NotificationKind::TransactionComplete, "Transaction complete!");
                self.set_status("Participation confirmed");
                if self.state.lottery() == Some(pending.lottery) {
                    self.refresh(Trigger::PostTransaction).await;
                }
                Ok(receipt)
            }
            Err(e) => {
                self.push_errors(vec![format!("Participation failed: {e}")]);
                Err(e)
            }
        }
    }

    pub async fn participate(&mut self) -> Result<ParticipationReceipt> {
        let pending = self.submit_participation().await?;
        self.confirm_participation(pending).await
    }

    /// Next item from the winner listener. Pends forever without a listener;
    /// yields `None` once when the listener ends.
    pub async fn next_winner(&mut self) -> Option<Result<WinnerAnnouncement>> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let next = subscription.stream.next().await;
        if next.is_none() {
            warn!(lottery = %subscription.lottery, "winner listener ended");
            self.subscription = None;
        }
        next
    }

    /// Returns whether the announcement belonged to the current contract.
    pub async fn handle_winner_event(&mut self, announcement: WinnerAnnouncement) -> bool {
        if self.state.lottery() != Some(announcement.lottery) {
            debug!(
                lottery = %announcement.lottery,
                "ignoring winner event for a contract no longer shown"
            );
            return false;
        }
        info!(winner = %announcement.winner, "winner picked");
        self.notifications.push(
            NotificationKind::WinnerPicked,
            format!("Winner picked: {}", announcement.winner),
        );
        self.refresh(Trigger::WinnerPicked).await;
        true
    }
}
