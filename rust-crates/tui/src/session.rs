use crate::contract::LotteryGateway;
use alloy::primitives::Address;
use color_eyre::eyre::Result;
use tracing::{
    info,
    warn,
};

/// What the wallet side reports to the view-model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    WalletEnabled { chain_id: u64, account: Address },
    ChainChanged(u64),
    AccountChanged(Address),
    Disconnected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
    pub is_connected: bool,
}

impl SessionState {
    /// Folds `event` into the state and reports whether anything changed.
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        let before = *self;
        match *event {
            SessionEvent::WalletEnabled { chain_id, account } => {
                self.chain_id = Some(chain_id);
                self.account = Some(account);
                self.is_connected = true;
            }
            SessionEvent::ChainChanged(chain_id) => self.chain_id = Some(chain_id),
            SessionEvent::AccountChanged(account) => self.account = Some(account),
            SessionEvent::Disconnected => {
                self.chain_id = None;
                self.is_connected = false;
            }
        }
        before != *self
    }
}

/// Session source backed by the RPC connection and the unlocked signers.
///
/// The chain id is observed by polling; accounts are switched locally.
#[derive(Debug)]
pub struct SessionProvider {
    accounts: Vec<Address>,
    active: usize,
    last_chain: Option<u64>,
    connected: bool,
}

impl SessionProvider {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            active: 0,
            last_chain: None,
            connected: false,
        }
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn active_account(&self) -> Option<Address> {
        self.accounts.get(self.active).copied()
    }

    pub async fn poll<G: LotteryGateway>(&mut self, gateway: &G) -> Option<SessionEvent> {
        let observed = gateway.chain_id().await;
        self.observe_chain(observed)
    }

    /// Turns one chain id observation into at most one session event.
    pub fn observe_chain(&mut self, observed: Result<u64>) -> Option<SessionEvent> {
        match observed {
            Ok(chain_id) => {
                let account = self.active_account()?;
                if !self.connected {
                    info!(chain_id, %account, "wallet enabled");
                    self.connected = true;
                    self.last_chain = Some(chain_id);
                    return Some(SessionEvent::WalletEnabled { chain_id, account });
                }
                if self.last_chain == Some(chain_id) {
                    return None;
                }
                info!(chain_id, previous = ?self.last_chain, "chain changed");
                self.last_chain = Some(chain_id);
                Some(SessionEvent::ChainChanged(chain_id))
            }
            Err(e) => {
                if !self.connected {
                    return None;
                }
                warn!(error = %e, "lost connection to RPC endpoint");
                self.connected = false;
                self.last_chain = None;
                Some(SessionEvent::Disconnected)
            }
        }
    }

    /// Rotates to the next unlocked account. `None` with fewer than two accounts.
    pub fn next_account(&mut self) -> Option<SessionEvent> {
        if self.accounts.len() < 2 {
            return None;
        }
        self.active = (self.active + 1) % self.accounts.len();
        let account = self.accounts[self.active];
        info!(%account, "account changed");
        self.connected.then_some(SessionEvent::AccountChanged(account))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use color_eyre::eyre::eyre;

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn observe_chain__first_success_enables_wallet() {
        // given
        let mut provider = SessionProvider::new(vec![alice()]);

        // when
        let event = provider.observe_chain(Ok(31337));

        // then
        assert_eq!(
            Some(SessionEvent::WalletEnabled {
                chain_id: 31337,
                account: alice()
            }),
            event
        );
    }

    #[test]
    fn observe_chain__same_chain_emits_nothing() {
        // given
        let mut provider = SessionProvider::new(vec![alice()]);
        provider.observe_chain(Ok(31337));

        // when
        let event = provider.observe_chain(Ok(31337));

        // then
        assert_eq!(None, event);
    }

    #[test]
    fn observe_chain__different_chain_emits_chain_changed() {
        // given
        let mut provider = SessionProvider::new(vec![alice()]);
        provider.observe_chain(Ok(31337));

        // when
        let event = provider.observe_chain(Ok(4));

        // then
        assert_eq!(Some(SessionEvent::ChainChanged(4)), event);
    }

    #[test]
    fn observe_chain__failure_after_connect_disconnects_once() {
        // given
        let mut provider = SessionProvider::new(vec![alice()]);
        provider.observe_chain(Ok(31337));

        // when
        let first = provider.observe_chain(Err(eyre!("connection refused")));
        let second = provider.observe_chain(Err(eyre!("connection refused")));
        let reconnect = provider.observe_chain(Ok(31337));

        // then
        assert_eq!(Some(SessionEvent::Disconnected), first);
        assert_eq!(None, second);
        assert!(matches!(
            reconnect,
            Some(SessionEvent::WalletEnabled { chain_id: 31337, .. })
        ));
    }

    #[test]
    fn next_account__cycles_through_unlocked_accounts() {
        // given
        let mut provider = SessionProvider::new(vec![alice(), bob()]);
        provider.observe_chain(Ok(31337));

        // when
        let first = provider.next_account();
        let second = provider.next_account();

        // then
        assert_eq!(Some(SessionEvent::AccountChanged(bob())), first);
        assert_eq!(Some(SessionEvent::AccountChanged(alice())), second);
    }

    #[test]
    fn next_account__single_account_is_noop() {
        let mut provider = SessionProvider::new(vec![alice()]);

        assert_eq!(None, provider.next_account());
    }

    #[test]
    fn apply__reports_only_real_changes() {
        // given
        let mut state = SessionState::default();
        let enabled = SessionEvent::WalletEnabled {
            chain_id: 4,
            account: alice(),
        };

        // when
        let first = state.apply(&enabled);
        let repeated = state.apply(&enabled);
        let disconnected = state.apply(&SessionEvent::Disconnected);

        // then
        assert!(first);
        assert!(!repeated);
        assert!(disconnected);
        assert!(!state.is_connected);
        assert_eq!(None, state.chain_id);
        assert_eq!(Some(alice()), state.account);
    }
}
