use std::{
    collections::VecDeque,
    time::{
        Duration,
        Instant,
    },
};

pub const DEFAULT_TTL: Duration = Duration::from_secs(8);
const MAX_VISIBLE: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    TransactionComplete,
    WinnerPicked,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::TransactionComplete => "Transaction Notification",
            NotificationKind::WinnerPicked => "Winner Picked",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: Instant,
}

/// Transient alerts, oldest first. Expired entries are dropped by `prune`.
#[derive(Debug)]
pub struct Notifications {
    items: VecDeque<Notification>,
    ttl: Duration,
    delivered: usize,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Notifications {
    pub fn new(ttl: Duration) -> Self {
        Self {
            items: VecDeque::new(),
            ttl,
            delivered: 0,
        }
    }

    pub fn push(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.push_at(kind, message, Instant::now());
    }

    pub fn push_at(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        now: Instant,
    ) {
        let message = message.into();
        tracing::info!(title = kind.title(), %message, "notification");
        self.items.push_back(Notification {
            kind,
            message,
            created_at: now,
        });
        while self.items.len() > MAX_VISIBLE {
            self.items.pop_front();
        }
        self.delivered += 1;
    }

    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.items
            .retain(|n| now.saturating_duration_since(n.created_at) < ttl);
    }

    pub fn active(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    /// Count of notifications ever pushed, including expired ones.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.items.iter().filter(|n| n.kind == kind).count()
    }
}
