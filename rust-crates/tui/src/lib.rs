pub mod contract;
pub mod notifications;
pub mod participation;
pub mod session;
pub mod wallets;
