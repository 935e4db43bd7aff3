pub mod bybit;
pub mod config;
pub mod lifecycle;
pub mod trader;

pub use bybit::BybitClient;
pub use config::TraderConfig;
pub use lifecycle::{CooldownState, LifecycleState, PositionLifecycle, Reaction};
pub use trader::{IterationOutcome, Trader};
