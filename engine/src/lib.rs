pub mod batcher;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod factory;
pub mod nonce;
pub mod retry;
pub mod sender;
pub mod state;
pub mod tracker;
pub mod transactor;

pub use config::EngineConfig;
pub use tracker::{InFlightTx, Status};
pub use transactor::{Transactor, TransactorStats};
