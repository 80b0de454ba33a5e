pub mod client;
pub mod keys;
pub mod ledger;

pub use client::RpcLedger;
pub use ledger::{Ledger, SignatureState};
