pub mod config;
pub mod launch;
pub mod logging;
pub mod solana;
