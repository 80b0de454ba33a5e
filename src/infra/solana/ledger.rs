use async_trait::async_trait;
use solana_program::pubkey::Pubkey;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

/// Where a submitted signature stands on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not (yet) seen by the node.
    Unknown,
    Confirmed,
    /// Landed with an error.
    Failed(String),
}

/// The subset of RPC calls settlement and reconciliation depend on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Native balance in lamports.
    async fn balance(&self, owner: &Pubkey) -> anyhow::Result<u64>;

    /// Raw token amount held by an SPL token account.
    async fn token_balance(&self, token_account: &Pubkey) -> anyhow::Result<u64>;

    async fn account_exists(&self, address: &Pubkey) -> anyhow::Result<bool>;

    /// Latest blockhash and the last block height at which it is still valid.
    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)>;

    /// Broadcasts without preflight, letting the node retry up to 3 times.
    async fn send_transaction(&self, transaction: &Transaction) -> anyhow::Result<Signature>;

    async fn signature_state(&self, signature: &Signature) -> anyhow::Result<SignatureState>;

    async fn block_height(&self) -> anyhow::Result<u64>;
}
