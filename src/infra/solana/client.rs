// Responsible for all communication with the Solana blockchain.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_program::pubkey::Pubkey;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    signature::Signature,
    transaction::Transaction,
};

use crate::infra::solana::ledger::{Ledger, SignatureState};

/// Node-level rebroadcast attempts for a submitted transaction.
pub const SEND_MAX_RETRIES: usize = 3;

/// `Ledger` backed by a JSON-RPC node. Everything runs at `processed` commitment.
pub struct RpcLedger {
    client: RpcClient,
}

impl RpcLedger {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let client = RpcClient::new_with_commitment(rpc_url.into(), CommitmentConfig::processed());
        Self { client }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn balance(&self, owner: &Pubkey) -> anyhow::Result<u64> {
        Ok(self.client.get_balance(owner).await?)
    }

    async fn token_balance(&self, token_account: &Pubkey) -> anyhow::Result<u64> {
        let ui_amount = self.client.get_token_account_balance(token_account).await?;
        ui_amount
            .amount
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Unexpected token amount '{}': {}", ui_amount.amount, e))
    }

    async fn account_exists(&self, address: &Pubkey) -> anyhow::Result<bool> {
        let response = self
            .client
            .get_account_with_commitment(address, CommitmentConfig::processed())
            .await?;
        Ok(response.value.is_some())
    }

    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
        Ok(self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::processed())
            .await?)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> anyhow::Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Processed),
            max_retries: Some(SEND_MAX_RETRIES),
            ..RpcSendTransactionConfig::default()
        };
        Ok(self
            .client
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn signature_state(&self, signature: &Signature) -> anyhow::Result<SignatureState> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, CommitmentConfig::processed())
            .await?;
        Ok(match status {
            None => SignatureState::Unknown,
            Some(Ok(())) => SignatureState::Confirmed,
            Some(Err(e)) => SignatureState::Failed(e.to_string()),
        })
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        Ok(self
            .client
            .get_block_height_with_commitment(CommitmentConfig::processed())
            .await?)
    }
}
