//! Agent-initiated token transfers with the dual treasury tax.

use crate::crypto::encryption::WalletCipher;
use crate::domain::settlement::{
    lamports_to_sol, priority_fee_micro_lamports, sol_to_lamports, to_ui_amount, AgentRecord,
    NewSettlement, SettlementStatus, TaxPlan, COMPUTE_UNIT_LIMIT, DEFAULT_SOLANA_FEE,
    RECEIVER_FEE_MEMO, SENDER_FEE_MEMO, TAX_BREAKDOWN, TOKEN_DECIMALS,
};
use crate::infra::solana::keys;
use crate::infra::solana::{Ledger, SignatureState};
use crate::storage::AgentStore;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use solana_program::instruction::Instruction;
use solana_program::pubkey::Pubkey;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Missing API key")]
    MissingApiKey,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Missing required parameters")]
    MissingParameters,
    #[error("Invalid recipient address")]
    InvalidRecipient,
    #[error("Wallet not found")]
    WalletNotFound,
    #[error("Insufficient SOL balance for transaction fees")]
    InsufficientBalance { needed: f64, current: f64, fee: f64 },
    #[error("Insufficient token balance including taxes")]
    InsufficientTokens {
        available: f64,
        requested: f64,
        total_needed: f64,
    },
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SettlementError {
    /// Machine-readable code returned to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::MissingApiKey => "AUTH_001",
            SettlementError::InvalidApiKey => "AUTH_002",
            SettlementError::MissingParameters => "REQ_001",
            SettlementError::InvalidRecipient => "REQ_002",
            SettlementError::WalletNotFound => "WAL_001",
            SettlementError::InsufficientBalance { .. } => "BAL_001",
            SettlementError::InsufficientTokens { .. } => "BAL_002",
            SettlementError::TransactionFailed(_) | SettlementError::Internal(_) => "ERR_001",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::MissingApiKey | SettlementError::InvalidApiKey => "UNAUTHORIZED",
            SettlementError::MissingParameters | SettlementError::InvalidRecipient => "BAD_REQUEST",
            SettlementError::WalletNotFound => "NOT_FOUND",
            SettlementError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            SettlementError::InsufficientTokens { .. } => "INSUFFICIENT_TOKENS",
            SettlementError::TransactionFailed(_) | SettlementError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable message. Internal failures share one message; the cause goes in
    /// [`details`](Self::details).
    pub fn message(&self) -> String {
        match self {
            SettlementError::TransactionFailed(_) | SettlementError::Internal(_) => {
                "Failed to send tokens".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<JsonValue> {
        match self {
            SettlementError::InsufficientBalance { needed, current, fee } => Some(json!({
                "needed": needed,
                "current": current,
                "fee": fee,
            })),
            SettlementError::InsufficientTokens {
                available,
                requested,
                total_needed,
            } => Some(json!({
                "available": available,
                "requested": requested,
                "totalNeeded": total_needed,
                "includingTaxes": true,
            })),
            SettlementError::TransactionFailed(_) => Some(JsonValue::String(self.to_string())),
            SettlementError::Internal(e) => Some(JsonValue::String(e.to_string())),
            _ => None,
        }
    }
}

/// A validated transfer request.
#[derive(Debug, Clone, PartialEq)]
pub struct SendTokensRequest {
    pub recipient: Pubkey,
    pub amount: f64,
    pub solana_fee: f64,
}

impl SendTokensRequest {
    /// Reads `recipientAddress`, `amount` and optional `solanaFee` from a JSON body. Numbers may
    /// arrive as JSON numbers or numeric strings.
    pub fn from_json(body: Option<&JsonValue>) -> Result<Self, SettlementError> {
        let body = body.ok_or(SettlementError::MissingParameters)?;

        let recipient = body
            .get("recipientAddress")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SettlementError::MissingParameters)?;
        let amount = body
            .get("amount")
            .and_then(lenient_number)
            .filter(|a| *a > 0.0 && TaxPlan::for_amount(*a).is_some())
            .ok_or(SettlementError::MissingParameters)?;
        let solana_fee = body
            .get("solanaFee")
            .and_then(lenient_number)
            .filter(|f| *f > 0.0)
            .unwrap_or(DEFAULT_SOLANA_FEE);

        let recipient = Pubkey::from_str(recipient).map_err(|_| SettlementError::InvalidRecipient)?;
        Ok(Self {
            recipient,
            amount,
            solana_fee,
        })
    }
}

fn lenient_number(value: &JsonValue) -> Option<f64> {
    let n = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
    pub sender: String,
    pub recipient: String,
    pub dao_address: String,
    pub requested_send_amount: f64,
    pub total_needed_from_account: f64,
    pub account_tax: f64,
    pub received_tax: f64,
    pub recipient_receives: f64,
    pub tax_breakdown: String,
    pub compute_units: u32,
    /// Lamports per compute unit.
    pub priority_fee: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferReceipt {
    pub signature: String,
    pub details: TransferDetails,
}

/// Accounts that take part in one taxed transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferAccounts {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub mint: Pubkey,
    pub treasury: Pubkey,
}

/// Instructions of one taxed transfer, in submission order.
pub fn build_transfer_instructions(
    accounts: &TransferAccounts,
    plan: &TaxPlan,
    priority_fee_micro_lamports: u64,
    create_recipient_account: bool,
) -> anyhow::Result<Vec<Instruction>> {
    let source = get_associated_token_address(&accounts.sender, &accounts.mint);
    let destination = get_associated_token_address(&accounts.recipient, &accounts.mint);
    let treasury = get_associated_token_address(&accounts.treasury, &accounts.mint);
    let transfer = |to: &Pubkey, amount: u64| {
        spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &source,
            &accounts.mint,
            to,
            &accounts.sender,
            &[],
            amount,
            TOKEN_DECIMALS,
        )
    };

    let mut ixs = vec![
        ComputeBudgetInstruction::set_compute_unit_price(priority_fee_micro_lamports),
        ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNIT_LIMIT),
    ];
    if create_recipient_account {
        ixs.push(create_associated_token_account(
            &accounts.sender,
            &accounts.recipient,
            &accounts.mint,
            &spl_token::id(),
        ));
    }
    ixs.push(transfer(&treasury, plan.account_tax)?);
    ixs.push(spl_memo::build_memo(SENDER_FEE_MEMO.as_bytes(), &[]));
    ixs.push(transfer(&treasury, plan.received_tax)?);
    ixs.push(spl_memo::build_memo(RECEIVER_FEE_MEMO.as_bytes(), &[]));
    ixs.push(transfer(&destination, plan.recipient_amount)?);
    Ok(ixs)
}

pub struct SettlementService {
    agents: Arc<dyn AgentStore>,
    ledger: Arc<dyn Ledger>,
    cipher: Option<WalletCipher>,
    token_mint: Pubkey,
    treasury: Pubkey,
    confirm_poll_interval: Duration,
}

impl SettlementService {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        ledger: Arc<dyn Ledger>,
        cipher: Option<WalletCipher>,
        token_mint: Pubkey,
        treasury: Pubkey,
        confirm_poll_interval: Duration,
    ) -> Self {
        Self {
            agents,
            ledger,
            cipher,
            token_mint,
            treasury,
            confirm_poll_interval,
        }
    }

    pub fn treasury(&self) -> Pubkey {
        self.treasury
    }

    /// Resolves the calling agent from its `x-api-key`.
    pub async fn authenticate(&self, api_key: Option<&str>) -> Result<AgentRecord, SettlementError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SettlementError::MissingApiKey)?;
        self.agents
            .find_active_agent(api_key)
            .await?
            .ok_or(SettlementError::InvalidApiKey)
    }

    /// Sends `request.amount` tokens from the agent's wallet, charging both treasury taxes, and
    /// waits for the signature to land at `processed` commitment.
    pub async fn send_tokens(
        &self,
        agent: &AgentRecord,
        request: &SendTokensRequest,
    ) -> Result<TransferReceipt, SettlementError> {
        let wallet = self
            .agents
            .find_active_wallet(&agent.id)
            .await?
            .ok_or(SettlementError::WalletNotFound)?;

        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("WALLET_ENCRYPTION_KEY is not configured"))?;
        let secret = cipher
            .decrypt(&wallet.encrypted_private_key, &wallet.iv)
            .map_err(|e| anyhow::anyhow!("Failed to decrypt wallet key: {}", e))?;
        let sender = keys::keypair_from_base64(&secret).map_err(|e| anyhow::anyhow!(e))?;
        let sender_pubkey = sender.pubkey();

        let balance = self.ledger.balance(&sender_pubkey).await?;
        if balance < sol_to_lamports(request.solana_fee) {
            return Err(SettlementError::InsufficientBalance {
                needed: request.solana_fee,
                current: lamports_to_sol(balance),
                fee: request.solana_fee,
            });
        }

        let accounts = TransferAccounts {
            sender: sender_pubkey,
            recipient: request.recipient,
            mint: self.token_mint,
            treasury: self.treasury,
        };
        let source = get_associated_token_address(&sender_pubkey, &self.token_mint);
        let destination = get_associated_token_address(&request.recipient, &self.token_mint);

        let plan = TaxPlan::for_amount(request.amount).ok_or(SettlementError::MissingParameters)?;
        match self.ledger.token_balance(&source).await {
            Ok(available) if available < plan.total_needed => {
                return Err(SettlementError::InsufficientTokens {
                    available: to_ui_amount(available),
                    requested: request.amount,
                    total_needed: to_ui_amount(plan.total_needed),
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(agent_id = %agent.id, error = %e, "could not read sender token account, skipping balance check");
            }
        }

        let micro_lamports = priority_fee_micro_lamports(request.solana_fee);
        let create_recipient_account = !self.ledger.account_exists(&destination).await?;
        let ixs = build_transfer_instructions(&accounts, &plan, micro_lamports, create_recipient_account)?;

        let (blockhash, last_valid_block_height) = self.ledger.latest_blockhash().await?;
        let transaction =
            Transaction::new_signed_with_payer(&ixs, Some(&sender_pubkey), &[&sender], blockhash);
        let signature = self.ledger.send_transaction(&transaction).await?;
        let hash = signature.to_string();

        self.agents
            .insert_settlement(&NewSettlement {
                agent_id: agent.id.clone(),
                transaction_hash: hash.clone(),
                amount: request.amount,
                recipient: request.recipient.to_string(),
                status: SettlementStatus::Pending,
            })
            .await?;
        tracing::info!(agent_id = %agent.id, signature = %hash, amount = request.amount, "transfer submitted");

        self.await_confirmation(&signature, last_valid_block_height).await?;
        self.agents
            .update_settlement_status(&hash, SettlementStatus::Completed, None)
            .await?;
        tracing::info!(agent_id = %agent.id, signature = %hash, "transfer confirmed");

        Ok(TransferReceipt {
            signature: hash,
            details: TransferDetails {
                sender: sender_pubkey.to_string(),
                recipient: request.recipient.to_string(),
                dao_address: self.treasury.to_string(),
                requested_send_amount: request.amount,
                total_needed_from_account: to_ui_amount(plan.total_needed),
                account_tax: to_ui_amount(plan.account_tax),
                received_tax: to_ui_amount(plan.received_tax),
                recipient_receives: to_ui_amount(plan.recipient_amount),
                tax_breakdown: TAX_BREAKDOWN.to_string(),
                compute_units: COMPUTE_UNIT_LIMIT,
                priority_fee: micro_lamports as f64 / 1_000_000.0,
            },
        })
    }

    /// Polls until the signature lands or its blockhash expires. An on-chain failure marks the
    /// log row failed; expiry leaves it pending for the reconciler.
    async fn await_confirmation(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<(), SettlementError> {
        let hash = signature.to_string();
        loop {
            match self.ledger.signature_state(signature).await? {
                SignatureState::Confirmed => return Ok(()),
                SignatureState::Failed(reason) => {
                    self.agents
                        .update_settlement_status(&hash, SettlementStatus::Failed, Some(&reason))
                        .await?;
                    tracing::error!(signature = %hash, error = %reason, "transfer failed on chain");
                    return Err(SettlementError::TransactionFailed(reason));
                }
                SignatureState::Unknown => {
                    if self.ledger.block_height().await? > last_valid_block_height {
                        tracing::warn!(signature = %hash, "blockhash expired before confirmation");
                        return Err(SettlementError::TransactionFailed(format!(
                            "signature {} not confirmed before blockhash expiry",
                            hash
                        )));
                    }
                }
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spl_token::instruction::TokenInstruction;

    #[test]
    fn request_accepts_numeric_strings() {
        let recipient = Pubkey::new_unique();
        let body = json!({"recipientAddress": recipient.to_string(), "amount": "12.5", "solanaFee": "0.01"});
        let req = SendTokensRequest::from_json(Some(&body)).unwrap();
        assert_eq!(req.recipient, recipient);
        assert_eq!(req.amount, 12.5);
        assert_eq!(req.solana_fee, 0.01);
    }

    #[test]
    fn request_defaults_the_fee() {
        let body = json!({"recipientAddress": Pubkey::new_unique().to_string(), "amount": 3});
        let req = SendTokensRequest::from_json(Some(&body)).unwrap();
        assert_eq!(req.solana_fee, DEFAULT_SOLANA_FEE);
    }

    #[test]
    fn request_rejects_missing_or_zero_values() {
        let recipient = Pubkey::new_unique().to_string();
        for body in [
            json!({"amount": 1}),
            json!({"recipientAddress": recipient}),
            json!({"recipientAddress": recipient, "amount": 0}),
            json!({"recipientAddress": "", "amount": 1}),
            json!({"recipientAddress": recipient, "amount": "abc"}),
        ] {
            let err = SendTokensRequest::from_json(Some(&body)).unwrap_err();
            assert_eq!(err.code(), "REQ_001", "body {}", body);
        }
        assert_eq!(SendTokensRequest::from_json(None).unwrap_err().code(), "REQ_001");
    }

    #[test]
    fn request_rejects_amounts_too_large_to_tax() {
        let recipient = Pubkey::new_unique().to_string();
        for amount in [json!(1e14), json!("1e30")] {
            let body = json!({"recipientAddress": recipient, "amount": amount});
            let err = SendTokensRequest::from_json(Some(&body)).unwrap_err();
            assert_eq!(err.code(), "REQ_001", "amount {}", amount);
        }
    }

    #[test]
    fn unparsable_recipient_is_rejected_separately() {
        let body = json!({"recipientAddress": "nope", "amount": 1});
        let err = SendTokensRequest::from_json(Some(&body)).unwrap_err();
        assert_eq!(err.code(), "REQ_002");
        assert_eq!(err.kind(), "BAD_REQUEST");
    }

    #[test]
    fn error_codes_and_details() {
        let err = SettlementError::InsufficientBalance {
            needed: 0.009,
            current: 0.001,
            fee: 0.009,
        };
        assert_eq!(err.code(), "BAL_001");
        assert_eq!(err.details().unwrap()["current"], 0.001);

        let err = SettlementError::Internal(anyhow::anyhow!("rpc down"));
        assert_eq!(err.code(), "ERR_001");
        assert_eq!(err.message(), "Failed to send tokens");
        assert_eq!(err.details().unwrap(), json!("rpc down"));
    }

    #[test]
    fn instructions_follow_transfer_layout() {
        let accounts = TransferAccounts {
            sender: Pubkey::new_unique(),
            recipient: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            treasury: Pubkey::new_unique(),
        };
        let plan = TaxPlan::for_amount(100.0).unwrap();
        let ixs = build_transfer_instructions(&accounts, &plan, 15_000, true).unwrap();
        assert_eq!(ixs.len(), 8);
        assert_eq!(ixs[2].program_id, spl_associated_token_account::id());
        assert_eq!(
            ixs[2].accounts[1].pubkey,
            get_associated_token_address(&accounts.recipient, &accounts.mint)
        );

        let transfers: Vec<(u64, u8)> = ixs
            .iter()
            .filter(|ix| ix.program_id == spl_token::id())
            .filter_map(|ix| match TokenInstruction::unpack(&ix.data) {
                Ok(TokenInstruction::TransferChecked { amount, decimals }) => Some((amount, decimals)),
                _ => None,
            })
            .collect();
        assert_eq!(transfers, vec![(2_000_000, 6), (2_000_000, 6), (98_000_000, 6)]);

        let memos: Vec<&[u8]> = ixs
            .iter()
            .filter(|ix| ix.program_id == spl_memo::id())
            .map(|ix| ix.data.as_slice())
            .collect();
        assert_eq!(memos, vec![SENDER_FEE_MEMO.as_bytes(), RECEIVER_FEE_MEMO.as_bytes()]);

        let treasury_ata = get_associated_token_address(&accounts.treasury, &accounts.mint);
        assert_eq!(ixs[3].accounts[2].pubkey, treasury_ata);
        assert!(ixs[3].accounts[3].is_signer);

        let without_create = build_transfer_instructions(&accounts, &plan, 15_000, false).unwrap();
        assert_eq!(without_create.len(), 7);
    }
}
