//! Keypair parsing and partial signing of externally built transactions.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid private key format. Please provide a valid JSON array (from Solana CLI) or base64 format private key.")]
    UnrecognizedFormat,
    #[error("Private key does not match the provided public address")]
    AddressMismatch,
    #[error("Invalid secret key: {0}")]
    InvalidSecret(String),
    #[error("Failed to decode transaction: {0}")]
    Decode(String),
    #[error("Wallet {0} is not a required signer of the transaction")]
    NotASigner(String),
    #[error("Failed to encode transaction: {0}")]
    Encode(String),
}

/// Parses a 64-byte secret given either as a Solana CLI JSON array or as base64.
pub fn parse_private_key(input: &str) -> Result<Keypair, KeyError> {
    let input = input.trim();

    if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(input) {
        if bytes.len() == 64 {
            return keypair_from_bytes(&bytes);
        }
    }

    match BASE64.decode(input) {
        Ok(bytes) if bytes.len() == 64 => keypair_from_bytes(&bytes),
        _ => Err(KeyError::UnrecognizedFormat),
    }
}

/// Builds a keypair from a decrypted wallet secret (base64 of the 64-byte secret key).
pub fn keypair_from_base64(secret: &str) -> Result<Keypair, KeyError> {
    let bytes = BASE64
        .decode(secret.trim())
        .map_err(|e| KeyError::InvalidSecret(e.to_string()))?;
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, KeyError> {
    Keypair::try_from(bytes).map_err(|e| KeyError::InvalidSecret(e.to_string()))
}

/// Parses `input` and checks it belongs to `expected_address`.
pub fn parse_wallet_for(input: &str, expected_address: &str) -> Result<Keypair, KeyError> {
    let keypair = parse_private_key(input)?;
    if keypair.pubkey().to_string() != expected_address {
        return Err(KeyError::AddressMismatch);
    }
    Ok(keypair)
}

/// Adds `keypair`'s signature to a base64 versioned transaction, leaving other signatures intact.
pub fn sign_versioned_base64(transaction_b64: &str, keypair: &Keypair) -> Result<String, KeyError> {
    let raw = BASE64
        .decode(transaction_b64.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;
    let mut transaction: VersionedTransaction =
        bincode::deserialize(&raw).map_err(|e| KeyError::Decode(e.to_string()))?;

    let required = transaction.message.header().num_required_signatures as usize;
    let slot = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == keypair.pubkey())
        .ok_or_else(|| KeyError::NotASigner(keypair.pubkey().to_string()))?;

    if transaction.signatures.len() < required {
        transaction.signatures.resize(required, Signature::default());
    }
    transaction.signatures[slot] = keypair.sign_message(&transaction.message.serialize());

    let encoded = bincode::serialize(&transaction).map_err(|e| KeyError::Encode(e.to_string()))?;
    Ok(BASE64.encode(encoded))
}
