//! Token launch orchestration against the launch API.
//!
//! Steps run strictly in order and each failure stops the launch. Nothing is rolled back: a
//! failed metadata upload leaves the image uploaded, a failed submit leaves both uploads.

use crate::infra::launch::{CreateTransactionRequest, LaunchApiClient, SubmitForm, TokenMetadata};
use crate::infra::solana::keys::{self, KeyError};
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTokenParams {
    #[serde(default)]
    pub user_public_address: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_symbol: String,
    pub token_description: Option<String>,
    #[serde(default)]
    pub image_url: String,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub header_image_path: Option<String>,
    pub content_description: Option<String>,
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStage {
    Validate,
    CreateTransaction,
    UploadImage,
    UploadMetadata,
    Sign,
    Submit,
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Missing required parameters: userPublicAddress, tokenName, tokenSymbol, and imageUrl are required")]
    MissingParameters,
    #[error("Invalid public key format for userPublicAddress")]
    InvalidPublicKey,
    #[error("{0}")]
    CreateTransaction(String),
    #[error("{0}")]
    UploadImage(String),
    #[error("{0}")]
    UploadMetadata(String),
    #[error("Private key is required for transaction signing. Please provide privateKey parameter.")]
    MissingPrivateKey,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("{0}")]
    Submit(String),
}

impl LaunchError {
    pub fn stage(&self) -> LaunchStage {
        match self {
            LaunchError::MissingParameters | LaunchError::InvalidPublicKey => LaunchStage::Validate,
            LaunchError::CreateTransaction(_) => LaunchStage::CreateTransaction,
            LaunchError::UploadImage(_) => LaunchStage::UploadImage,
            LaunchError::UploadMetadata(_) => LaunchStage::UploadMetadata,
            LaunchError::MissingPrivateKey | LaunchError::Key(_) => LaunchStage::Sign,
            LaunchError::Submit(_) => LaunchStage::Submit,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<LaunchStage>,
}

impl LaunchOutcome {
    fn failed(err: &LaunchError) -> Self {
        Self {
            success: false,
            mint: None,
            pool_id: None,
            error: Some(err.to_string()),
            stage: Some(err.stage()),
        }
    }
}

pub struct LaunchService {
    api: LaunchApiClient,
}

impl LaunchService {
    pub fn new(api: LaunchApiClient) -> Self {
        Self { api }
    }

    /// Runs the full launch. Never fails: errors come back as an unsuccessful outcome tagged
    /// with the stage that broke.
    pub async fn launch_coin(&self, params: LaunchTokenParams) -> LaunchOutcome {
        match self.try_launch(&params).await {
            Ok(outcome) => {
                tracing::info!(
                    token = %params.token_symbol,
                    mint = ?outcome.mint,
                    pool_id = ?outcome.pool_id,
                    "token launched"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(token = %params.token_symbol, stage = ?e.stage(), error = %e, "token launch failed");
                LaunchOutcome::failed(&e)
            }
        }
    }

    /// Launch with only the essentials and a generated description.
    pub async fn quick_launch_coin(
        &self,
        user_public_address: &str,
        token_name: &str,
        token_symbol: &str,
        image_url: &str,
        private_key: &str,
    ) -> LaunchOutcome {
        self.launch_coin(LaunchTokenParams {
            user_public_address: user_public_address.to_string(),
            token_name: token_name.to_string(),
            token_symbol: token_symbol.to_string(),
            token_description: Some(format!("{} - A token launched on Jupiter Studio", token_name)),
            image_url: image_url.to_string(),
            private_key: Some(private_key.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn try_launch(&self, params: &LaunchTokenParams) -> Result<LaunchOutcome, LaunchError> {
        validate(params)?;
        tracing::info!(name = %params.token_name, symbol = %params.token_symbol, "starting token launch");

        let request = CreateTransactionRequest::standard(
            &params.token_name,
            &params.token_symbol,
            &params.user_public_address,
        );
        let created = self
            .api
            .create_transaction(&request)
            .await
            .map_err(|e| LaunchError::CreateTransaction(e.to_string()))?;
        if created.transaction.is_empty() {
            return Err(LaunchError::CreateTransaction("Failed to create transaction".to_string()));
        }
        tracing::debug!(mint = %created.mint, "launch transaction created");

        let image = self
            .api
            .fetch_image(&params.image_url)
            .await
            .map_err(|e| LaunchError::UploadImage(e.to_string()))?;
        self.api
            .upload_image(&created.image_presigned_url, image)
            .await
            .map_err(|e| LaunchError::UploadImage(e.to_string()))?;

        let metadata = TokenMetadata {
            name: params.token_name.clone(),
            symbol: params.token_symbol.clone(),
            description: params
                .token_description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| format!("{} token launched on Jupiter Studio", params.token_name)),
            image: created.image_url.clone(),
            website: params.website.clone().unwrap_or_default(),
            twitter: params.twitter.clone().unwrap_or_default(),
            telegram: params.telegram.clone().unwrap_or_default(),
        };
        self.api
            .upload_metadata(&created.metadata_presigned_url, &metadata)
            .await
            .map_err(|e| LaunchError::UploadMetadata(e.to_string()))?;

        let private_key = params
            .private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LaunchError::MissingPrivateKey)?;
        let wallet = keys::parse_wallet_for(private_key, &params.user_public_address)?;
        let signed = keys::sign_versioned_base64(&created.transaction, &wallet)?;

        let header_image = match params.header_image_path.as_deref() {
            Some(path) => tokio::fs::read(path).await.ok(),
            None => None,
        };
        let submitted = self
            .api
            .submit(SubmitForm {
                transaction: signed,
                owner: wallet.pubkey().to_string(),
                content: params.content_description.clone().unwrap_or_default(),
                header_image,
            })
            .await
            .map_err(|e| LaunchError::Submit(e.to_string()))?;

        Ok(LaunchOutcome {
            success: true,
            mint: Some(created.mint),
            pool_id: submitted.pool_id,
            error: None,
            stage: None,
        })
    }
}

fn validate(params: &LaunchTokenParams) -> Result<(), LaunchError> {
    let required = [
        &params.user_public_address,
        &params.token_name,
        &params.token_symbol,
        &params.image_url,
    ];
    if required.iter().any(|v| v.trim().is_empty()) {
        return Err(LaunchError::MissingParameters);
    }
    Pubkey::from_str(params.user_public_address.trim()).map_err(|_| LaunchError::InvalidPublicKey)?;
    Ok(())
}
