use anyhow::Context;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const INITIAL_MARKET_CAP: u64 = 6_000;
pub const MIGRATION_MARKET_CAP: u64 = 80_000;
pub const QUOTE_DECIMALS: u8 = 9;
pub const POOL_FEE_BPS: u16 = 100;
pub const TOKEN_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedVestingParam {
    pub total_locked_vesting_amount: u64,
    pub cliff_unlock_amount: u64,
    pub number_of_vesting_period: u64,
    pub total_vesting_duration: u64,
    pub cliff_duration_from_migration_time: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveByMarketCap {
    pub quote_mint: String,
    pub initial_market_cap: u64,
    pub migration_market_cap: u64,
    pub token_quote_decimal: u8,
    pub locked_vesting_param: LockedVestingParam,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolFee {
    pub fee_bps: u16,
}

/// Body of `POST /dbc-pool/create-tx`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub build_curve_by_market_cap_param: CurveByMarketCap,
    pub anti_sniping: bool,
    pub fee: PoolFee,
    pub is_lp_locked: bool,
    pub token_name: String,
    pub token_symbol: String,
    pub token_image_content_type: String,
    pub creator: String,
}

impl CreateTransactionRequest {
    /// Curve starting at 6k and graduating at 80k market cap, quoted in SOL, with anti-sniping
    /// on and the LP locked.
    pub fn standard(token_name: &str, token_symbol: &str, creator: &str) -> Self {
        Self {
            build_curve_by_market_cap_param: CurveByMarketCap {
                quote_mint: WRAPPED_SOL_MINT.to_string(),
                initial_market_cap: INITIAL_MARKET_CAP,
                migration_market_cap: MIGRATION_MARKET_CAP,
                token_quote_decimal: QUOTE_DECIMALS,
                locked_vesting_param: LockedVestingParam::default(),
            },
            anti_sniping: true,
            fee: PoolFee {
                fee_bps: POOL_FEE_BPS,
            },
            is_lp_locked: true,
            token_name: token_name.to_string(),
            token_symbol: token_symbol.to_string(),
            token_image_content_type: TOKEN_IMAGE_CONTENT_TYPE.to_string(),
            creator: creator.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionResponse {
    #[serde(default)]
    pub transaction: String,
    pub mint: String,
    pub image_presigned_url: String,
    pub metadata_presigned_url: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub image: String,
    pub website: String,
    pub twitter: String,
    pub telegram: String,
}

/// Multipart fields of `POST /dbc-pool/submit`.
#[derive(Debug, Clone)]
pub struct SubmitForm {
    pub transaction: String,
    pub owner: String,
    pub content: String,
    pub header_image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub pool_id: Option<String>,
    pub error: Option<String>,
}

pub struct LaunchApiClient {
    http: Client,
    base_url: String,
}

impl LaunchApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build launch API HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> anyhow::Result<CreateTransactionResponse> {
        let url = format!("{}/dbc-pool/create-tx", self.base_url);
        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to create transaction: {} {}", status.as_u16(), body);
        }
        Ok(response.json().await?)
    }

    /// Downloads the token image the caller pointed at.
    pub async fn fetch_image(&self, image_url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self.http.get(image_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch image from URL: {}", image_url);
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn upload_image(&self, presigned_url: &str, image: Vec<u8>) -> anyhow::Result<()> {
        let response = self
            .http
            .put(presigned_url)
            .header(reqwest::header::CONTENT_TYPE, TOKEN_IMAGE_CONTENT_TYPE)
            .body(image)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to upload image: {}", response.status().as_u16());
        }
        Ok(())
    }

    pub async fn upload_metadata(&self, presigned_url: &str, metadata: &TokenMetadata) -> anyhow::Result<()> {
        let body = serde_json::to_string_pretty(metadata)?;
        let response = self
            .http
            .put(presigned_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to upload metadata: {}", response.status().as_u16());
        }
        Ok(())
    }

    /// Submits the signed transaction. A non-2xx answer is returned as `Err` carrying the
    /// API's error text.
    pub async fn submit(&self, form: SubmitForm) -> anyhow::Result<SubmitResponse> {
        let url = format!("{}/dbc-pool/submit", self.base_url);

        let mut multipart = Form::new()
            .text("transaction", form.transaction)
            .text("owner", form.owner)
            .text("content", form.content);
        if let Some(image) = form.header_image {
            let part = Part::bytes(image)
                .file_name("header.jpeg")
                .mime_str(TOKEN_IMAGE_CONTENT_TYPE)?;
            multipart = multipart.part("headerImage", part);
        }

        let response = self.http.post(&url).multipart(multipart).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let reason = serde_json::from_str::<SubmitResponse>(&text)
                .ok()
                .and_then(|parsed| parsed.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            anyhow::bail!("Submission failed: {}", reason);
        }
        parse_submit_response(&text)
    }
}

fn parse_submit_response(text: &str) -> anyhow::Result<SubmitResponse> {
    serde_json::from_str(text).with_context(|| format!("Submission returned a non-JSON body: {}", text))
}
