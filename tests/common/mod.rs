//! Shared harness for the HTTP integration tests: an in-memory store, a scripted ledger and the
//! real router bound to an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_program::pubkey::Pubkey;
use solana_sdk::hash::Hash;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use swarms_settlement::domain::settlement::AgentWallet;
use swarms_settlement::infra::launch::LaunchApiClient;
use swarms_settlement::solana::{Ledger, SignatureState};
use swarms_settlement::storage::Stores;
use swarms_settlement::transport;
use swarms_settlement::{
    LaunchService, MarketplaceService, MemoryStore, NotificationManager, SettlementService, WalletCipher,
};
use tokio::sync::Mutex;

pub const TEST_CIPHER_KEY: [u8; 32] = [7u8; 32];
pub const LAST_VALID_BLOCK_HEIGHT: u64 = 150;

pub struct LedgerState {
    pub lamports: u64,
    /// `None` makes token balance reads fail.
    pub token_balance: Option<u64>,
    pub existing_accounts: HashSet<Pubkey>,
    pub statuses: HashMap<Signature, SignatureState>,
    /// Status lookups for these signatures return an RPC error.
    pub status_errors: HashSet<Signature>,
    pub default_state: SignatureState,
    pub block_height: u64,
    pub sent: Vec<Transaction>,
}

/// Ledger double: answers from scripted state and records every broadcast transaction.
pub struct FakeLedger {
    pub state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                lamports: 1_000_000_000,
                token_balance: Some(1_000_000_000_000),
                existing_accounts: HashSet::new(),
                statuses: HashMap::new(),
                status_errors: HashSet::new(),
                default_state: SignatureState::Confirmed,
                block_height: 100,
                sent: Vec::new(),
            }),
        }
    }

    pub async fn sent(&self) -> Vec<Transaction> {
        self.state.lock().await.sent.clone()
    }

    pub async fn set_status(&self, signature: Signature, state: SignatureState) {
        self.state.lock().await.statuses.insert(signature, state);
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn balance(&self, _owner: &Pubkey) -> anyhow::Result<u64> {
        Ok(self.state.lock().await.lamports)
    }

    async fn token_balance(&self, _token_account: &Pubkey) -> anyhow::Result<u64> {
        self.state
            .lock()
            .await
            .token_balance
            .ok_or_else(|| anyhow::anyhow!("could not find account"))
    }

    async fn account_exists(&self, address: &Pubkey) -> anyhow::Result<bool> {
        Ok(self.state.lock().await.existing_accounts.contains(address))
    }

    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
        Ok((Hash::new_unique(), LAST_VALID_BLOCK_HEIGHT))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> anyhow::Result<Signature> {
        self.state.lock().await.sent.push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn signature_state(&self, signature: &Signature) -> anyhow::Result<SignatureState> {
        let state = self.state.lock().await;
        if state.status_errors.contains(signature) {
            anyhow::bail!("rpc timeout");
        }
        Ok(state
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or_else(|| state.default_state.clone()))
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        Ok(self.state.lock().await.block_height)
    }
}

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<FakeLedger>,
    pub notifications: Arc<NotificationManager>,
    pub token_mint: Pubkey,
    pub treasury: Pubkey,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers an agent with an encrypted wallet and returns the wallet keypair.
    pub async fn register_agent(&self, api_key: &str, agent_id: &str) -> Keypair {
        let keypair = Keypair::new();
        let sealed = WalletCipher::new(TEST_CIPHER_KEY)
            .encrypt(&BASE64.encode(keypair.to_bytes()))
            .expect("encrypt wallet");
        self.store.add_agent(api_key, agent_id).await;
        self.store
            .add_wallet(AgentWallet {
                agent_id: agent_id.to_string(),
                public_key: keypair.pubkey().to_string(),
                encrypted_private_key: sealed.encrypted_data,
                iv: sealed.iv,
            })
            .await;
        keypair
    }
}

/// Starts the full router. Launch requests go to `launch_api_base_url`, which defaults to a
/// closed local port.
pub async fn spawn_app(launch_api_base_url: Option<&str>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::from_backend(store.clone());
    let ledger = Arc::new(FakeLedger::new());
    let token_mint = Pubkey::new_unique();
    let treasury = Pubkey::new_unique();

    let notifications = Arc::new(NotificationManager::new(
        stores.notifications.clone(),
        Duration::from_millis(50),
        50,
    ));
    let settlement = Arc::new(SettlementService::new(
        stores.agents.clone(),
        ledger.clone(),
        Some(WalletCipher::new(TEST_CIPHER_KEY)),
        token_mint,
        treasury,
        Duration::from_millis(5),
    ));
    let launch = Arc::new(LaunchService::new(
        LaunchApiClient::new(launch_api_base_url.unwrap_or("http://127.0.0.1:9")).expect("launch client"),
    ));
    let marketplace = Arc::new(MarketplaceService::new(
        stores.marketplace.clone(),
        notifications.clone(),
    ));

    let app_state = transport::http::AppState {
        health: stores.health.clone(),
        settlement,
        launch,
        marketplace,
        notifications: notifications.clone(),
        treasury: treasury.to_string(),
    };
    let router = transport::http::create_router(app_state);

    // Bind to an ephemeral port to avoid conflicts if an API server is already running.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        store,
        ledger,
        notifications,
        token_mint,
        treasury,
    }
}
