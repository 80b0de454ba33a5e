pub mod app;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::launch_service::LaunchService;
pub use app::marketplace_service::MarketplaceService;
pub use app::notification_manager::NotificationManager;
pub use app::reconciler::Reconciler;
pub use app::settlement_service::SettlementService;
pub use crypto::encryption::WalletCipher;
pub use domain::commission::{calculate_commission, validate_commission_calculation};
pub use infra::config::Config;
pub use infra::solana;
pub use storage::{memory::MemoryStore, postgres::PgStore};
