pub mod launch_service;
pub mod marketplace_service;
pub mod notification_manager;
pub mod reconciler;
pub mod settlement_service;
