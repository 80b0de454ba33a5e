pub mod commission;
pub mod marketplace;
pub mod notification;
pub mod settlement;
