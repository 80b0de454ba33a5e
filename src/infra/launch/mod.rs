//! Client for the token-launch (bonding curve pool) HTTP API.

pub mod client;

pub use client::{
    CreateTransactionRequest, CreateTransactionResponse, LaunchApiClient, SubmitForm, SubmitResponse,
    TokenMetadata,
};
