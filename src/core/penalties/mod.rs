// Penalty ledger - warnings and bans, and their reversal.

pub mod penalty_models;
pub mod penalty_service;

pub use penalty_models::*;
pub use penalty_service::*;
