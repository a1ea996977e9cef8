// Appeals - contesting moderation decisions.

pub mod appeal_models;
pub mod appeal_service;

pub use appeal_models::*;
pub use appeal_service::*;
