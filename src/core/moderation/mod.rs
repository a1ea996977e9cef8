// Core moderation module - classification and automatic decisions.

pub mod classifier;
pub mod flagging_rules;
pub mod flagging_service;
pub mod moderation_models;

pub use classifier::*;
pub use flagging_rules::*;
pub use flagging_service::*;
pub use moderation_models::*;
