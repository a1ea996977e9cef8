// Review queue - pending human work ordered by priority and age.

pub mod queue_models;
pub mod queue_service;

pub use queue_models::*;
pub use queue_service::*;
