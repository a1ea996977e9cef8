// Pipeline - composes the moderation services behind one API.

pub mod moderation_pipeline;

pub use moderation_pipeline::*;
