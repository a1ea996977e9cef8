// Implementations of the moderation storage ports.

pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::{InMemoryAppealStore, InMemoryAuditStore, InMemoryPenaltyStore, InMemoryQueueStore};
pub use sqlite_store::SqliteModerationStore;
