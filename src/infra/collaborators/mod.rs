// Stand-ins for the content store and reputation directory.

pub mod in_memory;

pub use in_memory::{InMemoryContentStore, InMemoryReputation};
