pub mod collaborators;

pub use collaborators::*;
