// The core module contains all business logic.
// Each feature gets its own submodule; storage ports are declared next to
// the services that use them and implemented in `infra`.

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "review_queue/mod.rs"]
pub mod review_queue;

#[path = "collaborators/mod.rs"]
pub mod collaborators;

#[path = "penalties/mod.rs"]
pub mod penalties;

#[path = "workflow/mod.rs"]
pub mod workflow;

#[path = "appeals/mod.rs"]
pub mod appeals;

#[path = "pipeline/mod.rs"]
pub mod pipeline;
