// Gateway layer - the JSON-lines protocol hosts use to drive the pipeline.
//
// One request object per input line, one response object per output line.

#[path = "commands.rs"]
pub mod commands;

#[path = "dispatcher.rs"]
pub mod dispatcher;

#[path = "formatter.rs"]
pub mod formatter;

pub use commands::{Request, Response};
pub use dispatcher::Dispatcher;
