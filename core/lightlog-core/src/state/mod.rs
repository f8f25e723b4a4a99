//! Session state carried across hook invocations.
//!
//! - [`types`]: the serialized [`SessionState`] record and its parts
//! - [`store`]: reads/writes the JSON state file (`<log dir>/.state.json`)

mod store;
pub(crate) mod types;

pub use store::StateStore;
pub use types::{
    PendingSubagent, PendingTool, SessionState, TimelineEntry, TokenUsage, STATE_VERSION,
};
