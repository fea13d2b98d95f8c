//! Broker consumers and their shared start/stop lifecycle.
//!
//! ## Submodules
//!
//! - `lifecycle` - Serialized start/stop state machine shared by both
//!   consumers
//! - `dispatch` - Health-gated consumer draining the email subscription
//! - `dead_letter` - Terminal sink draining the dead-letter subscription

pub mod dead_letter;
pub mod dispatch;
pub mod lifecycle;

pub use dead_letter::{DeadLetterConsumer, DeadLetterRecord, DeadLetterStore};
pub use dispatch::DispatchConsumer;
pub use lifecycle::{Lifecycle, LifecycleStatus};
