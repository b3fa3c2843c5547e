//! Append-only, subscribable log of execution events.

pub mod events;
pub mod projection;
pub mod stream;

pub use events::*;
pub use projection::{project_messages, Message};
pub use stream::{EventListener, EventStream, Subscription};
