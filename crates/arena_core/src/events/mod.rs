//! Typed room events routed by numeric code.

mod event;
mod router;

pub use event::NetEvent;
pub use router::{EventHandler, EventRouter, EventScope, RouterHost, TypedEventHandler};
