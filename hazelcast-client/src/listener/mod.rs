//! Event types published by the client.

mod lifecycle;
mod membership;

pub use lifecycle::LifecycleEvent;
pub use membership::{Member, MemberEvent, MemberEventType, MemberVersion};
