//! Request/response correlation, routing and retry.

mod classifier;
mod invocation;
mod schema;
mod service;

pub use classifier::{error_from_holders, DefaultErrorClassifier, ErrorClassifier};
pub use invocation::{EventHandler, Invocation, InvocationState, InvocationTarget};
pub use schema::{NoopSchemaService, SchemaService};
pub use service::{InvocationService, PendingResponse};
