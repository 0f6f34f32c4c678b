#![forbid(unsafe_code)]

//! Reactive coordination for database-backed page components.
//!
//! Components on a [`Page`] announce changes over a [`Bus`], declare
//! dependencies on each other ([`wiring`]), and re-derive their contents
//! through the invalidation [`cascade`] when a producer's value or a watched
//! table changes.
//!
//! - [`Bus`]: synchronous, breadth-first publish/subscribe with a global
//!   channel for table mutations and one scoped channel per component.
//! - [`NodeCore`] / [`Node`]: identity, signature, silence and the
//!   subscriptions every component holds.
//! - [`RowView`]: rows, cached filter, load state and fetch sequencing of a
//!   data view.
//! - [`QueryEndpoint`]: the remote query service boundary. `HttpEndpoint`
//!   (feature `http`) talks to a real service; `testing::ScriptedEndpoint`
//!   (feature `test-helpers`) answers from a script.

pub mod bus;
pub mod cascade;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod filter;
#[cfg(feature = "http")]
pub mod http;
pub mod id;
pub mod node;
pub mod page;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;
pub mod wiring;

pub use bus::{Bus, Channel, Subscription};
pub use cascade::{Fault, LoadState, RowView, ViewHost};
pub use config::{ConfigError, PageConfig};
pub use endpoint::{QueryEndpoint, QueryError, QueryFuture, QueryRequest};
pub use envelope::{Envelope, Mutation, Payload};
pub use filter::{FilterContext, IntegrationFailure};
#[cfg(feature = "http")]
pub use http::HttpEndpoint;
pub use id::{ComponentId, Signature};
pub use node::{Node, NodeCore};
pub use page::{Page, PageError, WeakPage};
pub use value::{ComponentValue, Row, RowSet};
pub use wiring::{DependencyGraph, ProducerRef, ProducerSignal, Wiring, WiringError};
