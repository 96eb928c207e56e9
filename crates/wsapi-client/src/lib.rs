//! WSAPI Client
//!
//! Client-side retrieval pipeline for the artifact-tracking web services API:
//! requests are compiled into wire filters, result pages are fetched
//! concurrently and delivered in order through a cursor, and records are
//! materialized as entities whose related objects load on first access.
//!
//! ## Module Organization
//!
//! * **Configuration**: client settings and workspace/project scope (`config`)
//! * **Transport**: the GET seam and its reqwest implementation (`transport`)
//! * **Requests**: request builder and page URL template (`request`)
//! * **Fetching**: page groups, retries and the result cursor (`fetcher`, `cursor`)
//! * **Hydration**: entities, lazy fields and the type registry (`entity`, `hydrator`, `registry`)
//! * **Facade**: the `WsapiClient` entry point (`client`)

//-----------------------------------------------------------------------------
// Modules
//-----------------------------------------------------------------------------

pub mod client;
pub mod config;
pub mod context;
pub mod cursor;
pub mod entity;
pub mod envelope;
pub mod fetcher;
pub mod hydrator;
pub mod registry;
pub mod request;
pub mod telemetry;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

//-----------------------------------------------------------------------------
// Re-exports
//-----------------------------------------------------------------------------

pub use client::WsapiClient;
pub use config::{ClientConfig, Scope};
pub use context::QueryContext;
pub use cursor::ResultCursor;
pub use entity::{Entity, FieldState, FieldValue, HydrationState, Pending, Reference};
pub use fetcher::{worker_count, PageFetcher, PageWindow};
pub use hydrator::Hydrator;
pub use registry::{EntityKind, EntityRegistry};
pub use request::{Fetch, QueryRequest, QueryUrl};
pub use telemetry::{init_test_tracing, init_tracing};
pub use transport::{HttpTransport, Transport};

pub use wsapi_error::{QueryGrammarError, TrackerError, TrackerResult, TransportError};
pub use wsapi_query::{compile, FilterExpression, FilterSpec, FilterValue};
