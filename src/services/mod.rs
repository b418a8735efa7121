//! Service layer module
//!
//! Routing, token counting, the upstream executor, SSE plumbing and usage tracking

pub mod executor;
pub mod router;
pub mod sse;
pub mod tokenizer;
pub mod usage;

pub use executor::{ExecutionStage, Executor};
pub use router::{RouteReason, RoutingContext, RoutingEngine, RoutingError};
pub use tokenizer::{TiktokenCounter, TokenCountError, TokenCounter};
pub use usage::{UsageRecord, UsageSummary, UsageTracker};
