//! tsgate Query: tenant-scoped range queries and the usage query.
//!
//! Query bodies are constants. Tenant id, bucket and window bounds only
//! ever travel as bound parameters.

pub mod builder;
pub mod predicate;
pub mod window;

pub use builder::{usage_query, QueryBuilder, TenantQuery, TENANT_QUERY_BODY, USAGE_QUERY_BODY};
pub use predicate::{CompareOp, Predicate};
pub use window::TimeWindow;
