//! Authorization: ownership resolution, route guard chain, rate limiting.

pub mod directory;
pub mod guard;
pub mod ownership;
pub mod rate_limit;

pub use directory::{ClassSummary, DomainDirectory, InMemoryDomainDirectory, PgDomainDirectory, RecordRef};
pub use guard::{client_ip, guard, GuardState, GuardTable, OwnershipSpec, RoutePolicy};
pub use ownership::{OwnershipResolver, ResourceKind};
pub use rate_limit::{NoopLimiter, RateLimitDecision, RequestLimiter, SlidingWindowLimiter};
