pub mod plan;
pub mod session;

pub use plan::{CrawlPlan, PlanEntry};
pub use session::{CrawlSession, ListingSink, SessionRecord};
