pub mod commands;
pub mod handlers;
pub mod queries;

pub use handlers::{EngagementCommandHandler, EngagementQueryHandler};
