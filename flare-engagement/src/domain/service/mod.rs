pub mod engagement_domain_service;

pub use engagement_domain_service::{EngagementDomainConfig, EngagementDomainService};
