pub mod backend_repository;

pub use backend_repository::BackendEngagementRepository;
