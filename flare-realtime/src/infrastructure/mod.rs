pub mod change_feed;
pub mod persistence;

pub use change_feed::BackendChangeFeed;
