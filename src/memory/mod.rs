pub mod index;
pub mod maintenance;
pub mod persist;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;
