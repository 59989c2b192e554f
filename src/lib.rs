pub mod audit;
pub mod auth;
pub mod error;
pub mod models;
pub mod moderation;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod reports;
pub mod routes;
pub mod scheduler;
pub mod security;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState, SiteSettings};
pub use security::SecurityHeaders;
