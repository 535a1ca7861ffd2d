// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod http_backend;
pub mod source_cache;
