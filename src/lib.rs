// Dashboard studio core - widget model, patch engine, connection wizard and backend client
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
