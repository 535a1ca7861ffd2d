// Application layer - Studio use cases and the ports they depend on
pub mod catalog;
pub mod defaults;
pub mod error;
pub mod feedback;
pub mod patch;
pub mod ports;
pub mod render;
pub mod snapshots;
pub mod store;
pub mod studio;
pub mod team;
pub mod wizard;
