// Domain layer - Widgets, dashboards, list records and data source settings
pub mod dashboard;
pub mod data_source;
pub mod error;
pub mod merge;
pub mod records;
pub mod widget;
