pub mod hot_ops;
pub mod producers;
pub mod projects;
pub mod segments;
pub mod streams;
pub mod subscriptions;
