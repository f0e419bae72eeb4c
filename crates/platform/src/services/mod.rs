pub mod lifecycle;
pub mod registry;
pub mod rules;
pub mod subscriptions;
