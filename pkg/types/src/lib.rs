//! Data model shared by the quota engine: quantities, resource lists, scope
//! selectors, quota budgets and the object kinds that consume them.

pub mod config;
pub mod machine;
pub mod network;
pub mod object;
pub mod quantity;
pub mod quota;
pub mod resource;
pub mod scope;
pub mod validate;
pub mod volume;
