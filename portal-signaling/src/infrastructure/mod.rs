pub mod adapters;
pub mod store;
