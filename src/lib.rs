pub mod aggregate;
pub mod clean;
pub mod config;
pub mod error;
pub mod load;
pub mod pipeline;
pub mod schema;
pub mod store;
