pub mod agent;
pub mod context;
pub mod error;
pub mod fitness;
pub mod models;
pub mod ports;
