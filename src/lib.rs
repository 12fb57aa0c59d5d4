pub mod attendance;
pub mod config;
pub mod error;
pub mod grades;
pub mod models;
pub mod notify;
pub mod report;
pub mod seed;
pub mod store;
pub mod validation;
