pub mod app;
pub mod collector;
pub mod error;
pub mod manager;
pub mod models;
pub mod sweep;
pub mod worker;
