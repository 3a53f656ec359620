pub mod capture;
pub mod config;
pub mod entries;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;
