pub mod config;

pub use config::{DatabaseConfig, ReadPreference};
