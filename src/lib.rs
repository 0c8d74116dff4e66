pub mod cli;
pub mod config;
pub mod consent;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;
pub mod phone;
pub mod server;
pub mod sms;

pub use config::Config;
pub use db::Database;
pub use error::{SurveyError, SurveyResult};
