//! Course feedback service core.
//!
//! - **Gamification**: XP ledger with tier multipliers, level thresholds and
//!   badge rules, with per-user serialized writes
//! - **Analytics**: dropout risk, course risk aggregation, workload forecast
//!   and personalized difficulty, recomputed from stored feedback on demand
//! - **Storage**: SQLite via sqlx; configuration from TOML

pub mod analytics;
pub mod api;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod gamification;
pub mod model;

pub use analytics::PredictiveAnalytics;
pub use config::AppConfig;
pub use database::Database;
pub use error::{CoreError, Result};
pub use gamification::GamificationEngine;
