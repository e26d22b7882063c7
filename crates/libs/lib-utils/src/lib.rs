//! # Utilities Library
//!
//! Shared, dependency-light helpers for environment variables, time, and validation.

pub mod envs;
pub mod time;
pub mod validation;

pub use envs::{get_env, get_env_or, get_env_parse, get_env_parse_or};
pub use time::{daily_utc_midnights, format_time, now_utc, parse_utc, truncate_to_utc_midnight};
pub use validation::{normalize_token, validate_date_range, validate_not_empty, validate_token_address};
