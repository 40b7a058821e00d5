// src/config.rs
//
// Service configuration from environment variables.
// Every setting has a default; a present but unparseable value is an error.

use crate::engine::batch::{BatchOptions, DEFAULT_BATCH_DEADLINE, DEFAULT_MEMORY_BUDGET_BYTES};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BIND: &str = "OPTIPRESS_BIND";
pub const ENV_WORKER_THREADS: &str = "OPTIPRESS_WORKER_THREADS";
pub const ENV_BATCH_DEADLINE_MS: &str = "OPTIPRESS_BATCH_DEADLINE_MS";
pub const ENV_MEMORY_BUDGET_MB: &str = "OPTIPRESS_MEMORY_BUDGET_MB";
pub const ENV_MAX_REQUEST_MB: &str = "OPTIPRESS_MAX_REQUEST_MB";
pub const ENV_INCLUDE_ORIGINAL: &str = "OPTIPRESS_INCLUDE_ORIGINAL";

const DEFAULT_MAX_REQUEST_MB: usize = 512;
const MB: u64 = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    /// 0 = available parallelism
    pub worker_threads: usize,
    /// `None` when disabled (env value 0)
    pub batch_deadline: Option<Duration>,
    pub memory_budget_bytes: u64,
    pub max_request_bytes: usize,
    pub include_original: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            worker_threads: 0,
            batch_deadline: Some(DEFAULT_BATCH_DEADLINE),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_MB * MB as usize,
            include_original: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let bind = parse_or(&lookup, ENV_BIND, || defaults.bind)?;
        let worker_threads = parse_or(&lookup, ENV_WORKER_THREADS, || 0usize)?;
        let deadline_ms = parse_or(&lookup, ENV_BATCH_DEADLINE_MS, || {
            DEFAULT_BATCH_DEADLINE.as_millis() as u64
        })?;
        let memory_mb = parse_or(&lookup, ENV_MEMORY_BUDGET_MB, || {
            DEFAULT_MEMORY_BUDGET_BYTES / MB
        })?;
        let max_request_mb = parse_or(&lookup, ENV_MAX_REQUEST_MB, || DEFAULT_MAX_REQUEST_MB)?;
        let include_original = match lookup(ENV_INCLUDE_ORIGINAL) {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: ENV_INCLUDE_ORIGINAL,
                value: raw,
            })?,
        };

        Ok(Self {
            bind,
            worker_threads,
            batch_deadline: (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms)),
            memory_budget_bytes: memory_mb.saturating_mul(MB),
            max_request_bytes: max_request_mb.saturating_mul(MB as usize),
            include_original,
        })
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            worker_threads: self.worker_threads,
            deadline: self.batch_deadline,
            memory_budget_bytes: self.memory_budget_bytes,
            include_original: self.include_original,
        }
    }
}

fn parse_or<T, F, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> T,
{
    match lookup(key) {
        None => Ok(default()),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
