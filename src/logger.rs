// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, prelude::*};

/// The `[log]` section of the config file: per-module level directives applied
/// on top of the defaults when `RUST_LOG` is not set.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct LogConfig {
    pub filters: Vec<LogValue>,
}

impl LogConfig {
    fn to_filter_string(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}={}", f.module, f.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    /// One of `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
}

impl LogValue {
    pub fn new(module: &str, level: &str) -> Self {
        Self {
            module: module.to_string(),
            level: level.to_string(),
        }
    }
}

/// Installs the global `tracing` subscriber. Calling it again leaves the
/// installed subscriber in place.
pub fn setup_logger(config: &LogConfig) {
    let res = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::new().with_filter(get_env_filter(config)))
        .try_init();
    if let Err(e) = res {
        tracing::warn!("logger already initialized: {e}");
    }
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or
/// the default directives extended by `config`.
fn get_env_filter(config: &LogConfig) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => default_env_filter(config),
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(config: &LogConfig) -> EnvFilter {
    let mut directives = vec![
        "info".to_owned(),
        "parity_db=warn".to_owned(),
        "filecoin_proofs=warn".to_owned(),
        "storage_proofs_core=warn".to_owned(),
    ];
    if !config.filters.is_empty() {
        directives.push(config.to_filter_string());
    }
    let directives = directives.join(",");
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("invalid log filters `{directives}`: {e}");
        EnvFilter::new("info")
    })
}
