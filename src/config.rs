// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::db::parity_db_config::ParityDbConfig;
use crate::logger::LogConfig;
use crate::sealing::SealingConfig;

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub sealing: SealingConfig,
    pub parity_db: ParityDbConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid configuration")
    }

    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("in config file {}", path.display()))
    }
}
