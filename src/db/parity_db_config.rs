// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// `ParityDb` configuration exposed in the `[parity_db]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct ParityDbConfig {
    /// One of `none`, `lz4` or `snappy`.
    #[default("lz4".into())]
    pub compression_type: String,
}
