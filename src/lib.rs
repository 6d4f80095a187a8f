// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Sector numbering and the replica-update sealing pipeline of a Filecoin
//! storage provider.
//!
//! [`stored_counter::StoredCounter`] hands out sector numbers that survive
//! restarts, and [`sealing::Sealing`] drives committed-capacity sectors through
//! replica update, proving and submission, one task per sector.

pub mod config;
pub mod db;
pub mod logger;
pub mod sealing;
pub mod stored_counter;
