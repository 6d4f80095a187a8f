// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared4::address::Address;
use fvm_shared4::deal::DealID;

use super::SectorInfo;

/// Outcome of checking the deals backing a sector's pieces.
#[derive(Debug)]
pub enum PieceCheck {
    Valid,
    /// Deals that can never be sealed into this sector.
    InvalidDeals { deal_ids: Vec<DealID>, reason: String },
    /// Deals whose start epoch has passed.
    ExpiredDeals { deal_ids: Vec<DealID>, reason: String },
    /// The chain could not be queried; says nothing about the deals.
    ApiError(anyhow::Error),
}

/// Checks the deals referenced by a sector against chain state.
#[async_trait::async_trait]
pub trait PieceValidator: Send + Sync {
    async fn check_pieces(&self, maddr: &Address, sector: &SectorInfo) -> PieceCheck;
}
