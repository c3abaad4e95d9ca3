use anyhow::{Context, Result};
use serde::Serialize;

use crate::types::TransferResult;

/// Totals for one run plus every failed pair, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferSummary {
    pub objects: u64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Pairs that needed more than one attempt, whatever their final status.
    pub retried: u64,
    pub bytes_moved: u64,
    pub failures: Vec<TransferResult>,
}

impl TransferSummary {
    pub fn add(&mut self, result: TransferResult) {
        self.total += 1;

        if result.attempts > 1 {
            self.retried += 1;
        }

        if result.status.is_success() {
            self.succeeded += 1;
            self.bytes_moved += result.bytes;
        } else {
            self.failed += 1;
            self.failures.push(result);
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serde_json::to_string_pretty() failed.")
    }
}
