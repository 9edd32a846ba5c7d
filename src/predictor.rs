//! Frequency-table estimator of the death toll of a run.

use crate::config::RunParams;
use anyhow::{Context, Result};
use rmp_serde::encode;
use std::collections::HashMap;

/// Naive conditional-probability estimator trained on completed runs.
///
/// Keys are the MessagePack encoding of the full [`RunParams`], so only runs
/// with exactly the same parameters inform each other. Entries are never
/// removed; the table lives as long as the predictor.
#[derive(Debug)]
pub struct Predictor {
    max_outcome: u32,
    table: HashMap<Vec<u8>, Vec<u32>>,
}

impl Predictor {
    pub fn new(max_outcome: u32) -> Self {
        Self {
            max_outcome,
            table: HashMap::new(),
        }
    }

    pub fn n_keys(&self) -> usize {
        self.table.len()
    }

    /// Record `outcome` for a run started with `params`.
    pub fn train(&mut self, params: &RunParams, outcome: u32) -> Result<()> {
        let key = encode_key(params)?;
        let outcomes = self.table.entry(key).or_default();
        outcomes.push(outcome);
        log::debug!("trained {params:?} with {outcome} ({} samples)", outcomes.len());
        Ok(())
    }

    /// Most likely outcome for a run started with `params`.
    ///
    /// Returns 0 when nothing has been trained for `params`.
    pub fn predict(&self, params: &RunParams) -> Result<u32> {
        let key = encode_key(params)?;
        let Some(outcomes) = self.table.get(&key) else {
            return Ok(0);
        };

        let prior = outcomes.len() as f64 / self.table.len() as f64;

        let mut best_score = 0.0;
        let mut best_val = 0;
        for val in 0..=self.max_outcome {
            let evidence = self
                .table
                .values()
                .flatten()
                .filter(|&&outcome| outcome == val)
                .count();
            if evidence == 0 {
                continue;
            }

            let hits = outcomes.iter().filter(|&&outcome| outcome == val).count();
            let likelihood = hits as f64 / outcomes.len() as f64;

            let score = likelihood * prior / evidence as f64;
            if score > best_score {
                best_score = score;
                best_val = val;
            }
        }

        Ok(best_val)
    }
}

fn encode_key(params: &RunParams) -> Result<Vec<u8>> {
    encode::to_vec_named(params).context("failed to serialize run parameters")
}
