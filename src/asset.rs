// ===============================
// src/asset.rs (Asset value object + Balance container)
// ===============================
//
// Asset is a value object: every operation returns a new Asset.
// Balance is the mutable container: `change` applies deltas in place.
// Deltas dihitung secara fungsional, lalu diterapkan ke Balance.
//
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{self, CodecError};

/// Float residue below zero that is still treated as zero.
pub const EPSILON: f64 = 1e-9;

/// Price table keyed by asset name. The capital asset must be priced at 1.
pub type Prices = HashMap<String, f64>;

#[derive(Debug, Error, PartialEq)]
pub enum AssetError {
    #[error("asset {left} can not change with a delta of {right}")]
    NameMismatch { left: String, right: String },
    #[error("asset {name} would go negative (free={free}, locked={locked})")]
    Negative { name: String, free: f64, locked: f64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum BalanceError {
    #[error("balance total: {0} does not have a price")]
    MissingPrice(String),
}

/// Quantity of one named asset, split into free and locked parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub free: f64,
    pub locked: f64,
}

impl Asset {
    pub fn new(name: impl Into<String>, free: f64, locked: f64) -> Self {
        Self { name: name.into(), free, locked }
    }

    pub fn zero(name: impl Into<String>) -> Self {
        Self::new(name, 0.0, 0.0)
    }

    /// Component-wise sum with `delta`. Names must match and the result
    /// must not go below zero.
    pub fn change(&self, delta: &Asset) -> Result<Asset, AssetError> {
        if self.name != delta.name {
            return Err(AssetError::NameMismatch {
                left: self.name.clone(),
                right: delta.name.clone(),
            });
        }
        let free = non_negative(self.free + delta.free);
        let locked = non_negative(self.locked + delta.locked);
        match (free, locked) {
            (Some(free), Some(locked)) => Ok(Asset::new(self.name.clone(), free, locked)),
            _ => Err(AssetError::Negative {
                name: self.name.clone(),
                free: self.free + delta.free,
                locked: self.locked + delta.locked,
            }),
        }
    }

    pub fn unlock_all(&self) -> Asset {
        Asset::new(self.name.clone(), self.free + self.locked, 0.0)
    }

    pub fn lock_all(&self) -> Asset {
        Asset::new(self.name.clone(), 0.0, self.locked + self.free)
    }

    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

fn non_negative(v: f64) -> Option<f64> {
    if v >= 0.0 {
        Some(v)
    } else if v >= -EPSILON {
        Some(0.0)
    } else {
        None
    }
}

/// Assets held on the simulated exchange, keyed by asset name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(BTreeMap<String, Asset>);

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        Self(assets.into_iter().map(|a| (a.name.clone(), a)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.0.get(name)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies every delta in sequence, creating zero entries for unseen
    /// names. All or nothing: on error the balance is left untouched.
    pub fn change(&mut self, deltas: &[Asset]) -> Result<(), AssetError> {
        let mut staged: BTreeMap<String, Asset> = BTreeMap::new();
        for delta in deltas {
            let current = match staged.get(&delta.name) {
                Some(a) => a.clone(),
                None => self
                    .0
                    .get(&delta.name)
                    .cloned()
                    .unwrap_or_else(|| Asset::zero(delta.name.clone())),
            };
            staged.insert(delta.name.clone(), current.change(delta)?);
        }
        self.0.extend(staged);
        Ok(())
    }

    /// Mark-to-market value. Every held asset needs an entry in `prices`.
    pub fn total(&self, prices: &Prices) -> Result<f64, BalanceError> {
        let mut total = 0.0;
        for (name, asset) in &self.0 {
            let price = prices
                .get(name)
                .ok_or_else(|| BalanceError::MissingPrice(name.clone()))?;
            total += asset.total() * price;
        }
        Ok(total)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        domain::encode(self)
    }

    pub fn decode(bs: &[u8]) -> Result<Balance, CodecError> {
        domain::decode(bs)
    }
}
