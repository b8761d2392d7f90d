// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::asset::Balance;
use crate::matching::Fill;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque payload encoding used on the pub/sub boundary.
pub fn encode<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(v)?)
}

pub fn decode<T: DeserializeOwned>(bs: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bs)?)
}

/// Market observation: `volume` is the liquidity available at `price`
/// and is consumed by matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub id: u64,
    pub date: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(id: u64, date: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self { id, date, price, volume }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    pub fn decode(bs: &[u8]) -> Result<Tick, CodecError> {
        decode(bs)
    }
}

/// Mark-to-market value of a balance at one simulated instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnap {
    pub date: DateTime<Utc>,
    pub amount: f64,
    pub price: f64,
}

impl fmt::Display for BalanceSnap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, amount, {:.6}, price, {:.6}", self.date, self.amount, self.price)
    }
}

// Recorder events (JSONL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Tick(Tick),
    Fill(Fill),
    Balance(Balance),
    Snap(BalanceSnap),
    Note(String),
}
