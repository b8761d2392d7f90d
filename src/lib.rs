// ===============================
// src/lib.rs
// ===============================
//
// exch_backtest: matching core of a spot exchange backtester.
// Ticks are matched against price-time sorted resting orders, fills move
// free/locked balances, and a balance service snapshots net worth once
// per simulated day.
//
pub mod asset;
pub mod balance_service;
pub mod clock;
pub mod config;
pub mod domain;
pub mod feed;
pub mod matching;
pub mod metrics;
pub mod order;
pub mod order_list;
pub mod pubsub;
pub mod recorder;
pub mod replay;
