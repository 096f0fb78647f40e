//! Daily BTC price forecasting pipeline.
//!
//! Stages: validate raw CSVs, combine them into one date-aligned table,
//! select predictive features, then train and evaluate a forecasting model
//! on a chronological train/validation/test split.

pub mod application;
pub mod config;
pub mod domain;
