// SPDX-License-Identifier: MIT

//! composite-rs - composite strategy graphs for trading signals
//!
//! - [composite] - graph normalization, validation, pipeline execution and
//!   output merging
//! - [strategies] - deterministic local strategies and their registry
//! - [ai] - AI gating, prompt templates and the model explainer
//! - [platform] - production collaborators wiring the above together
//! - [server] - HTTP API

pub mod ai;
pub mod composite;
pub mod config;
pub mod core;
pub mod platform;
pub mod server;
pub mod strategies;
