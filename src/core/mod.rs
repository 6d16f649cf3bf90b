// src/core/mod.rs

pub mod args;
pub mod config_loader;
pub mod generator;
pub mod gitops;
pub mod provider;
pub mod schema;
