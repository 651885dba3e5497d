//! Command handlers for the `glimpse` binary.

pub mod caption;
pub mod config;
pub mod interactive;
pub mod models;

use std::path::Path;

use anyhow::Context;
use glimpse_core::Config;

/// Load the config file a command was pointed at.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_from(path).with_context(|| {
        format!(
            "Could not load {}. Create one with `glimpse config init`.",
            path.display()
        )
    })
}
