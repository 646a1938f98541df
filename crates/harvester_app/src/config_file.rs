//! Loading source configurations from RON files.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use harvester_core::{HarvestState, PageFormat, SourceConfig};
use harvester_engine::validate_catalog;

/// Settings from the command line that win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub max_pages: Option<u32>,
    pub vars: BTreeMap<String, String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut SourceConfig) {
        if let Some(limit) = self.max_pages {
            config.max_pages = Some(limit);
        }
        config
            .vars
            .extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Parses a `NAME=VALUE` command line var.
pub fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}

pub fn load_source(path: &Path, overrides: &Overrides) -> Result<SourceConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read source config {}", path.display()))?;
    let mut config = parse_source(&text)
        .with_context(|| format!("failed to parse source config {}", path.display()))?;
    overrides.apply(&mut config);
    Ok(config)
}

pub fn parse_source(text: &str) -> Result<SourceConfig, ron::error::SpannedError> {
    ron::from_str(text)
}

/// Compiles the config the way a harvest would, without touching the network.
pub fn check_source(config: &SourceConfig) -> Result<()> {
    HarvestState::new(config).with_context(|| format!("source {:?} is invalid", config.name))?;
    if let PageFormat::Html(catalog) = &config.format {
        validate_catalog(catalog)
            .with_context(|| format!("source {:?} has an invalid card catalog", config.name))?;
    }
    Ok(())
}
