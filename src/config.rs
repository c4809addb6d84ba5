// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::env;

const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Namespaces to watch. Empty means the whole cluster.
    pub watch_namespaces: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let watch_namespaces = match env::var(WATCH_NAMESPACE_ENV) {
            Ok(raw) => parse_watch_namespaces(&raw),
            Err(env::VarError::NotPresent) => Vec::new(),
            Err(e) => anyhow::bail!("{} is not valid unicode: {}", WATCH_NAMESPACE_ENV, e),
        };

        Ok(Config { watch_namespaces })
    }

    pub fn watches_all_namespaces(&self) -> bool {
        self.watch_namespaces.is_empty()
    }
}

/// Split a comma-separated namespace list, dropping blank entries
pub fn parse_watch_namespaces(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(String::from)
        .collect()
}
