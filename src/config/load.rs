// src/config/load.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::DigestConfig;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/digest.toml", "config/digest.json"];

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<DigestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing config {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $DIGEST_CONFIG_PATH
/// 2) config/digest.toml
/// 3) config/digest.json
pub fn load_default() -> Result<DigestConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for p in DEFAULT_CONFIG_PATHS {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
    }
    Err(anyhow!(
        "no config found (set {ENV_CONFIG_PATH} or create {})",
        DEFAULT_CONFIG_PATHS[0]
    ))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<DigestConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON config");
    }
    match toml::from_str::<DigestConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => {
            // Extension-less files may still be JSON.
            if hint_ext != "toml" {
                if let Ok(cfg) = serde_json::from_str(s) {
                    return Ok(cfg);
                }
            }
            Err(anyhow!("invalid TOML config: {toml_err}"))
        }
    }
}
