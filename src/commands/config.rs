// src/commands/config.rs
//! `cnvs config`: read and write `section.key` settings

use anyhow::Result;
use canvas::Config;
use tracing::debug;

const USAGE: &str = "usage: cnvs config [--unset] section.key [value]";

/// Get, set or unset one configuration key
///
/// Malformed keys are reported on stdout with exit code 1.
pub fn cmd_config(
    config: &mut Config,
    unset: bool,
    name: &str,
    value: Option<&str>,
) -> Result<i32> {
    let parts: Vec<&str> = name.split('.').collect();
    let (section, key) = match parts.as_slice() {
        [key] => {
            println!("error: key does not contain a section: {}", key);
            return Ok(1);
        }
        [section, key] if !section.is_empty() && !key.is_empty() => (*section, *key),
        _ => {
            println!("{}", USAGE);
            return Ok(1);
        }
    };

    if unset {
        if config.unset(section, key) {
            debug!("Unset {}.{}", section, key);
            config.save()?;
        }
        return Ok(0);
    }

    if let Some(value) = value {
        config.set(section, key, value);
        config.save()?;
        return Ok(0);
    }

    if let Some(current) = config.get(section, key) {
        println!("{}", current);
    }
    Ok(0)
}
