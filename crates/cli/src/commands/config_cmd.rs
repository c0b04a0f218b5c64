//! `stepwise config`: configuration display.

use std::path::PathBuf;

use stepwise_config::AppConfig;

/// Print the effective configuration with secrets masked.
pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut shown = config.clone();
    if shown.model.api_key.is_some() {
        shown.model.api_key = Some("********".into());
    }
    let toml_str = toml::to_string_pretty(&shown)?;
    println!("{toml_str}");
    Ok(())
}

pub fn show_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn path(explicit: Option<&PathBuf>) {
    let config_path = explicit
        .cloned()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", config_path.display());
}
