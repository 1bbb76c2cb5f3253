//! `erpeto config`: Configuration management commands.

use erpeto_config::{AppConfig, ConfigError};
use std::path::PathBuf;

fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("⚠️  Config already exists at: {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", path.display());
    Ok(())
}

pub fn validate(loaded: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!(
        "   Start URL:    {}",
        config.recorder.start_url.as_deref().unwrap_or("(none)")
    );
    println!("   Timeout:      {}s ({:?})", config.recorder.timeout_secs, config.recorder.timeout_mode);
    println!("   Strict:       {}", config.reassembly.strict);
    println!("   Lookback:     {}", config.analyser.echo_lookback);
    Ok(())
}

fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.recorder.keep_only_same_origin && config.recorder.start_url.is_none() {
        warnings.push("keep_only_same_origin has no effect without recorder.start_url");
    }
    if config.recorder.collect_all && !config.recorder.blocked_url_substrings.is_empty() {
        warnings.push("collect_all ignores blocked_url_substrings");
    }
    if config.analyser.constant_headers.is_empty() {
        warnings.push("No constant headers: boilerplate headers will be searched");
    }
    warnings
}

pub fn show(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}
