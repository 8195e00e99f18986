use std::path::PathBuf;

use anyhow::Result;
use datebook_core::config::DatebookConfig;
use owo_colors::OwoColorize;

pub fn show() -> Result<()> {
    let config_path = DatebookConfig::config_path()?;
    let config = DatebookConfig::load()?;

    println!("{}", "Paths".bold());
    println!("  Config:     {}", config_path.display());
    println!("  Data:       {}", config.data_path().display());
    println!("  Storage:    {}", config.storage_path().display());
    println!();
    println!("{}", "Backend".bold());
    println!("  API:        {}", config.api_base_url);
    println!("  Refresh:    every {}", config.refresh_interval);

    Ok(())
}

pub fn set(api_url: Option<String>, data_dir: Option<PathBuf>, refresh_interval: Option<String>) -> Result<()> {
    if api_url.is_none() && data_dir.is_none() && refresh_interval.is_none() {
        anyhow::bail!("Nothing to change. See `datebook config set --help`.");
    }

    let config_path = DatebookConfig::config_path()?;
    // Environment overrides stay out of the saved file
    let mut config = DatebookConfig::load_file(&config_path)?;

    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(interval) = refresh_interval {
        config.refresh_interval = interval;
    }

    config.save(&config_path)?;
    println!("{} Saved {}", "✓".green(), config_path.display());
    Ok(())
}
