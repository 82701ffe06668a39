use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = default_write_path();
    let written = write_config(&config_content, &config_path)?;
    println!("Config file written to {}", written.display());
    Ok(())
}

/// ~/.config/reqlog/config.yml when a home directory is known, else /etc/reqlog/config.yml
fn default_write_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home_dir) => home_dir.join(".config/reqlog/config.yml"),
        None => PathBuf::from("/etc/reqlog/config.yml"),
    }
}

/// Write `content` to `path`, refusing to overwrite an existing file.
pub fn write_config(content: &str, path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout to print the config",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Could not create directory {}: {}", parent.display(), e))?;
    }

    fs::write(path, content)?;
    Ok(path.to_path_buf())
}
