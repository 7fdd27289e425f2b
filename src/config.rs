//! Optional config file loading. Search order: ./bookwright.toml, then
//! $XDG_CONFIG_HOME/bookwright/config.toml (or ~/.config/bookwright/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override
/// defaults, and CLI flags override config. API keys from the environment win
/// over config keys.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Text provider priority order, e.g. ["openai", "anthropic"].
    pub provider_order: Option<Vec<String>>,
    /// Image provider priority order, e.g. ["openai", "gemini"].
    pub image_provider_order: Option<Vec<String>>,
    /// Delay in milliseconds between chapter calls (default 500).
    pub pacing_ms: Option<u64>,
    /// Default author byline.
    pub author: Option<String>,
    pub openai_model: Option<String>,
    pub anthropic_model: Option<String>,
    pub gemini_model: Option<String>,
    pub openrouter_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

/// Search order: (1) ./bookwright.toml, (2) $XDG_CONFIG_HOME/bookwright/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present
/// file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("bookwright.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("bookwright").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
