//! `config.toml` in the Lectern home directory.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_API_URL: &str = "https://api.moonshot.cn/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "moonshot-v1-32k";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Most recent history messages sent along with each question.
    pub history_window: usize,
    /// Character cap on page text included in the chat context.
    pub context_char_limit: usize,
    /// Outline JSON. Relative paths resolve against the home directory.
    pub outline: Option<PathBuf>,
    /// Directory of `page-<n>.txt` files with extracted page text.
    pub pages_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            history_window: 10,
            context_char_limit: 4000,
            outline: None,
            pages_dir: None,
        }
    }
}

impl Config {
    /// Load `<home>/config.toml`. A missing file yields the defaults; a file
    /// that does not parse is an error.
    pub fn load(home: &Path) -> anyhow::Result<Self> {
        let path = home.join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let mut config =
            Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.outline = config.outline.map(|p| resolve(home, p));
        config.pages_dir = config.pages_dir.map(|p| resolve(home, p));
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn resolve(home: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() { p } else { home.join(p) }
}

/// `$LECTERN_HOME` if set, otherwise `~/.lectern`.
pub fn find_lectern_home() -> anyhow::Result<PathBuf> {
    if let Ok(val) = std::env::var("LECTERN_HOME")
        && !val.is_empty()
    {
        return Ok(PathBuf::from(val));
    }
    let mut home = dirs::home_dir().context("could not find home directory")?;
    home.push(".lectern");
    Ok(home)
}
