use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Errors reading the config file. Never fatal, the defaults are used instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the preview server listens on.
    pub addr: String,

    /// Whether to open the preview in a browser on startup.
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            open_browser: true,
        }
    }
}

/// Which conversion strategy renders the document.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Renderer {
    /// GitHub markdown API, requires network access.
    #[default]
    Github,
    /// In-process rendering, works offline.
    Local,
}

impl FromStr for Renderer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown renderer `{other}`, expected `github` or `local`")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderConfig {
    pub renderer: Renderer,

    /// Repository context for the GitHub renderer, e.g. `octo-org/octo-repo`.
    ///
    /// References like `#42` are linked against this repository.
    pub context: Option<String>,

    /// GitHub API endpoint, change it for GitHub Enterprise.
    pub api_url: String,

    /// Environment variable holding an API token.
    ///
    /// Authenticated requests get a much higher rate limit.
    pub token_env: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            renderer: Renderer::default(),
            context: None,
            api_url: "https://api.github.com".into(),
            token_env: "GITHUB_TOKEN".into(),
        }
    }
}

impl RenderConfig {
    /// Reads the API token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct StyleConfig {
    /// Stylesheet replacing the bundled `github-markdown.css`.
    pub css: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LogConfig {
    /// Write logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,

    /// Specify the max log level.
    pub max_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            max_level: "info".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub style: StyleConfig,
    pub log: LogConfig,
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// The file the config was looked up at, if any.
    pub file_path: Option<PathBuf>,
    pub maybe_error: Option<ConfigError>,
}

/// Linux: ~/.config/mdpreview/config.toml
/// macOS: ~/Library/Application Support/mdpreview/config.toml
/// Windows: ~\AppData\Roaming\mdpreview\config\config.toml
pub fn default_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mdpreview")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the config from `specified_config_file` or the default location.
///
/// A missing file at the default location silently yields the defaults. A
/// file that can not be read or parsed also yields the defaults, with the
/// error reported in [`LoadedConfig::maybe_error`]. So does a missing file
/// that was explicitly specified.
pub fn load_config(specified_config_file: Option<PathBuf>) -> LoadedConfig {
    let specified = specified_config_file.is_some();
    let Some(path) = specified_config_file.or_else(default_config_file) else {
        return LoadedConfig {
            config: Config::default(),
            file_path: None,
            maybe_error: None,
        };
    };

    let (config, maybe_error) = match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => (config, None),
            Err(source) => (
                Config::default(),
                Some(ConfigError::Parse {
                    path: path.clone(),
                    source,
                }),
            ),
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !specified => {
            tracing::debug!(path = %path.display(), "No config file found");
            (Config::default(), None)
        }
        Err(source) => (
            Config::default(),
            Some(ConfigError::Read {
                path: path.clone(),
                source,
            }),
        ),
    };

    LoadedConfig {
        config,
        file_path: Some(path),
        maybe_error,
    }
}
