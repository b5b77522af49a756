use anyhow::{anyhow, Context, Result};
use clap::Parser;
use preview_config::{Config, Renderer};
use std::path::PathBuf;

/// Preview a markdown file in the browser, refreshed whenever it is saved.
#[derive(Parser, Debug)]
#[clap(name = "mdpreview", version)]
pub struct Args {
    /// Markdown file to preview.
    pub file: PathBuf,

    /// Address to listen on, e.g. `127.0.0.1:8080`.
    #[clap(long)]
    pub addr: Option<String>,

    /// Renderer to use: `github` (GitHub markdown API) or `local` (offline).
    #[clap(long)]
    pub renderer: Option<Renderer>,

    /// Repository context for the GitHub renderer, e.g. `octo-org/octo-repo`.
    #[clap(long)]
    pub context: Option<String>,

    /// Stylesheet to use instead of the bundled GitHub one.
    #[clap(long)]
    pub css: Option<PathBuf>,

    /// Do not open the preview in a browser.
    #[clap(long)]
    pub no_browser: bool,

    /// Specify the path of the config file.
    #[clap(long = "config")]
    pub config_file: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[clap(long)]
    pub log: Option<PathBuf>,
}

/// Effective settings after merging the command line over the config file.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    /// Absolute path of the markdown file.
    pub file: PathBuf,
    pub addr: String,
    pub renderer: Renderer,
    pub context: Option<String>,
    pub api_url: String,
    pub token: Option<String>,
    pub css: Option<PathBuf>,
    pub open_browser: bool,
}

impl Args {
    /// Merge with `config`, command line flags win. Fails if the markdown or
    /// CSS file does not exist.
    pub fn into_settings(self, config: Config) -> Result<Settings> {
        let file = self
            .file
            .canonicalize()
            .with_context(|| format!("markdown file {} is not found", self.file.display()))?;
        if !file.is_file() {
            return Err(anyhow!("{} is not a file", file.display()));
        }

        let css = match self.css.or(config.style.css) {
            Some(css) => Some(
                css.canonicalize()
                    .with_context(|| format!("CSS file {} is not found", css.display()))?,
            ),
            None => None,
        };

        let token = config.render.token();

        Ok(Settings {
            file,
            addr: self.addr.unwrap_or(config.server.addr),
            renderer: self.renderer.unwrap_or(config.render.renderer),
            context: self.context.or(config.render.context),
            api_url: config.render.api_url,
            token,
            css,
            open_browser: !self.no_browser && config.server.open_browser,
        })
    }
}
