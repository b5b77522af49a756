//! Markdown to HTML conversion.
//!
//! Two interchangeable strategies are provided:
//! - [`LocalConverter`] renders in-process with pulldown-cmark and never fails.
//! - [`GitHubConverter`] delegates to the GitHub markdown API, which resolves
//!   repository references (`#123`, `@user`, commit hashes) when given a context.
//!
//! The strategy is chosen once at startup and wrapped in a [`Converter`].

mod github;
mod local;

pub use github::{GitHubConverter, DEFAULT_API_URL, REQUEST_TIMEOUT};
pub use local::{slugify, LocalConverter};

/// Error returned when a conversion attempt fails.
///
/// Only the GitHub strategy produces these; local rendering accepts any input.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Transport failure: connection refused, DNS, TLS, client timeout.
    #[error("request to GitHub failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("GitHub API returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    /// The conversion did not finish within the allotted time.
    #[error("conversion timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// The conversion strategy selected for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum Converter {
    Local(LocalConverter),
    GitHub(GitHubConverter),
}

impl Converter {
    /// Convert `text` to HTML.
    ///
    /// `context` is the repository used to resolve cross references; the
    /// local strategy ignores it.
    pub async fn convert(&self, text: &str, context: Option<&str>) -> Result<String, ConversionError> {
        match self {
            Self::Local(local) => Ok(local.render(text)),
            Self::GitHub(github) => github.render(text, context).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::GitHub(_) => "github",
        }
    }
}

impl From<LocalConverter> for Converter {
    fn from(local: LocalConverter) -> Self {
        Self::Local(local)
    }
}

impl From<GitHubConverter> for Converter {
    fn from(github: GitHubConverter) -> Self {
        Self::GitHub(github)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_ignores_context() {
        let converter = Converter::from(LocalConverter::new());
        let plain = converter.convert("# Hello", None).await.unwrap();
        let with_context = converter
            .convert("# Hello", Some("octo-org/octo-repo"))
            .await
            .unwrap();
        assert_eq!(plain, with_context);
        assert_eq!(converter.name(), "local");
    }

    #[test]
    fn test_conversion_error_display() {
        let status = ConversionError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
            message: "API rate limit exceeded".into(),
        };
        assert_eq!(
            status.to_string(),
            "GitHub API returned 403 Forbidden: API rate limit exceeded"
        );

        let timeout = ConversionError::Timeout(std::time::Duration::from_secs(5));
        assert!(timeout.to_string().contains("timed out"));
    }
}
