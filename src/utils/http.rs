//! Shared HTTP agent and streaming download helpers.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use crate::utils::error::{ClassifierError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Validate that `source` is a non-empty http(s) URL.
///
/// No network activity happens here; callers run this before any request.
pub fn validate_source_url(source: &str) -> Result<Url> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(ClassifierError::InvalidSource(source.to_string()));
    }
    let url = Url::parse(trimmed).map_err(|_| ClassifierError::InvalidSource(source.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ClassifierError::InvalidSource(source.to_string())),
    }
}

/// Download `url` into `destination`, replacing any existing file.
///
/// Returns the number of bytes written. Transport failures surface as IO errors.
pub fn download_to_file(url: &Url, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let response = agent().get(url.as_str()).call().map_err(|e| {
        ClassifierError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("download of {} failed: {}", url, e),
        ))
    })?;

    let length = response
        .header("Content-Length")
        .and_then(|value| value.parse::<u64>().ok());
    let pb = match length {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::with_template(
            "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let mut reader = pb.wrap_read(response.into_reader());
    let mut writer = BufWriter::new(File::create(destination)?);
    let written = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    pb.finish_and_clear();

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_sources() {
        for source in ["", "   ", "ftp://example.com/data.zip", "file:///tmp/data.zip", "data.zip", "http://"] {
            let err = validate_source_url(source).unwrap_err();
            assert!(matches!(err, ClassifierError::InvalidSource(_)), "{source}");
        }
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_source_url("http://localhost:8080/data.zip").is_ok());
        let url = validate_source_url("https://example.com/archive.zip").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }
}
