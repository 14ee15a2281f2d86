use std::fs;
use std::io;
use std::path::Path;

/// One explicitly requested download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Output file name overriding the one derived from the URL.
    pub file_name: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name.filter(|name| !name.trim().is_empty());
        self
    }
}

/// Read one URL per line, trimming whitespace and skipping blank lines.
pub fn read_url_list(path: &Path) -> io::Result<Vec<DownloadRequest>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

pub fn parse_url_list(raw: &str) -> Vec<DownloadRequest> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(DownloadRequest::new)
        .collect()
}
