use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use url::Url;

const INDEX_FILE: &str = "index.html";
const MAX_SEGMENT_LEN: usize = 120;

/// Where fetched files land under the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLayout {
    /// `<root>/<host>/<path>`, reproducing the site's structure.
    Mirror { root: PathBuf },
    /// Every file directly inside `dir`, named after the last path segment.
    Flat { dir: PathBuf },
}

impl OutputLayout {
    pub fn root(&self) -> &Path {
        match self {
            OutputLayout::Mirror { root } => root,
            OutputLayout::Flat { dir } => dir,
        }
    }

    /// Deterministic destination for `url`; `file_name` overrides the flat name.
    pub fn destination_for(&self, url: &Url, file_name: Option<&str>) -> PathBuf {
        match (self, file_name) {
            (OutputLayout::Flat { dir }, Some(name)) => dir.join(sanitize_segment(name)),
            (OutputLayout::Flat { dir }, None) => dir.join(flat_file_name(url)),
            (OutputLayout::Mirror { root }, _) => mirror_path(root, url),
        }
    }
}

/// `<root>/<host>[_<port>]/<segments>`, with `index.html` for directory-like paths.
pub fn mirror_path(root: &Path, url: &Url) -> PathBuf {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}_{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => "unknown-host".to_string(),
    };

    let mut path = root.join(sanitize_segment(&host));
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.collect())
        .unwrap_or_default();
    let (file, dirs) = match segments.split_last() {
        Some((last, dirs)) if !last.is_empty() => (*last, dirs),
        Some((_, dirs)) => (INDEX_FILE, dirs),
        None => (INDEX_FILE, &[][..]),
    };

    for dir in dirs.iter().filter(|d| !d.is_empty()) {
        path.push(sanitize_segment(dir));
    }
    path.push(file_name_with_query(file, url.query()));
    path
}

/// File name used for single and batch downloads.
pub fn flat_file_name(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or(INDEX_FILE);
    file_name_with_query(last, url.query())
}

fn file_name_with_query(file: &str, query: Option<&str>) -> String {
    let name = sanitize_segment(file);
    match query {
        Some(query) => with_suffix(&name, &short_hash(query)),
        None => name,
    }
}

/// Insert `--{suffix}` before the extension: `page.html` -> `page--ab12cd34.html`.
fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}--{suffix}.{ext}"),
        _ => format!("{name}--{suffix}"),
    }
}

fn sanitize_segment(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_end_matches(&[' ', '.'][..]).to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        cleaned = "_".to_string();
    }
    if cleaned.len() > MAX_SEGMENT_LEN {
        let mut cut = MAX_SEGMENT_LEN;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}

pub(crate) fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Session-wide record of assigned destination paths.
///
/// Two URLs can map to the same preferred path (`/a/` and `/a/index.html`,
/// or equal last segments in a flat layout); the later one gets a name
/// disambiguated by a hash of its URL.
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, url: &str, preferred: PathBuf) -> PathBuf {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        if reserved.insert(preferred.clone()) {
            return preferred;
        }

        let file_name = preferred
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| INDEX_FILE.to_string());
        let hash = short_hash(url);
        let mut attempt = 0u32;
        loop {
            let suffix = if attempt == 0 {
                hash.clone()
            } else {
                format!("{hash}-{attempt}")
            };
            let candidate = preferred.with_file_name(with_suffix(&file_name, &suffix));
            if reserved.insert(candidate.clone()) {
                return candidate;
            }
            attempt += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
