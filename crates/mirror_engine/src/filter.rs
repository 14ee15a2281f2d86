use url::Url;

/// Reject (`-R`) and exclude (`-X`) rules applied to discovered references
/// before they are claimed. An empty filter allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFilter {
    rejected_extensions: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl ReferenceFilter {
    /// Build from comma-separated lists such as `"jpg,.gif"` and `"/js,/img/"`.
    pub fn parse(reject: Option<&str>, exclude: Option<&str>) -> Self {
        let rejected_extensions = split_list(reject)
            .map(|ext| {
                ext.trim_start_matches('*')
                    .trim_start_matches('.')
                    .to_ascii_lowercase()
            })
            .filter(|ext| !ext.is_empty())
            .collect();

        let excluded_dirs = split_list(exclude)
            .map(|dir| {
                let dir = dir.trim_matches('/');
                format!("/{dir}")
            })
            .filter(|dir| dir != "/")
            .collect();

        Self {
            rejected_extensions,
            excluded_dirs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rejected_extensions.is_empty() && self.excluded_dirs.is_empty()
    }

    pub fn allows(&self, url: &Url) -> bool {
        !self.is_rejected(url) && !self.is_excluded(url)
    }

    fn is_rejected(&self, url: &Url) -> bool {
        if self.rejected_extensions.is_empty() {
            return false;
        }
        let last_segment = url.path().rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.rejected_extensions.iter().any(|r| *r == ext)
            }
            None => false,
        }
    }

    fn is_excluded(&self, url: &Url) -> bool {
        let path = url.path();
        self.excluded_dirs.iter().any(|dir| {
            path.strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}
