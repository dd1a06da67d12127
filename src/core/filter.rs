use regex::Regex;

/// Name filters for the folder-style listing helpers. Every set field must
/// match; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    pub extension: Option<String>,
    pub pattern: Option<Regex>,
}

impl KeyFilter {
    pub fn starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.starts_with = Some(prefix.into());
        self
    }

    pub fn ends_with(mut self, suffix: impl Into<String>) -> Self {
        self.ends_with = Some(suffix.into());
        self
    }

    /// Matches keys with this extension, given with or without the dot.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = Some(extension.trim_start_matches('.').to_string());
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Folder names are compared without their trailing `/`.
    pub fn matches(&self, name: &str) -> bool {
        let trimmed = name.strip_suffix('/').unwrap_or(name);

        if let Some(prefix) = &self.starts_with {
            if !name.starts_with(prefix.as_str()) {
                return false;
            }
        }

        if let Some(suffix) = &self.ends_with {
            if !trimmed.ends_with(suffix.as_str()) {
                return false;
            }
        }

        if let Some(extension) = &self.extension {
            let matches_extension = trimmed
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension));
            if !matches_extension {
                return false;
            }
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(name) {
                return false;
            }
        }

        true
    }
}
