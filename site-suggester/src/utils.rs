/// Text processing utilities
pub mod text {
    /// Keep at most `max_chars` characters, appending "..." when something was cut.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }

    /// Truncate to a byte budget without splitting a character.
    pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
        if s.len() <= max_bytes {
            return s;
        }
        let mut end = max_bytes;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        &s[..end]
    }

    /// Contents of the first fenced code block, or the trimmed input when there is none.
    ///
    /// An unterminated fence yields everything after the opening marker.
    pub fn strip_code_fence(text: &str) -> String {
        let trimmed = text.trim();

        if let Some(start) = trimmed.find("```json") {
            let rest = &trimmed[start + 7..];
            let end = rest.find("```").unwrap_or(rest.len());
            return rest[..end].trim().to_string();
        }

        if let Some(start) = trimmed.find("```") {
            let mut rest = &trimmed[start + 3..];
            // Skip a language tag such as "JSON" or "javascript"
            if let Some(newline) = rest.find('\n') {
                if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
                    rest = &rest[newline + 1..];
                }
            }
            let end = rest.find("```").unwrap_or(rest.len());
            return rest[..end].trim().to_string();
        }

        trimmed.to_string()
    }

    /// Remove every code-fence marker but keep the text between them.
    pub fn strip_fence_markers(text: &str) -> String {
        text.lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Clean and normalize whitespace for log previews
    pub fn single_line(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Absolute http(s) URL for `href` on the same host as `base`, if any.
    pub fn same_site_link(base: &Url, href: &str) -> Option<String> {
        let joined = base.join(href.trim()).ok()?;
        if joined.scheme() != "http" && joined.scheme() != "https" {
            return None;
        }
        if joined.host_str() != base.host_str() {
            return None;
        }
        let mut joined = joined;
        joined.set_fragment(None);
        Some(joined.to_string())
    }
}

/// Time utilities
pub mod time {
    use std::time::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}
