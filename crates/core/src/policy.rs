//! Syncable-file policy for upward sync.
//!
//! Provides [`SyncPolicy`] which encapsulates the extension allow-list,
//! ignore patterns, and `max_upload_size` from [`SyncConfig`] and evaluates
//! candidate files before they are uploaded.
//!
//! The policy gates *uploads only*: files outside the allow-list are never
//! uploaded, but they are still downloaded if the server lists them.
//!
//! # Decision model
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Extension not in the allow-list | `NotSyncable` |
//! | Path matches an ignore pattern | `Ignored` |
//! | Size exceeds `max_upload_size` (when > 0) | `Oversize` |
//! | None of the above | `Allow` |

use glob_match::glob_match;
use tracing::debug;

use crate::config::SyncConfig;

// ---------------------------------------------------------------------------
// Decision enum
// ---------------------------------------------------------------------------

/// The outcome of evaluating a file against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// File passes all checks; upload it normally.
    Allow,
    /// Extension is outside the allow-list; never uploaded.
    NotSyncable { extension: String },
    /// File matches an ignore pattern; skip it.
    Ignored { pattern: String },
    /// File exceeds the configured `max_upload_size`; skip it.
    Oversize { size: u64, limit: u64 },
}

impl PolicyDecision {
    /// `true` if the file should be uploaded.
    pub fn should_upload(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Short human-readable label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::NotSyncable { .. } => "not-syncable",
            Self::Ignored { .. } => "ignored",
            Self::Oversize { .. } => "oversize",
        }
    }
}

// ---------------------------------------------------------------------------
// SyncPolicy
// ---------------------------------------------------------------------------

/// Evaluates candidate files against the extension allow-list, ignore
/// patterns, and size limit. Cheap to clone (all data is owned strings/u64).
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Lowercased extension allow-list, without leading dots.
    extensions: Vec<String>,
    /// Glob patterns matched against the *relative* path.
    ignore_patterns: Vec<String>,
    /// Maximum upload size in bytes. 0 = no limit.
    max_upload_size: u64,
}

impl SyncPolicy {
    /// Create a policy from the `[sync]` config section.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.syncable_extensions.clone(),
            config.ignore_patterns.clone(),
            config.max_upload_size,
        )
    }

    /// Create a policy from raw values.
    pub fn new(extensions: Vec<String>, ignore_patterns: Vec<String>, max_upload_size: u64) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            extensions,
            ignore_patterns,
            max_upload_size,
        }
    }

    /// `true` if the extension (case-insensitive, no leading dot) is in the
    /// allow-list.
    pub fn is_syncable_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    /// Evaluate a candidate file for upward sync.
    ///
    /// `rel_path` is the file's path relative to the tree root
    /// (forward-slash separated). `size` is the file size in bytes.
    pub fn evaluate(&self, rel_path: &str, extension: &str, size: u64) -> PolicyDecision {
        if !self.is_syncable_extension(extension) {
            debug!(path = rel_path, extension, "extension outside allow-list");
            return PolicyDecision::NotSyncable {
                extension: extension.to_string(),
            };
        }

        for pattern in &self.ignore_patterns {
            if glob_match(pattern, rel_path) {
                debug!(path = rel_path, pattern = %pattern, "path matches ignore pattern");
                return PolicyDecision::Ignored {
                    pattern: pattern.clone(),
                };
            }
        }

        if self.max_upload_size > 0 && size > self.max_upload_size {
            debug!(path = rel_path, size, limit = self.max_upload_size, "file oversize");
            return PolicyDecision::Oversize {
                size,
                limit: self.max_upload_size,
            };
        }

        PolicyDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SyncPolicy {
        SyncPolicy::new(
            vec!["md".into(), ".TXT".into()],
            vec!["drafts/**".into(), "*.tmp.md".into()],
            1024,
        )
    }

    #[test]
    fn test_extension_allow_list_is_case_insensitive() {
        let p = policy();
        assert!(p.is_syncable_extension("md"));
        assert!(p.is_syncable_extension("MD"));
        assert!(p.is_syncable_extension(".md"));
        assert!(p.is_syncable_extension("txt"));
        assert!(!p.is_syncable_extension("png"));
    }

    #[test]
    fn test_not_syncable_extension() {
        let d = policy().evaluate("image.png", "png", 10);
        assert!(matches!(d, PolicyDecision::NotSyncable { .. }));
        assert!(!d.should_upload());
        assert_eq!(d.label(), "not-syncable");
    }

    #[test]
    fn test_ignore_patterns() {
        let d = policy().evaluate("drafts/wip.md", "md", 10);
        assert!(matches!(d, PolicyDecision::Ignored { .. }));

        let d = policy().evaluate("scratch.tmp.md", "md", 10);
        assert!(matches!(d, PolicyDecision::Ignored { .. }));
    }

    #[test]
    fn test_oversize() {
        let d = policy().evaluate("big.md", "md", 4096);
        assert!(matches!(
            d,
            PolicyDecision::Oversize {
                size: 4096,
                limit: 1024
            }
        ));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let p = SyncPolicy::new(vec!["md".into()], Vec::new(), 0);
        assert!(p.evaluate("huge.md", "md", u64::MAX).should_upload());
    }

    #[test]
    fn test_allow() {
        assert!(policy().evaluate("notes/a.md", "md", 10).should_upload());
    }
}
