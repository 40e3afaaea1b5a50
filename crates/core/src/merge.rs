//! Three-way merge engine.
//!
//! Uses the `diffy` crate to perform line-based three-way merges between an
//! ancestor, "ours" (the local edit), and "theirs" (the server's current
//! content). This is the implementation behind `attempt_auto_merge` for the
//! bundled remotes; the conflict resolver only consumes its verdict.

use tracing::debug;

/// Standard conflict delimiters, also recognized when checking merged
/// output for residual conflicts.
pub const MARKER_OURS: &str = "<<<<<<<";
pub const MARKER_SEP: &str = "=======";
pub const MARKER_THEIRS: &str = ">>>>>>>";

/// The result of a three-way merge attempt.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The merged content (contains conflict markers if `has_conflicts`).
    pub merged_content: String,
    /// Whether the merge completed without conflicts.
    pub has_conflicts: bool,
}

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Attempt a three-way merge of `ancestor`, `ours`, and `theirs`.
    ///
    /// Always returns merged content. If the merge is clean,
    /// `has_conflicts` is `false`; otherwise the content carries standard
    /// `<<<<<<<` / `=======` / `>>>>>>>` markers.
    pub fn three_way_merge(ancestor: &str, ours: &str, theirs: &str) -> MergeResult {
        // Fast path: if either side is identical to the ancestor, the other
        // side wins cleanly.
        if ours == ancestor {
            debug!("ours == ancestor, theirs wins cleanly");
            return MergeResult {
                merged_content: theirs.to_string(),
                has_conflicts: false,
            };
        }
        if theirs == ancestor {
            debug!("theirs == ancestor, ours wins cleanly");
            return MergeResult {
                merged_content: ours.to_string(),
                has_conflicts: false,
            };
        }

        // Fast path: both sides made the exact same change.
        if ours == theirs {
            debug!("ours == theirs, identical changes");
            return MergeResult {
                merged_content: ours.to_string(),
                has_conflicts: false,
            };
        }

        // Apply the theirs-patch onto ours; if that fails, the reverse.
        // A clean application in either direction is an automatic merge.
        let patch_theirs = diffy::create_patch(ancestor, theirs);
        if let Ok(merged) = diffy::apply(ours, &patch_theirs) {
            debug!("clean merge via applying theirs-patch to ours");
            return MergeResult {
                merged_content: merged,
                has_conflicts: false,
            };
        }

        let patch_ours = diffy::create_patch(ancestor, ours);
        if let Ok(merged) = diffy::apply(theirs, &patch_ours) {
            debug!("clean merge via applying ours-patch to theirs");
            return MergeResult {
                merged_content: merged,
                has_conflicts: false,
            };
        }

        debug!("automatic merge failed, falling back to diffy::merge");
        match diffy::merge(ancestor, ours, theirs) {
            Ok(merged) => MergeResult {
                merged_content: merged,
                has_conflicts: false,
            },
            Err(conflicted) => MergeResult {
                merged_content: conflicted,
                has_conflicts: true,
            },
        }
    }

    /// Quick check: can these three versions be merged without conflicts?
    pub fn can_auto_merge(ancestor: &str, ours: &str, theirs: &str) -> bool {
        !Self::three_way_merge(ancestor, ours, theirs).has_conflicts
    }
}

/// `true` if the content still carries conflict delimiters.
///
/// A merged document with residual markers must never be uploaded as a
/// resolved version.
pub fn has_conflict_markers(content: &str) -> bool {
    content.lines().any(|line| {
        line.starts_with(MARKER_OURS)
            || line.starts_with(MARKER_THEIRS)
            || line == MARKER_SEP
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_files() {
        let ancestor = "line1\nline2\nline3\n";
        let result = Merger::three_way_merge(ancestor, ancestor, ancestor);
        assert!(!result.has_conflicts);
        assert_eq!(result.merged_content, ancestor);
    }

    #[test]
    fn test_only_ours_changed() {
        let ancestor = "line1\nline2\nline3\n";
        let ours = "line1\nmodified\nline3\n";
        let result = Merger::three_way_merge(ancestor, ours, ancestor);
        assert!(!result.has_conflicts);
        assert_eq!(result.merged_content, ours);
    }

    #[test]
    fn test_only_theirs_changed() {
        let ancestor = "line1\nline2\nline3\n";
        let theirs = "line1\nline2\nmodified\n";
        let result = Merger::three_way_merge(ancestor, ancestor, theirs);
        assert!(!result.has_conflicts);
        assert_eq!(result.merged_content, theirs);
    }

    #[test]
    fn test_non_overlapping_changes() {
        let ancestor = "aaa\nbbb\nccc\nddd\neee\n";
        let ours = "AAA\nbbb\nccc\nddd\neee\n";
        let theirs = "aaa\nbbb\nccc\nddd\nEEE\n";
        let result = Merger::three_way_merge(ancestor, ours, theirs);
        assert!(!result.has_conflicts);
        assert!(result.merged_content.contains("AAA"));
        assert!(result.merged_content.contains("EEE"));
    }

    #[test]
    fn test_conflicting_changes() {
        let ancestor = "line1\noriginal\nline3\n";
        let ours = "line1\nours_version\nline3\n";
        let theirs = "line1\ntheirs_version\nline3\n";
        let result = Merger::three_way_merge(ancestor, ours, theirs);
        assert!(result.has_conflicts);
        assert!(has_conflict_markers(&result.merged_content));
    }

    #[test]
    fn test_same_change_both_sides() {
        let result = Merger::three_way_merge("old\n", "new\n", "new\n");
        assert!(!result.has_conflicts);
        assert_eq!(result.merged_content, "new\n");
    }

    #[test]
    fn test_can_auto_merge() {
        let ancestor = "aaa\nbbb\nccc\n";
        assert!(Merger::can_auto_merge(ancestor, "AAA\nbbb\nccc\n", ancestor));
        assert!(!Merger::can_auto_merge(
            "line1\noriginal\nline3\n",
            "line1\nours\nline3\n",
            "line1\ntheirs\nline3\n"
        ));
    }

    #[test]
    fn test_marker_detection() {
        assert!(!has_conflict_markers("plain\ntext\n"));
        assert!(has_conflict_markers(
            "a\n<<<<<<< ours\nb\n=======\nc\n>>>>>>> theirs\n"
        ));
        // An equals ruler longer than the separator is not a marker.
        assert!(!has_conflict_markers("title\n==========\nbody\n"));
    }
}
