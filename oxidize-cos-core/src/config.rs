//! Document configuration.

/// How [`CosDocument::add_xref_entries`](crate::document::CosDocument::add_xref_entries)
/// treats keys that already have an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XrefMergePolicy {
    /// The entry merged last wins. Sections must be merged oldest first,
    /// so that the newest incremental update takes precedence.
    #[default]
    Overwrite,
    /// The entry merged first wins. Suits readers that walk the `/Prev`
    /// chain from the newest section backwards.
    KeepExisting,
}

/// Configuration options for a [`CosDocument`](crate::document::CosDocument)
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Cache structural resolution failures as null
    pub lenient: bool,
    /// Attach the change tracker to objects registered in the pool
    pub track_changes: bool,
    /// Maximum container nesting followed when indexing references
    pub max_nesting_depth: usize,
    /// Policy for cross-reference entries of keys already present
    pub xref_merge: XrefMergePolicy,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            lenient: true,
            track_changes: true,
            max_nesting_depth: 64,
            xref_merge: XrefMergePolicy::Overwrite,
        }
    }
}

impl DocumentOptions {
    /// Options that retry failed resolutions instead of caching null
    pub fn strict() -> Self {
        Self {
            lenient: false,
            ..Self::default()
        }
    }

    /// Options for documents that are only read, never saved
    pub fn read_only() -> Self {
        Self {
            track_changes: false,
            ..Self::default()
        }
    }

    pub fn with_lenient(mut self, enabled: bool) -> Self {
        self.lenient = enabled;
        self
    }

    pub fn with_change_tracking(mut self, enabled: bool) -> Self {
        self.track_changes = enabled;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_xref_merge(mut self, policy: XrefMergePolicy) -> Self {
        self.xref_merge = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = DocumentOptions::default();
        assert!(options.lenient);
        assert!(options.track_changes);
        assert_eq!(options.max_nesting_depth, 64);
        assert_eq!(options.xref_merge, XrefMergePolicy::Overwrite);
    }

    #[test]
    fn test_presets() {
        assert!(!DocumentOptions::strict().lenient);
        assert!(DocumentOptions::strict().track_changes);
        assert!(!DocumentOptions::read_only().track_changes);
        assert!(DocumentOptions::read_only().lenient);
    }

    #[test]
    fn test_builder() {
        let options = DocumentOptions::default()
            .with_lenient(false)
            .with_change_tracking(false)
            .with_max_nesting_depth(8)
            .with_xref_merge(XrefMergePolicy::KeepExisting);

        assert!(!options.lenient);
        assert!(!options.track_changes);
        assert_eq!(options.max_nesting_depth, 8);
        assert_eq!(options.xref_merge, XrefMergePolicy::KeepExisting);
    }
}
