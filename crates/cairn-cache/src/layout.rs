//! Where per-rule bookkeeping lives inside the output tree.

use cairn_core::RuleId;
use std::path::{Path, PathBuf};

/// Project-relative metadata directory of a rule:
/// `<output_root>/bin/<base_path>/.<short_name>/metadata`.
pub fn metadata_directory(output_root: &Path, rule: &RuleId) -> PathBuf {
    let mut dir = output_root.join("bin");
    for segment in rule.base_path().split('/').filter(|s| !s.is_empty()) {
        dir.push(segment);
    }
    dir.push(format!(".{}", rule.short_name()));
    dir.push("metadata");
    dir
}
