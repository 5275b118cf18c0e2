//! Source windows, snippet location and unified diffs for proposed patches.
//!
//! Nothing here writes to the project: patches are applied in memory only to
//! render the diff a reviewer would see.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use super::types::FixPatch;

/// Lines of source shown on each side of an issue line.
pub const SOURCE_CONTEXT_LINES: usize = 10;

/// Lines shown when the issue has no line number.
pub const UNKNOWN_LINE_PREVIEW: usize = 30;

/// Placeholder used in prompts when a file cannot be read.
pub const UNREADABLE_FILE: &str = "(file is not readable)";

/// Context lines around a changed region in a unified diff.
const DIFF_CONTEXT_LINES: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Path is outside the project root: {0}")]
    OutsideProject(String),

    #[error("Original code snippet not found in {0}. Make sure the snippet matches exactly (including whitespace).")]
    SnippetNotFound(String),
}

/// `file_path` joined onto `project_root`, or `None` when the path is absolute
/// or uses `..` to leave the root.
pub fn resolve_in_project(project_root: &Path, file_path: &str) -> Option<PathBuf> {
    let relative = Path::new(file_path);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| project_root.join(relative))
}

/// Numbered excerpt of `content` around 1-based `line`.
///
/// Shows `context` lines either side of `line`, or the first
/// [`UNKNOWN_LINE_PREVIEW`] lines when `line` is `None`.
pub fn source_window(content: &str, line: Option<u32>, context: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();

    let (start, end) = match line {
        None => (0, lines.len().min(UNKNOWN_LINE_PREVIEW)),
        Some(line) => {
            let line = line as usize;
            (
                line.saturating_sub(context + 1),
                lines.len().min(line + context),
            )
        }
    };

    if start >= end {
        return String::new();
    }

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{:>4} | {}", start + i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte offset of the first occurrence of `original` in `content`.
///
/// An empty snippet never matches.
pub fn locate_snippet(content: &str, original: &str) -> Option<usize> {
    if original.is_empty() {
        return None;
    }
    content.find(original)
}

/// Single-hunk unified diff between `before` and `after`.
///
/// The hunk spans the region between the common prefix and the common suffix
/// of the two line sequences, with up to three lines of context.
pub fn unified_diff(file_path: &str, before: &str, after: &str) -> String {
    let old: Vec<&str> = before.split('\n').collect();
    let new: Vec<&str> = after.split('\n').collect();

    let mut start = 0;
    while start < old.len() && start < new.len() && old[start] == new[start] {
        start += 1;
    }

    let mut end_old = old.len();
    let mut end_new = new.len();
    while end_old > start && end_new > start && old[end_old - 1] == new[end_new - 1] {
        end_old -= 1;
        end_new -= 1;
    }

    let context_start = start.saturating_sub(DIFF_CONTEXT_LINES);
    let context_end_old = old.len().min(end_old + DIFF_CONTEXT_LINES);
    let context_end_new = new.len().min(end_new + DIFF_CONTEXT_LINES);

    let mut out = vec![
        format!("--- a/{}", file_path),
        format!("+++ b/{}", file_path),
        format!(
            "@@ -{},{} +{},{} @@",
            context_start + 1,
            context_end_old - context_start,
            context_start + 1,
            context_end_new - context_start
        ),
    ];

    out.extend(old[context_start..start].iter().map(|l| format!(" {}", l)));
    out.extend(old[start..end_old].iter().map(|l| format!("-{}", l)));
    out.extend(new[start..end_new].iter().map(|l| format!("+{}", l)));
    out.extend(old[end_old..context_end_old].iter().map(|l| format!(" {}", l)));

    out.join("\n")
}

/// Apply `patch` to its file in memory and return the resulting diff.
///
/// Only the first occurrence of `patch.original` is replaced.
pub async fn render_patch_diff(project_root: &Path, patch: &FixPatch) -> Result<String, PatchError> {
    let path = resolve_in_project(project_root, &patch.file_path)
        .ok_or_else(|| PatchError::OutsideProject(patch.file_path.clone()))?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|_| PatchError::FileNotFound(patch.file_path.clone()))?;

    let offset = locate_snippet(&content, &patch.original)
        .ok_or_else(|| PatchError::SnippetNotFound(patch.file_path.clone()))?;

    let mut updated = String::with_capacity(content.len() + patch.replacement.len());
    updated.push_str(&content[..offset]);
    updated.push_str(&patch.replacement);
    updated.push_str(&content[offset + patch.original.len()..]);

    Ok(unified_diff(&patch.file_path, &content, &updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_source_window_around_line() {
        let content = numbered(40);
        let window = source_window(&content, Some(20), 2);
        assert_eq!(
            window,
            "  18 | line 18\n  19 | line 19\n  20 | line 20\n  21 | line 21\n  22 | line 22"
        );
    }

    #[test]
    fn test_source_window_clamps_at_file_edges() {
        let content = numbered(5);
        let window = source_window(&content, Some(1), 10);
        assert_eq!(window.lines().count(), 5);
        assert!(window.starts_with("   1 | line 1"));
    }

    #[test]
    fn test_source_window_unknown_line_shows_preview() {
        let content = numbered(100);
        let window = source_window(&content, None, SOURCE_CONTEXT_LINES);
        assert_eq!(window.lines().count(), UNKNOWN_LINE_PREVIEW);
        assert!(window.ends_with("  30 | line 30"));
    }

    #[test]
    fn test_source_window_line_past_end_is_empty() {
        assert_eq!(source_window("a\nb", Some(50), 2), "");
    }

    #[test]
    fn test_locate_snippet() {
        assert_eq!(locate_snippet("let x = 1;\nlet y = 2;", "let y"), Some(11));
        assert_eq!(locate_snippet("abc", "zzz"), None);
        assert_eq!(locate_snippet("abc", ""), None);
    }

    #[test]
    fn test_unified_diff_single_line_change() {
        let before = "a\nb\nc\nd\ne\nf\ng";
        let after = "a\nb\nc\nD\ne\nf\ng";
        let diff = unified_diff("src/x.ts", before, after);
        assert_eq!(
            diff,
            "--- a/src/x.ts\n+++ b/src/x.ts\n@@ -1,7 +1,7 @@\n a\n b\n c\n-d\n+D\n e\n f\n g"
        );
    }

    #[test]
    fn test_unified_diff_limits_context() {
        let before = numbered(20);
        let after = before.replace("line 10\n", "line ten\n");
        let diff = unified_diff("f.ts", &before, &after);
        assert!(diff.contains("@@ -7,7 +7,7 @@"));
        assert!(diff.contains("-line 10\n+line ten"));
        assert!(!diff.contains(" line 6\n"));
    }

    #[test]
    fn test_unified_diff_insertion() {
        let diff = unified_diff("f.ts", "a\nc", "a\nb\nc");
        assert_eq!(diff, "--- a/f.ts\n+++ b/f.ts\n@@ -1,2 +1,3 @@\n a\n+b\n c");
    }

    fn patch(file_path: &str, original: &str, replacement: &str) -> FixPatch {
        FixPatch {
            issue_key: "k1".to_string(),
            file_path: file_path.to_string(),
            original: original.to_string(),
            replacement: replacement.to_string(),
            description: "d".to_string(),
            fixable: true,
        }
    }

    #[tokio::test]
    async fn test_render_patch_diff() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/a.ts"), "const a = 1;\nvar b = 2;\n").expect("write");

        let diff = render_patch_diff(dir.path(), &patch("src/a.ts", "var b", "const b"))
            .await
            .expect("diff renders");

        assert!(diff.contains("-var b = 2;"));
        assert!(diff.contains("+const b = 2;"));
        let on_disk = std::fs::read_to_string(dir.path().join("src/a.ts")).expect("read");
        assert!(on_disk.contains("var b"));
    }

    #[tokio::test]
    async fn test_render_patch_diff_errors() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("a.ts"), "x\n").expect("write");

        assert_eq!(
            render_patch_diff(dir.path(), &patch("missing.ts", "x", "y")).await,
            Err(PatchError::FileNotFound("missing.ts".to_string()))
        );
        assert_eq!(
            render_patch_diff(dir.path(), &patch("a.ts", "nope", "y")).await,
            Err(PatchError::SnippetNotFound("a.ts".to_string()))
        );
        assert_eq!(
            render_patch_diff(&dir.path().join("nested"), &patch("../a.ts", "x", "y")).await,
            Err(PatchError::OutsideProject("../a.ts".to_string()))
        );
    }

    #[test]
    fn test_resolve_in_project_rejects_escaping_paths() {
        let root = Path::new("/srv/shop");
        assert_eq!(
            resolve_in_project(root, "src/a.ts"),
            Some(PathBuf::from("/srv/shop/src/a.ts"))
        );
        assert_eq!(
            resolve_in_project(root, "./src/a.ts"),
            Some(PathBuf::from("/srv/shop/./src/a.ts"))
        );
        assert_eq!(resolve_in_project(root, "/etc/passwd"), None);
        assert_eq!(resolve_in_project(root, "../other/a.ts"), None);
        assert_eq!(resolve_in_project(root, "src/../../a.ts"), None);
    }
}
