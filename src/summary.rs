//! Deterministic change reporting: which paths an edit batch modified,
//! added, or deleted relative to the codebase it was applied to.

use crate::codebase::FileRecord;

pub const NO_PAYLOAD_SUMMARY: &str = "Response not in JSON format; no changes applied.";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeSets {
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

/// Classify an edit batch against the pre-apply codebase by exact content
/// comparison. Order follows the edit batch, so output is deterministic.
pub fn change_sets(input: &[FileRecord], edits: &[FileRecord]) -> ChangeSets {
    let lookup = |path: &str| -> Option<&str> {
        input
            .iter()
            .find(|f| f.path == path && !f.delete)
            .and_then(|f| f.content.as_deref())
    };

    let mut sets = ChangeSets::default();
    for edit in edits {
        if edit.delete {
            sets.deleted.push(edit.path.clone());
            continue;
        }
        let Some(new_content) = edit.content.as_deref() else {
            continue;
        };
        match lookup(&edit.path) {
            Some(old_content) if old_content != new_content => {
                sets.changed.push(edit.path.clone())
            }
            Some(_) => {}
            None => sets.added.push(edit.path.clone()),
        }
    }
    sets
}

/// One-line summary in the session response format, with a per-file line
/// diff appended for each modified file.
pub fn change_summary(input: &[FileRecord], edits: &[FileRecord]) -> String {
    let sets = change_sets(input, edits);

    let mut parts = Vec::new();
    if !sets.changed.is_empty() {
        parts.push(format!("modified files {}", sets.changed.join(", ")));
    }
    if !sets.added.is_empty() {
        parts.push(format!("new files {}", sets.added.join(", ")));
    }
    if !sets.deleted.is_empty() {
        parts.push(format!("deleted files {}", sets.deleted.join(", ")));
    }
    if parts.is_empty() {
        return "= No changes detected.".to_string();
    }

    let mut summary = format!("= {}", parts.join(", "));
    for path in &sets.changed {
        let old = content_of(input, path).unwrap_or_default();
        let new = content_of(edits, path).unwrap_or_default();
        summary.push_str(&format!("\nDiff for {path}:\n{}", line_diff(old, new)));
    }
    summary
}

/// Console rendering of the same classification, for the one-shot path.
pub fn print_change_analysis(input: &[FileRecord], edits: &[FileRecord]) {
    let sets = change_sets(input, edits);
    eprintln!("\x1b[1;32mSuggested changes:\x1b[0m");
    print_section("Changed files", &sets.changed, "No changed files.");
    print_section("New files", &sets.added, "No new files.");
    print_section("Deleted files", &sets.deleted, "No deleted files.");
}

fn print_section(label: &str, paths: &[String], empty_note: &str) {
    if paths.is_empty() {
        eprintln!("{empty_note}");
        return;
    }
    eprintln!("{label}:");
    for path in paths {
        eprintln!(" - {path}");
    }
}

fn content_of<'a>(files: &'a [FileRecord], path: &str) -> Option<&'a str> {
    files
        .iter()
        .find(|f| f.path == path && !f.delete)
        .and_then(|f| f.content.as_deref())
}

/// Naive line diff: lines of `old` absent from `new` as removals (in old
/// order), then lines of `new` absent from `old` as additions (in new
/// order). Not a minimal diff, but stable and cheap.
fn line_diff(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let mut out = Vec::new();
    for line in &old_lines {
        if !new_lines.contains(line) {
            out.push(format!("-{line}"));
        }
    }
    for line in &new_lines {
        if !old_lines.contains(line) {
            out.push(format!("+{line}"));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content)
    }

    #[test]
    fn test_change_sets_classification() {
        let input = vec![rec("same.txt", "keep"), rec("mod.txt", "old")];
        let edits = vec![
            rec("same.txt", "keep"),
            rec("mod.txt", "new"),
            rec("add.txt", "fresh"),
            FileRecord::deletion("gone.txt"),
        ];
        let sets = change_sets(&input, &edits);
        assert_eq!(sets.changed, vec!["mod.txt"]);
        assert_eq!(sets.added, vec!["add.txt"]);
        assert_eq!(sets.deleted, vec!["gone.txt"]);
    }

    #[test]
    fn test_no_changes() {
        assert_eq!(change_summary(&[], &[]), "= No changes detected.");
        let input = vec![rec("a", "1")];
        let edits = vec![rec("a", "1")];
        assert_eq!(change_summary(&input, &edits), "= No changes detected.");
    }

    #[test]
    fn test_summary_lists_all_kinds() {
        let input = vec![rec("a", "old")];
        let edits = vec![rec("a", "new"), rec("b", "2"), FileRecord::deletion("c")];
        let summary = change_summary(&input, &edits);
        assert!(summary.starts_with("= modified files a, new files b, deleted files c"));
    }

    #[test]
    fn test_summary_includes_diff_for_modified() {
        let input = vec![rec("file.txt", "old")];
        let edits = vec![rec("file.txt", "new")];
        let summary = change_summary(&input, &edits);
        assert!(summary.contains("Diff for file.txt:"));
        assert!(summary.contains("-old"));
        assert!(summary.contains("+new"));
    }

    #[test]
    fn test_line_diff_unchanged_lines_omitted() {
        let diff = line_diff("a\nb\nc", "a\nx\nc");
        assert_eq!(diff, "-b\n+x");
    }

    #[test]
    fn test_record_deleted_in_input_counts_as_added() {
        let input = vec![FileRecord::deletion("zombie.txt")];
        let edits = vec![rec("zombie.txt", "back")];
        let sets = change_sets(&input, &edits);
        assert_eq!(sets.added, vec!["zombie.txt"]);
    }

    #[test]
    fn test_contentless_edit_is_ignored() {
        let edits = vec![FileRecord {
            path: "weird.txt".into(),
            content: None,
            delete: false,
        }];
        let sets = change_sets(&[], &edits);
        assert_eq!(sets, ChangeSets::default());
    }
}
