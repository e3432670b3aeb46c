//! Splitting `git diff` output into per-file patches.

use serde::Serialize;

const DEV_NULL: &str = "/dev/null";

/// One file's slice of a multi-file diff.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatch {
    /// Path before the change; `None` for added files.
    pub old_path: Option<String>,
    /// Path after the change; `None` for deleted files.
    pub new_path: Option<String>,
    /// Everything from the first hunk header on. Empty for binary or
    /// mode-only changes.
    pub patch: String,
}

impl FilePatch {
    /// The path a reviewer would show: new path, else old path.
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

fn strip_side_prefix(path: &str, prefix: &str) -> Option<String> {
    let path = path.trim_end();
    if path == DEV_NULL {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

/// Paths from `diff --git a/x b/y`. Ambiguous for paths containing " b/".
fn paths_from_git_header(rest: &str) -> (Option<String>, Option<String>) {
    match rest.find(" b/") {
        Some(idx) => (
            strip_side_prefix(&rest[..idx], "a/"),
            strip_side_prefix(&rest[idx + 1..], "b/"),
        ),
        None => (None, None),
    }
}

#[derive(Default)]
struct Builder {
    file: FilePatch,
    body: Vec<String>,
    in_hunks: bool,
}

impl Builder {
    fn finish(mut self) -> FilePatch {
        self.file.patch = self.body.join("\n");
        self.file
    }
}

/// Split a `diff --git` stream into per-file patches, in order.
///
/// `---`/`+++` headers override the paths from the `diff --git` line.
/// Text before the first `diff --git` line is ignored.
pub fn split_files(raw: &str) -> Vec<FilePatch> {
    let mut files = Vec::new();
    let mut current: Option<Builder> = None;

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                files.push(done.finish());
            }
            let (old_path, new_path) = paths_from_git_header(rest);
            current = Some(Builder {
                file: FilePatch {
                    old_path,
                    new_path,
                    patch: String::new(),
                },
                ..Builder::default()
            });
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        if !builder.in_hunks {
            if let Some(path) = line.strip_prefix("--- ") {
                builder.file.old_path = strip_side_prefix(path, "a/");
                continue;
            }
            if let Some(path) = line.strip_prefix("+++ ") {
                builder.file.new_path = strip_side_prefix(path, "b/");
                continue;
            }
            if !line.starts_with("@@") {
                continue;
            }
            builder.in_hunks = true;
        }
        builder.body.push(line.to_string());
    }

    if let Some(done) = current {
        files.push(done.finish());
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 83db48f..bf269f4 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,2 +1,2 @@
 use std::io;
-fn a() {}
+fn b() {}
diff --git a/NEW.md b/NEW.md
new file mode 100644
--- /dev/null
+++ b/NEW.md
@@ -0,0 +1 @@
+hello
diff --git a/logo.png b/logo.png
Binary files a/logo.png and b/logo.png differ
diff --git a/old.txt b/old.txt
deleted file mode 100644
--- a/old.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye";

    #[test]
    fn splits_per_file() {
        let files = split_files(MULTI);
        assert_eq!(files.len(), 4);

        assert_eq!(files[0].old_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(files[0].new_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(files[0].patch, "@@ -1,2 +1,2 @@\n use std::io;\n-fn a() {}\n+fn b() {}");

        assert_eq!(files[1].old_path, None);
        assert_eq!(files[1].display_path(), "NEW.md");
        assert_eq!(files[1].patch, "@@ -0,0 +1 @@\n+hello");

        assert_eq!(files[2].display_path(), "logo.png");
        assert!(files[2].patch.is_empty());

        assert_eq!(files[3].new_path, None);
        assert_eq!(files[3].display_path(), "old.txt");
    }

    #[test]
    fn hunk_lines_resembling_headers_stay_in_body() {
        let raw = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n--- a/not-a-header\n+++ b/also-not";
        let files = split_files(raw);
        assert_eq!(files[0].patch.lines().count(), 3);
    }

    #[test]
    fn non_git_input_yields_nothing() {
        assert!(split_files("@@ -1 +1 @@\n-a\n+b").is_empty());
    }
}
