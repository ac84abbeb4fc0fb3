//! Content extraction (spec 4.7.3): builds the `(content, context)` pair fed
//! to a node's prompt, with a per-file cache so many symbols in one file
//! don't each re-read it from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "zip", "tar", "gz", "7z", "rar", "exe",
    "dll", "so", "dylib", "o", "class", "jar", "pdf", "woff", "woff2", "ttf", "eot", "mp3", "mp4",
    "wav", "avi", "mov", "bin",
];

pub fn is_binary_extension(extension: &str) -> bool {
    BINARY_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Per-worker file content cache keyed by absolute path (spec: "not shared
/// across workers" — each [`ContentCache`] belongs to one summarizer run).
#[derive(Default)]
pub struct ContentCache {
    entries: Mutex<HashMap<PathBuf, Arc<str>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, path: &Path) -> std::io::Result<Arc<str>> {
        if let Some(cached) = self.entries.lock().unwrap().get(path) {
            return Ok(cached.clone());
        }
        let text: Arc<str> = std::fs::read_to_string(path)?.into();
        self.entries.lock().unwrap().insert(path.to_path_buf(), text.clone());
        Ok(text)
    }
}

/// What a prompt needs: the extracted body (source/README/binary notice) and
/// a flat list of bullet-point context descriptors.
pub struct NodeContent {
    pub content: String,
    pub context: Vec<String>,
}

pub fn extract_repository(repo_root: &Path, directory_names: &[String], directory_count: usize, file_count: usize, cache: &ContentCache) -> NodeContent {
    let readme = ["README.md", "README.rst", "README", "readme.md"]
        .iter()
        .find_map(|name| cache.read(&repo_root.join(name)).ok());
    NodeContent {
        content: readme.map(|r| r.to_string()).unwrap_or_else(|| "(no README found)".to_string()),
        context: vec![
            format!("{directory_count} directories"),
            format!("{file_count} files"),
            format!("top-level directories: {}", directory_names.join(", ")),
        ],
    }
}

pub fn extract_directory(children: &[String], child_summaries: &[(String, String)]) -> NodeContent {
    let content = child_summaries
        .iter()
        .map(|(kind, text)| format!("[{kind}] {text}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    NodeContent {
        content,
        context: vec![format!("direct children: {}", children.join(", "))],
    }
}

const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Reads the file at `repo_root/path`. Binary files (by extension) are
/// never opened; their content is a fixed notice. Text files are truncated
/// to `4 * max_tokens_per_file` characters, a rough token-to-character
/// stand-in consistent with the original tracker's budget.
pub fn extract_file(repo_root: &Path, relative_path: &str, extension: Option<&str>, max_tokens_per_file: usize, cache: &ContentCache) -> NodeContent {
    if let Some(ext) = extension {
        if is_binary_extension(ext) {
            return NodeContent {
                content: format!("Binary file: {relative_path}"),
                context: vec![format!("extension: {ext}")],
            };
        }
    }
    let absolute = repo_root.join(relative_path);
    let content = match cache.read(&absolute) {
        Ok(text) => truncate_with_marker(&text, max_tokens_per_file * 4),
        Err(_) => "(file unreadable)".to_string(),
    };
    NodeContent {
        content,
        context: vec![format!("path: {relative_path}")],
    }
}

fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut cut = max_chars.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], TRUNCATION_MARKER)
}

pub fn extract_class(file_content: &str, class_name: &str, parents: &[String], methods: &[String]) -> NodeContent {
    let slice = extract_source_slice(file_content, class_name).unwrap_or_else(|| file_content.to_string());
    let mut context = vec![format!("methods: {}", methods.join(", "))];
    if !parents.is_empty() {
        context.push(format!("inherits from: {}", parents.join(", ")));
    }
    NodeContent { content: slice, context }
}

pub fn extract_function(file_content: &str, name: &str, is_method: bool, parent_kind: &str) -> NodeContent {
    let slice = extract_source_slice(file_content, name).unwrap_or_else(|| file_content.to_string());
    let kind = if is_method { "method" } else { "function" };
    NodeContent {
        content: slice,
        context: vec![format!("kind: {kind}"), format!("declared in: {parent_kind}")],
    }
}

/// Best-effort source slice starting at the line declaring `name` (looking
/// for `def`, `function`, `fn`, or `class` followed by the name) and ending
/// at the first dedent back to the declaration's own indentation, or at a
/// matching closing brace if the declaration opened with `{`.
fn extract_source_slice(file_content: &str, name: &str) -> Option<String> {
    let lines: Vec<&str> = file_content.lines().collect();
    let start_idx = lines.iter().position(|line| {
        let trimmed = line.trim_start();
        ["def ", "function ", "fn ", "class "]
            .iter()
            .any(|kw| trimmed.starts_with(kw) && trimmed.contains(name))
    })?;
    let start_line = lines[start_idx];
    let indent = start_line.len() - start_line.trim_start().len();

    if start_line.contains('{') {
        let mut depth = 0i32;
        let mut end_idx = start_idx;
        for (i, line) in lines.iter().enumerate().skip(start_idx) {
            depth += line.matches('{').count() as i32 - line.matches('}').count() as i32;
            end_idx = i;
            if depth <= 0 && i > start_idx {
                break;
            }
        }
        return Some(lines[start_idx..=end_idx].join("\n"));
    }

    let mut end_idx = lines.len() - 1;
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        let this_indent = line.len() - line.trim_start().len();
        if this_indent <= indent {
            end_idx = i - 1;
            break;
        }
    }
    Some(lines[start_idx..=end_idx].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_extensions_are_recognized_case_insensitively() {
        assert!(is_binary_extension("PNG"));
        assert!(!is_binary_extension("py"));
    }

    #[test]
    fn python_function_slice_stops_at_dedent() {
        let source = "def greet():\n    print('hi')\n\ndef other():\n    pass\n";
        let slice = extract_source_slice(source, "greet").unwrap();
        assert!(slice.contains("print"));
        assert!(!slice.contains("other"));
    }

    #[test]
    fn brace_style_function_slice_stops_at_matching_brace() {
        let source = "fn greet() {\n    println!(\"hi\");\n}\n\nfn other() {}\n";
        let slice = extract_source_slice(source, "greet").unwrap();
        assert!(slice.contains("println"));
        assert!(!slice.contains("other"));
    }

    #[test]
    fn truncation_adds_marker_only_when_exceeding_budget() {
        let short = "hello";
        assert_eq!(truncate_with_marker(short, 100), "hello");
        let long = "a".repeat(50);
        let truncated = truncate_with_marker(&long, 10);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert!(truncated.len() < long.len());
    }

    #[test]
    fn content_cache_avoids_rereading_the_same_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let cache = ContentCache::new();
        let first = cache.read(&file).unwrap();
        std::fs::write(&file, "changed").unwrap();
        let second = cache.read(&file).unwrap();
        assert_eq!(first.as_ref(), second.as_ref());
    }
}
