//! Error-excerpt extraction for uploaded log files.
//!
//! Build logs are mostly noise. Before resolution, an upload is reduced to
//! the lines that look like failures so that boilerplate does not dominate
//! the similarity score.

/// Maximum lines kept in an excerpt.
pub const MAX_EXCERPT_LINES: usize = 50;

/// Length of the preview echoed back to upload clients, in characters.
pub const PREVIEW_CHARS: usize = 500;

/// File extensions accepted by the upload endpoint.
pub const ALLOWED_EXTENSIONS: &[&str] = &["log", "txt"];

const ERROR_MARKERS: &[&str] = &[
    "error",
    "err!",
    "fatal",
    "exception",
    "failed",
    "failure",
    "panic",
    "traceback",
    "denied",
    "timeout",
];

fn is_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Lines of `text` that carry an error marker, at most
/// [`MAX_EXCERPT_LINES`]. Without any marker, the last
/// [`MAX_EXCERPT_LINES`] non-empty lines are returned instead.
pub fn extract_error_excerpt(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();

    let marked: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| is_error_line(l))
        .take(MAX_EXCERPT_LINES)
        .collect();

    if !marked.is_empty() {
        return marked.join("\n");
    }

    let start = lines.len().saturating_sub(MAX_EXCERPT_LINES);
    lines[start..].join("\n")
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Whether `filename` has one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
pub fn has_allowed_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| e.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_marked_lines() {
        let log = "Step 1/5 : FROM node:18\n\
                   ---> abc123\n\
                   npm ERR! code ENOENT\n\
                   Removing intermediate container\n\
                   Error: Process completed with exit code 1.\n";
        assert_eq!(
            extract_error_excerpt(log),
            "npm ERR! code ENOENT\nError: Process completed with exit code 1."
        );
    }

    #[test]
    fn test_caps_marked_lines() {
        let log: String = (0..80).map(|i| format!("error {}\n", i)).collect();
        let excerpt = extract_error_excerpt(&log);
        assert_eq!(excerpt.lines().count(), MAX_EXCERPT_LINES);
        assert!(excerpt.starts_with("error 0"));
    }

    #[test]
    fn test_falls_back_to_tail() {
        let log: String = (0..60).map(|i| format!("line {}\n\n", i)).collect();
        let excerpt = extract_error_excerpt(&log);
        assert_eq!(excerpt.lines().count(), MAX_EXCERPT_LINES);
        assert!(excerpt.starts_with("line 10"));
        assert!(excerpt.ends_with("line 59"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_error_excerpt(""), "");
        assert_eq!(extract_error_excerpt("\n  \n"), "");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("short", 500), "short");
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("build.log"));
        assert!(has_allowed_extension("OUTPUT.TXT"));
        assert!(!has_allowed_extension("image.png"));
        assert!(!has_allowed_extension("log"));
        assert!(!has_allowed_extension("archive.log.gz"));
    }
}
