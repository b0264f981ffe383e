//! Line-oriented YAML document editing.
//!
//! `serde_yaml` gives no access to comments, so dotted-path edits operate
//! on the raw lines instead: untouched lines are re-emitted verbatim, and
//! a `set` rewrites only the value portion of the one line it targets.
//! Structure is tracked by indentation (two spaces per level), which is
//! the shape taskbox itself writes and the only shape it edits.

use std::fmt;

const INDENT: usize = 2;

#[derive(Debug, Clone)]
pub struct Document {
    lines: Vec<String>,
}

/// A mapping entry parsed out of one line.
struct Entry<'a> {
    indent: usize,
    key: &'a str,
    /// Text after the colon, untrimmed.
    rest: &'a str,
}

fn parse_entry(line: &str) -> Option<Entry<'_>> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    let body = &line[indent..];
    if body.is_empty() || body.starts_with('#') || body.starts_with('-') {
        return None;
    }
    let colon = body.find(':')?;
    let key = body[..colon].trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    // "key:" must be followed by end-of-line or a space to be a mapping entry.
    let rest = &body[colon + 1..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some(Entry { indent, key, rest })
}

/// Split a value area into (value, trailing-comment suffix).
/// The suffix starts at the whitespace preceding an unquoted `#`.
fn split_trailing_comment(rest: &str) -> (&str, &str) {
    let mut in_single = false;
    let mut in_double = false;
    let bytes = rest.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b'#' if !in_single && !in_double => {
                // A comment needs leading whitespace (or starts the value area).
                let before = rest[..i].trim_end();
                if before.len() < rest[..i].len() || before.is_empty() {
                    return (&rest[..before.len()], &rest[before.len()..]);
                }
            }
            _ => {}
        }
    }
    (rest.trim_end(), &rest[rest.trim_end().len()..])
}

/// Render a scalar for emission. `true`/`false` keep their boolean tag;
/// everything else is written so YAML reads it back as a string.
pub fn render_scalar(value: &str) -> String {
    if value == "true" || value == "false" {
        return value.to_string();
    }
    let plain_safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./@+:".contains(c))
        && matches!(
            serde_yaml::from_str::<serde_yaml::Value>(value),
            Ok(serde_yaml::Value::String(_))
        );
    if plain_safe {
        value.to_string()
    } else {
        format!("{value:?}")
    }
}

impl Document {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(String::from).collect(),
        }
    }

    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// End of the block owned by the entry at `start` with `indent`:
    /// the first following non-blank line indented at or below `indent`.
    fn block_end(&self, start: usize, indent: usize) -> usize {
        let mut i = start + 1;
        while i < self.lines.len() {
            let line = &self.lines[i];
            if !line.trim().is_empty() {
                let line_indent = line.len() - line.trim_start_matches(' ').len();
                if line_indent <= indent {
                    return i;
                }
            }
            i += 1;
        }
        self.lines.len()
    }

    /// Find a key at exactly `indent` within `range`.
    fn find_entry(&self, range: std::ops::Range<usize>, indent: usize, key: &str) -> Option<usize> {
        for i in range {
            if let Some(entry) = parse_entry(&self.lines[i])
                && entry.indent == indent
                && entry.key == key
            {
                return Some(i);
            }
        }
        None
    }

    /// Set a dotted-path key to a scalar value, creating missing
    /// intermediate mappings. Untouched lines are preserved verbatim.
    pub fn set(&mut self, dotted: &str, value: &str) {
        let segments: Vec<&str> = dotted.split('.').collect();
        let mut range = 0..self.lines.len();
        let mut indent = 0;

        for (depth, seg) in segments.iter().copied().enumerate() {
            let last = depth == segments.len() - 1;
            match self.find_entry(range.clone(), indent, seg) {
                Some(i) => {
                    if last {
                        self.rewrite_value(i, indent, value);
                        return;
                    }
                    // Descend; a scalar being converted to a mapping loses
                    // its inline value but keeps its trailing comment.
                    let (has_scalar, comment) = {
                        let entry = parse_entry(&self.lines[i]).expect("entry re-parse");
                        let (val, comment) = split_trailing_comment(entry.rest);
                        (!val.trim().is_empty(), comment.to_string())
                    };
                    if has_scalar {
                        let prefix: String = " ".repeat(indent);
                        self.lines[i] = format!("{prefix}{seg}:{comment}");
                    }
                    let end = self.block_end(i, indent);
                    range = i + 1..end;
                    indent += INDENT;
                }
                None => {
                    let mut insert_at = range.end;
                    while insert_at > range.start && self.lines[insert_at - 1].trim().is_empty() {
                        insert_at -= 1;
                    }
                    let prefix: String = " ".repeat(indent);
                    if last {
                        self.lines
                            .insert(insert_at, format!("{prefix}{seg}: {}", render_scalar(value)));
                        return;
                    }
                    self.lines.insert(insert_at, format!("{prefix}{seg}:"));
                    range = insert_at + 1..insert_at + 1;
                    indent += INDENT;
                }
            }
        }
    }

    fn rewrite_value(&mut self, i: usize, indent: usize, value: &str) {
        let (key, comment) = {
            let entry = parse_entry(&self.lines[i]).expect("entry re-parse");
            let (_, comment) = split_trailing_comment(entry.rest);
            (entry.key.to_string(), comment.to_string())
        };
        let prefix: String = " ".repeat(indent);
        let end = self.block_end(i, indent);
        // A mapping entry becoming a scalar drops its nested block.
        self.lines.drain(i + 1..end);
        self.lines[i] = format!("{prefix}{key}: {}{comment}", render_scalar(value));
    }

    /// Delete a dotted-path key and any nested block it owns.
    /// Returns false when the path does not exist.
    pub fn delete(&mut self, dotted: &str) -> bool {
        let segments: Vec<&str> = dotted.split('.').collect();
        let mut range = 0..self.lines.len();
        let mut indent = 0;

        for (depth, seg) in segments.iter().copied().enumerate() {
            let Some(i) = self.find_entry(range.clone(), indent, seg) else {
                return false;
            };
            if depth == segments.len() - 1 {
                let end = self.block_end(i, indent);
                self.lines.drain(i..end);
                return true;
            }
            let end = self.block_end(i, indent);
            range = i + 1..end;
            indent += INDENT;
        }
        false
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# taskbox config
agent: claude  # default agent
backend: docker

env:
  FOO: bar
  # key below is load-bearing
  BAZ: qux
";

    #[test]
    fn set_existing_preserves_comments_and_order() {
        let mut doc = Document::parse(SAMPLE);
        doc.set("agent", "gemini");
        let out = doc.to_string();
        assert!(out.contains("agent: gemini  # default agent"));
        assert!(out.starts_with("# taskbox config\n"));
        assert!(out.contains("# key below is load-bearing"));
    }

    #[test]
    fn untouched_lines_are_verbatim() {
        let mut doc = Document::parse(SAMPLE);
        doc.set("model", "opus");
        let out = doc.to_string();
        for line in SAMPLE.lines() {
            assert!(out.contains(line), "missing line: {line:?}");
        }
    }

    #[test]
    fn set_nested_existing() {
        let mut doc = Document::parse(SAMPLE);
        doc.set("env.FOO", "changed");
        let out = doc.to_string();
        assert!(out.contains("  FOO: changed"));
        assert!(out.contains("  BAZ: qux"));
    }

    #[test]
    fn set_creates_intermediate_mappings() {
        let mut doc = Document::parse("agent: claude\n");
        doc.set("resources.cpus", "2");
        let out = doc.to_string();
        assert!(out.contains("resources:\n  cpus: \"2\""), "got:\n{out}");
    }

    #[test]
    fn set_appends_inside_existing_block() {
        let mut doc = Document::parse(SAMPLE);
        doc.set("env.NEW", "v");
        let out = doc.to_string();
        let env_idx = out.find("env:").unwrap();
        let new_idx = out.find("  NEW: v").unwrap();
        assert!(new_idx > env_idx);
        // Still a single env block.
        assert_eq!(out.matches("env:").count(), 1);
    }

    #[test]
    fn booleans_keep_their_tag() {
        let mut doc = Document::new();
        doc.set("debug", "true");
        assert_eq!(doc.to_string(), "debug: true\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc.to_string()).unwrap();
        assert_eq!(parsed["debug"], serde_yaml::Value::Bool(true));
    }

    #[test]
    fn numbers_are_quoted_to_stay_strings() {
        let mut doc = Document::new();
        doc.set("resources.memory", "2048");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc.to_string()).unwrap();
        assert_eq!(parsed["resources"]["memory"], serde_yaml::Value::from("2048"));
    }

    #[test]
    fn special_characters_are_quoted() {
        let mut doc = Document::new();
        doc.set("env.MSG", "hello world: yes");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc.to_string()).unwrap();
        assert_eq!(
            parsed["env"]["MSG"],
            serde_yaml::Value::from("hello world: yes")
        );
    }

    #[test]
    fn delete_scalar() {
        let mut doc = Document::parse(SAMPLE);
        assert!(doc.delete("env.FOO"));
        let out = doc.to_string();
        assert!(!out.contains("FOO"));
        assert!(out.contains("BAZ: qux"));
    }

    #[test]
    fn delete_removes_nested_block() {
        let mut doc = Document::parse(SAMPLE);
        assert!(doc.delete("env"));
        let out = doc.to_string();
        assert!(!out.contains("env:"));
        assert!(!out.contains("BAZ"));
        assert!(out.contains("backend: docker"));
    }

    #[test]
    fn delete_missing_returns_false() {
        let mut doc = Document::parse(SAMPLE);
        assert!(!doc.delete("nope.nothing"));
        assert_eq!(doc.to_string(), SAMPLE);
    }

    #[test]
    fn scalar_converted_to_mapping_keeps_comment() {
        let mut doc = Document::parse("network: none # keep me\n");
        doc.set("network.mode", "isolated");
        let out = doc.to_string();
        assert!(out.contains("network: # keep me"), "got:\n{out}");
        assert!(out.contains("  mode: isolated"));
    }

    #[test]
    fn render_scalar_rules() {
        assert_eq!(render_scalar("true"), "true");
        assert_eq!(render_scalar("claude"), "claude");
        assert_eq!(render_scalar("8080"), "\"8080\"");
        assert_eq!(render_scalar(""), "\"\"");
        assert_eq!(render_scalar("null"), "\"null\"");
        assert_eq!(render_scalar("a b"), "\"a b\"");
    }

    #[test]
    fn trailing_comment_split_ignores_quoted_hash() {
        let (val, comment) = split_trailing_comment(" \"a # b\" # real");
        assert_eq!(val.trim(), "\"a # b\"");
        assert_eq!(comment, " # real");
    }
}
