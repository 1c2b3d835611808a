//! Line-preserving `.env` document.
//!
//! Only the entries that are explicitly set or removed change on render; comments,
//! blank lines, unrelated entries, line endings and the trailing newline are written
//! back exactly as they were read.

#[derive(Clone, Debug, PartialEq, Eq)]
enum Line {
    Entry { raw: String, key: String, value: String },
    Other(String),
}

impl Line {
    fn has_key(&self, wanted: &str) -> bool {
        matches!(self, Self::Entry { key, .. } if key == wanted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl Default for EnvFile {
    fn default() -> Self {
        Self { lines: Vec::new(), trailing_newline: true }
    }
}

impl EnvFile {
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let (body, trailing_newline) = match text.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (text, false),
        };

        let lines = body.split('\n').map(parse_line).collect();
        Self { lines, trailing_newline }
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }

        let mut out = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Entry { raw, .. } | Line::Other(raw) => raw.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    /// Value of the last entry for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: entry_key, value, .. } if entry_key == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replaces the first entry for `key` and drops any later duplicates; appends if absent.
    pub fn set(&mut self, key: &str, value: &str) {
        let raw = format!("{key}={value}");
        let mut replaced = false;

        self.lines.retain_mut(|line| {
            if !line.has_key(key) {
                return true;
            }
            if replaced {
                return false;
            }
            *line = Line::Entry { raw: raw.clone(), key: key.to_string(), value: value.to_string() };
            replaced = true;
            true
        });

        if !replaced {
            self.lines.push(Line::Entry { raw, key: key.to_string(), value: value.to_string() });
            self.trailing_newline = true;
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.lines.retain(|line| !line.has_key(key));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Other(_) => None,
        })
    }
}

fn parse_line(raw: &str) -> Line {
    let content = raw.trim_end_matches('\r').trim_start();
    if content.is_empty() || content.starts_with('#') {
        return Line::Other(raw.to_string());
    }

    let content = content.strip_prefix("export ").unwrap_or(content);
    let Some((key, value)) = content.split_once('=') else {
        return Line::Other(raw.to_string());
    };

    let key = key.trim();
    if !is_valid_key(key) {
        return Line::Other(raw.to_string());
    }

    Line::Entry { raw: raw.to_string(), key: key.to_string(), value: unquote(value.trim()) }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::EnvFile;

    #[test]
    fn untouched_documents_render_byte_for_byte() {
        for text in ["", "\n", "A=1", "A=1\n", "# note\r\nA=1\r\n\r\nB='x y'\n", "garbage line\n"] {
            assert_eq!(EnvFile::parse(text).render(), text, "render changed `{text:?}`");
        }
    }

    #[test]
    fn set_replaces_first_entry_and_drops_duplicates() {
        let mut env = EnvFile::parse("KEY=old\n# keep\nKEY=dup\nOTHER=1\n");
        env.set("KEY", "new");
        assert_eq!(env.render(), "KEY=new\n# keep\nOTHER=1\n");
        assert_eq!(env.get("KEY"), Some("new"));
    }

    #[test]
    fn set_appends_when_missing() {
        let mut env = EnvFile::parse("");
        env.set("KEY", "v");
        assert_eq!(env.render(), "KEY=v\n");

        let mut env = EnvFile::parse("A=1");
        env.set("KEY", "v");
        assert_eq!(env.render(), "A=1\nKEY=v\n");
    }

    #[test]
    fn get_reads_last_entry_and_strips_quotes() {
        let env = EnvFile::parse("export KEY=\"first\"\nKEY='second'\n");
        assert_eq!(env.get("KEY"), Some("second"));
        assert_eq!(env.entries().count(), 2);
    }

    #[test]
    fn remove_is_a_no_op_when_key_is_absent() {
        let mut env = EnvFile::parse("A=1\n");
        env.remove("MISSING");
        assert_eq!(env.render(), "A=1\n");
    }
}
