//! Suppression rules: sessions that never get a pane.

use anyhow::{Context, Result};
use regex::RegexSet;
use serde_json::Value;

use crate::core::types::SessionInfo;

/// Compiled `exclude` glob patterns.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    set: RegexSet,
}

impl ExcludeRules {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let regexes: Vec<String> = patterns
            .into_iter()
            .map(|pattern| glob_to_regex(pattern.as_ref()))
            .collect();
        let set = RegexSet::new(&regexes).context("compile exclude patterns")?;
        Ok(Self { set })
    }

    pub fn empty() -> Self {
        Self {
            set: RegexSet::empty(),
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        self.set.is_match(title)
    }

    /// Whether the controller should skip admission for this session.
    ///
    /// An explicit `metadata.tmux == false` opts out regardless of patterns.
    pub fn should_suppress(&self, info: &SessionInfo) -> bool {
        let opted_out = info
            .metadata
            .as_ref()
            .and_then(|meta| meta.get("tmux"))
            .is_some_and(|value| *value == Value::Bool(false));
        if opted_out {
            return true;
        }
        self.matches(info.title.as_deref().unwrap_or(""))
    }
}

/// Translate a shell glob into an anchored regex.
///
/// `*` and `?` stay within one path segment, `**` crosses segments,
/// `[...]`/`[!...]` are character classes and `{a,b}` is alternation.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if matches!(chars.get(j), Some('!') | Some('^')) {
                        out.push('^');
                        j += 1;
                    }
                    for &member in &chars[j..end] {
                        if matches!(member, '\\' | '[' | ']' | '^' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(member);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    // Unbalanced braces match literally rather than failing the whole set.
    if brace_depth > 0 {
        return format!("^{}$", regex::escape(glob));
    }
    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    // A leading `]` is a member, not the terminator.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}
