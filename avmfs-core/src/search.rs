//! Directory search cursors and wildcard matching.

use std::vec::IntoIter;

use regex::{Regex, RegexBuilder};

use crate::error::{AvmError, AvmResult};
use crate::info::FileInfo;
use crate::store::NodeDescriptor;

/// Check if a path contains search wildcards.
pub fn contains_wildcards(path: &str) -> bool {
    path.contains(['*', '?'])
}

/// Case-insensitive `*` / `?` name matcher.
#[derive(Debug, Clone)]
pub struct WildCard {
    pattern: String,
    regex: Option<Regex>,
}

impl WildCard {
    pub fn new(pattern: &str) -> AvmResult<Self> {
        // `*.*` matches names without a dot as well
        if pattern == "*" || pattern == "*.*" {
            return Ok(Self {
                pattern: pattern.to_string(),
                regex: None,
            });
        }

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map_err(|e| AvmError::Io(format!("Invalid search pattern, {}: {}", pattern, e)))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Some(regex),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(name),
            None => true,
        }
    }
}

enum Source {
    Single(Option<FileInfo>),
    Listing {
        entries: IntoIter<NodeDescriptor>,
        filter: WildCard,
        read_only: bool,
    },
}

/// Finite, forward-only search results.
pub struct SearchContext {
    source: Source,
}

impl SearchContext {
    /// A cursor over exactly one entry.
    pub fn single(info: FileInfo) -> Self {
        Self {
            source: Source::Single(Some(info)),
        }
    }

    /// A cursor over the listing entries whose names match `filter`.
    pub fn listing(entries: Vec<NodeDescriptor>, filter: WildCard, read_only: bool) -> Self {
        Self {
            source: Source::Listing {
                entries: entries.into_iter(),
                filter,
                read_only,
            },
        }
    }
}

impl Iterator for SearchContext {
    type Item = FileInfo;

    fn next(&mut self) -> Option<FileInfo> {
        match &mut self.source {
            Source::Single(info) => info.take(),
            Source::Listing {
                entries,
                filter,
                read_only,
            } => entries
                .find(|node| filter.matches(&node.name))
                .map(|node| FileInfo::from_node(&node, *read_only)),
        }
    }
}
