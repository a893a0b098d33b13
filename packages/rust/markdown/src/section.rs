//! Line-oriented view of the canonical document and its list sections.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use curator_shared::{CuratorError, Result};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(\S.*)$").expect("valid regex"));

/// Loose bullet shape used for keys: tolerates lines the extractor rejects.
static BULLET_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-\s+(?:<img[^>]*>\s*)*\*\*\[([^\]]+)\]\(([^)]+)\)").expect("valid regex")
});

/// Heading rank (`#` count) of a Markdown heading line.
pub fn heading_rank(line: &str) -> Option<usize> {
    split_heading(line).map(|(rank, _)| rank)
}

/// Rank and trimmed text of a Markdown heading line.
fn split_heading(line: &str) -> Option<(usize, &str)> {
    let caps = HEADING_RE.captures(line.trim())?;
    let text = caps.get(2)?.as_str().trim_end();
    Some((caps[1].len(), text))
}

/// Whether `line` is a list bullet.
pub fn is_bullet(line: &str) -> bool {
    line.trim_start().starts_with("- ")
}

/// Case-insensitive sort key of a bullet line: its linked name, or the
/// whole trimmed line when it has no recognizable link.
pub fn bullet_name_key(line: &str) -> String {
    match BULLET_KEY_RE.captures(line) {
        Some(caps) => caps[1].to_lowercase(),
        None => line.trim().to_lowercase(),
    }
}

/// Case-insensitive dedup key of a bullet line: its link target, or the
/// whole trimmed line when it has no recognizable link.
pub fn bullet_url_key(line: &str) -> String {
    match BULLET_KEY_RE.captures(line) {
        Some(caps) => caps[2].trim().to_lowercase(),
        None => line.trim().to_lowercase(),
    }
}

/// Bounds of one section, as line indices into its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Index of the heading line.
    pub header: usize,
    /// One past the last line of the section.
    pub end: usize,
    /// Heading rank of the section header.
    pub rank: usize,
}

/// A Markdown document split into lines, each remembering its own terminator.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    lines: Vec<&'a str>,
    /// `"\r\n"`, `"\n"`, or `""` for a final line without one.
    endings: Vec<&'a str>,
}

impl<'a> Document<'a> {
    pub fn parse(text: &'a str) -> Self {
        let (lines, endings) = text
            .split_inclusive('\n')
            .map(|piece| {
                if let Some(line) = piece.strip_suffix("\r\n") {
                    (line, "\r\n")
                } else if let Some(line) = piece.strip_suffix('\n') {
                    (line, "\n")
                } else {
                    (piece, "")
                }
            })
            .unzip();
        Self { lines, endings }
    }

    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// Locate the section headed by `header`.
    ///
    /// `header` is heading text, optionally prefixed with its `#` run; with
    /// the prefix the rank must match too. Exactly one heading line must
    /// match. The section runs until the next heading of equal or higher
    /// rank, or the end of the document.
    pub fn section(&self, header: &str) -> Result<Section> {
        let wanted = header.trim();
        let (wanted_rank, wanted_text) = match split_heading(wanted) {
            Some((rank, text)) => (Some(rank), text),
            None => (None, wanted),
        };
        if wanted_text.is_empty() {
            return Err(CuratorError::section("section header must not be empty"));
        }

        let matches: Vec<(usize, usize)> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| split_heading(line).map(|(rank, text)| (i, rank, text)))
            .filter(|(_, rank, text)| {
                *text == wanted_text && wanted_rank.is_none_or(|r| r == *rank)
            })
            .map(|(i, rank, _)| (i, rank))
            .collect();

        let (header_idx, rank) = match matches.as_slice() {
            [] => {
                return Err(CuratorError::section(format!(
                    "header '{wanted}' not found in document"
                )));
            }
            [single] => *single,
            many => {
                let at: Vec<String> = many.iter().map(|(i, _)| (i + 1).to_string()).collect();
                return Err(CuratorError::section(format!(
                    "header '{wanted}' is ambiguous: matches lines {}",
                    at.join(", ")
                )));
            }
        };

        let end = self.lines[header_idx + 1..]
            .iter()
            .position(|line| heading_rank(line).is_some_and(|r| r <= rank))
            .map_or(self.lines.len(), |offset| header_idx + 1 + offset);

        debug!(header = wanted, start = header_idx + 1, end, "located section");
        Ok(Section {
            header: header_idx,
            end,
            rank,
        })
    }

    /// Bullet lines inside `section`, in document order.
    pub fn bullets(&self, section: &Section) -> Vec<&'a str> {
        self.lines[section.header + 1..section.end]
            .iter()
            .copied()
            .filter(|line| is_bullet(line))
            .collect()
    }

    /// Rebuild the document with the bullets of `section` replaced by `entries`.
    ///
    /// Everything before the first bullet (the preamble) and after the last
    /// bullet is kept byte for byte, line endings included. Non-bullet lines
    /// between bullets are dropped. A section without bullets gets the
    /// entries after its last non-blank line. New lines take the line ending
    /// of the bullet block, or of the line they follow.
    pub fn splice_bullets(&self, section: &Section, entries: &[String]) -> String {
        let body = section.header + 1..section.end;
        let first = body.clone().find(|&i| is_bullet(self.lines[i]));
        let last = body.clone().rev().find(|&i| is_bullet(self.lines[i]));

        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.lines.len() + entries.len() + 1);
        match (first, last) {
            (Some(first), Some(last)) => {
                let interleaved = (first..=last)
                    .filter(|&i| !is_bullet(self.lines[i]))
                    .count();
                if interleaved > 0 {
                    debug!(interleaved, "dropping non-bullet lines between entries");
                }
                let ending = self.ending_near(first);
                out.extend(self.original(0..first));
                out.extend(entries.iter().map(|e| (e.as_str(), ending)));
                out.extend(self.original(last + 1..self.lines.len()));
            }
            _ => {
                let insert_at = body
                    .clone()
                    .rev()
                    .find(|&i| !self.lines[i].trim().is_empty())
                    .map_or(section.header + 1, |i| i + 1);
                let ending = self.ending_near(insert_at - 1);
                out.extend(self.original(0..insert_at));
                if !entries.is_empty() {
                    out.push(("", ending));
                }
                out.extend(entries.iter().map(|e| (e.as_str(), ending)));
                out.extend(self.original(insert_at..self.lines.len()));
            }
        }

        let fallback = self.ending_near(0);
        let trailing = self.endings.last().copied().unwrap_or("\n");
        let mut text = String::new();
        for (i, (line, ending)) in out.iter().enumerate() {
            text.push_str(line);
            if i + 1 == out.len() {
                text.push_str(trailing);
            } else if ending.is_empty() {
                text.push_str(fallback);
            } else {
                text.push_str(ending);
            }
        }
        text
    }

    fn original(&self, range: Range<usize>) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        range.map(move |i| (self.lines[i], self.endings[i]))
    }

    /// Line ending of line `index`, or the first one in the document when
    /// that line has none.
    fn ending_near(&self, index: usize) -> &'a str {
        self.endings
            .get(index)
            .copied()
            .filter(|e| !e.is_empty())
            .or_else(|| self.endings.iter().copied().find(|e| !e.is_empty()))
            .unwrap_or("\n")
    }
}
