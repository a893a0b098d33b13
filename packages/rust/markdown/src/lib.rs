//! Markdown list-entry extraction and canonical document handling.
//!
//! An entry line is a bullet with an optional group of `<img>` icons, a bold
//! linked name, an optional attribution clause, and a dash-delimited
//! description:
//!
//! ```text
//! - <img src="logo.png" alt="Acme"> **[Acme](https://acme.dev)** (by Acme) - Does things
//! ```
//!
//! [`extract`] turns such a line into an [`Entry`] whose rendered form is
//! normalized (icon `alt` text filled in) and re-derivable from its fields.

mod icon;
mod section;

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub use icon::{contains_icon, repair_icon_alt};
pub use section::{
    Document, Section, bullet_name_key, bullet_url_key, heading_rank, is_bullet,
};

// ---------------------------------------------------------------------------
// Line grammar
// ---------------------------------------------------------------------------

static ICON_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-\s+(?P<icons><img[^>]*>(?:\s*<img[^>]*>)*)\s+\*\*\[(?P<name>[^\]]+)\]\((?P<url>[^)]+)\)\*\*(?:\s*-\s*|\s+(?P<attribution>.+?)\s+-\s+)(?P<description>.+)$",
    )
    .expect("valid regex")
});

static PLAIN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-\s+\*\*\[(?P<name>[^\]]+)\]\((?P<url>[^)]+)\)\*\*(?:\s*-\s*|\s+(?P<attribution>.+?)\s+-\s+)(?P<description>.+)$",
    )
    .expect("valid regex")
});

/// The shapes an entry line can take, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineShape {
    Icon,
    Plain,
}

impl LineShape {
    const ORDER: [LineShape; 2] = [LineShape::Icon, LineShape::Plain];

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Icon => &ICON_LINE_RE,
            Self::Plain => &PLAIN_LINE_RE,
        }
    }

    fn parse(self, line: &str) -> Option<Entry> {
        self.pattern().captures(line).and_then(Entry::from_captures)
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One list entry extracted from a Markdown line.
///
/// Immutable once built; the rendered line always matches the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    url: String,
    icons: Option<String>,
    attribution: Option<String>,
    description: String,
    rendered: String,
}

impl Entry {
    fn from_captures(caps: Captures<'_>) -> Option<Self> {
        let name = caps.name("name")?.as_str().trim();
        let url = caps.name("url")?.as_str().trim();
        let description = caps.name("description")?.as_str().trim();
        if name.is_empty() || url.is_empty() || description.is_empty() {
            return None;
        }

        let icons = caps
            .name("icons")
            .map(|m| repair_icon_alt(m.as_str().trim(), name));
        let attribution = caps
            .name("attribution")
            .map(|m| m.as_str().trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Some(Self::new(name, url, icons, attribution, description))
    }

    fn new(
        name: &str,
        url: &str,
        icons: Option<String>,
        attribution: Option<String>,
        description: &str,
    ) -> Self {
        let mut entry = Self {
            name: name.to_string(),
            url: url.to_string(),
            icons,
            attribution,
            description: description.to_string(),
            rendered: String::new(),
        };
        entry.rendered = entry.render();
        entry
    }

    fn render(&self) -> String {
        let mut line = String::from("- ");
        if let Some(icons) = &self.icons {
            line.push_str(icons);
            line.push(' ');
        }
        line.push_str(&format!("**[{}]({})**", self.name, self.url));
        if let Some(attribution) = &self.attribution {
            line.push(' ');
            line.push_str(attribution);
        }
        line.push_str(" - ");
        line.push_str(&self.description);
        line
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }

    /// The (repaired) icon group, if the line had one.
    pub fn icons(&self) -> Option<&str> {
        self.icons.as_deref()
    }

    /// The normalized Markdown line.
    pub fn rendered_line(&self) -> &str {
        &self.rendered
    }

    pub fn has_icon(&self) -> bool {
        self.icons.is_some()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Extract an entry from one Markdown line.
///
/// Returns `None` when the line does not have an entry shape; that is not an
/// error, most diff lines are not entries.
pub fn extract(line: &str) -> Option<Entry> {
    let trimmed = line.trim();
    LineShape::ORDER
        .iter()
        .find_map(|shape| shape.parse(trimmed))
}
