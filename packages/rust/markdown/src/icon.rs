//! Icon marker (`<img>` tag) accessibility repair.
//!
//! List entries may lead with one or more `<img>` icons. Any icon without a
//! usable `alt` attribute gets the entry name as its alt text, and its
//! attributes are re-emitted in a fixed order. Icons that already carry a
//! non-blank `alt` are left untouched, which makes the repair idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Attributes emitted first, in this order, when a tag is rebuilt.
const PREFERRED_ORDER: [&str; 6] = ["src", "alt", "width", "height", "class", "style"];

static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img[^>]*>").expect("img tag regex"));

/// One attribute: `key="v"`, `key='v'`, unquoted `key=v`, or a bare `key`.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w:.-]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute regex")
});

type Attribute = (String, Option<String>);

/// Fill in missing or blank `alt` text on every `<img>` tag in `fragment`.
///
/// Tags are rewritten independently; text between tags is copied verbatim.
pub fn repair_icon_alt(fragment: &str, name: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + name.len());
    let mut cursor = 0;

    for tag in IMG_TAG_RE.find_iter(fragment) {
        out.push_str(&fragment[cursor..tag.start()]);
        out.push_str(&repair_tag(tag.as_str(), name));
        cursor = tag.end();
    }
    out.push_str(&fragment[cursor..]);

    out
}

/// Whether `text` contains an icon marker.
pub fn contains_icon(text: &str) -> bool {
    text.contains("<img")
}

/// Repair a single tag, or return it unchanged when its alt text is usable.
fn repair_tag(tag: &str, name: &str) -> String {
    let inner = tag
        .strip_prefix("<img")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or_default()
        .trim_end();
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let mut attrs = parse_attributes(inner);

    let has_alt = attrs.iter().any(|(key, value)| {
        key == "alt" && value.as_deref().is_some_and(|v| !v.trim().is_empty())
    });
    if has_alt {
        return tag.to_string();
    }

    match attrs.iter_mut().find(|(key, _)| key == "alt") {
        Some((_, value)) => *value = Some(name.to_string()),
        None => attrs.push(("alt".to_string(), Some(name.to_string()))),
    }

    tracing::debug!(name, "filled missing icon alt text");
    render_tag(&attrs, self_closing)
}

/// Attributes in source order, keys lower-cased; a bare key has no value.
///
/// A repeated key keeps its first position and its last value.
fn parse_attributes(inner: &str) -> Vec<Attribute> {
    let mut attrs: Vec<Attribute> = Vec::new();

    for caps in ATTR_RE.captures_iter(inner) {
        let key = caps[1].to_ascii_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string());

        match attrs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => attrs.push((key, value)),
        }
    }

    attrs
}

fn render_attribute((key, value): &Attribute) -> String {
    match value {
        None => key.clone(),
        Some(value) if value.contains('"') => format!("{key}='{value}'"),
        Some(value) => format!("{key}=\"{value}\""),
    }
}

fn render_tag(attrs: &[Attribute], self_closing: bool) -> String {
    let preferred = PREFERRED_ORDER
        .iter()
        .filter_map(|wanted| attrs.iter().find(|(key, _)| key == wanted));
    let remainder = attrs
        .iter()
        .filter(|(key, _)| !PREFERRED_ORDER.contains(&key.as_str()));

    let rendered: Vec<String> = preferred.chain(remainder).map(render_attribute).collect();
    let close = if self_closing { " />" } else { ">" };

    format!("<img {}{close}", rendered.join(" "))
}
