pub mod minifigs;
pub mod sets;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use tracing::trace;

use crate::navigator::document::{collapse_ws, Document};

/// One way of finding a field's value on a page. Fields list these in
/// preference order; the markup shifts between page generations, so every
/// field carries fallbacks.
#[derive(Debug, Clone, Copy)]
pub enum Locator {
    /// CSS selector, element text.
    Css(&'static str),
    /// Two-column label/value row: match the label cell, take the value cell.
    LabelValue(&'static str),
    /// `<meta property=… content=…>` (or name=), content attribute.
    Meta(&'static str),
    /// The document `<title>`.
    PageTitle,
    /// Attribute of the first element matching a selector.
    Attr(&'static str, &'static str),
    /// Any short element whose text contains the token.
    AnyContaining(&'static str),
}

/// A field to pull from a page: ordered locators, a shape predicate, and a
/// cleanup pass applied to the winning candidate.
pub struct FieldSpec {
    pub name: &'static str,
    pub locators: &'static [Locator],
    pub validator: fn(&str) -> bool,
    pub post: fn(&str) -> String,
}

/// First validator-passing candidate across the fallback chain, cleaned up.
/// No candidate at all is an absent field, not an error.
pub fn extract_field(doc: &Document, spec: &FieldSpec) -> Option<String> {
    for locator in spec.locators {
        for candidate in candidates(doc, locator) {
            let candidate = collapse_ws(&candidate);
            if candidate.is_empty() {
                continue;
            }
            if !(spec.validator)(&candidate) {
                trace!("{}: rejected candidate '{}'", spec.name, candidate);
                continue;
            }
            return Some((spec.post)(&candidate));
        }
    }
    trace!("{}: no locator produced a valid candidate", spec.name);
    None
}

fn candidates(doc: &Document, locator: &Locator) -> Vec<String> {
    match locator {
        Locator::Css(sel) => select_texts(doc, sel),
        Locator::LabelValue(label) => label_values(doc, label),
        Locator::Meta(name) => {
            let mut out = Vec::new();
            for sel in [
                format!("meta[property='{name}']"),
                format!("meta[name='{name}']"),
            ] {
                if let Ok(selector) = Selector::parse(&sel) {
                    out.extend(
                        doc.html
                            .select(&selector)
                            .filter_map(|el| el.value().attr("content"))
                            .map(|s| s.to_string()),
                    );
                }
            }
            out
        }
        Locator::PageTitle => doc.title().into_iter().collect(),
        Locator::Attr(sel, attr) => {
            let Ok(selector) = Selector::parse(sel) else {
                return Vec::new();
            };
            doc.html
                .select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(|s| s.to_string())
                .collect()
        }
        Locator::AnyContaining(token) => {
            let token = token.to_lowercase();
            SCAN_ELEMENTS
                .iter()
                .flat_map(|sel| doc.html.select(sel))
                .filter_map(|el| {
                    let text = collapse_ws(&el.text().collect::<String>());
                    // Short elements only; containers that merely enclose the
                    // token would swallow half the page.
                    if text.len() <= 160 && text.to_lowercase().contains(&token) {
                        Some(text)
                    } else {
                        None
                    }
                })
                .collect()
        }
    }
}

static SCAN_ELEMENTS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["h1", "h2", "h3", "h4", "h5", "td", "span", "div", "a"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static ROWLIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.row.rowlist, tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div, th, td").unwrap());

fn select_texts(doc: &Document, sel: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(sel) else {
        return Vec::new();
    };
    doc.html
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// Label/value detail rows: first cell names the field, second carries the
/// value. Matches both the rowlist divs and plain tables.
fn label_values(doc: &Document, label: &str) -> Vec<String> {
    let label = label.to_lowercase();
    let mut out = Vec::new();
    for row in doc.html.select(&ROWLIST) {
        let cells: Vec<String> = row
            .select(&CELL)
            .map(|c| collapse_ws(&c.text().collect::<String>()))
            .collect();
        if cells.len() < 2 {
            continue;
        }
        if cells[0].to_lowercase().starts_with(&label) {
            out.push(cells[cells.len() - 1].clone());
        }
    }
    out
}

// ── Shape predicates ─────────────────────────────────────────────────────────

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[€£$]\s*\d|\d+\.\d{2}").unwrap());

const NAV_NOISE: &[&str] = &[
    "home", "login", "sign in", "sign up", "register", "menu", "search", "cookie", "privacy",
];

pub fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

pub fn reasonable_length(s: &str) -> bool {
    (2..=150).contains(&s.len())
}

pub fn not_navigation(s: &str) -> bool {
    let lowered = s.to_lowercase();
    !NAV_NOISE.iter().any(|n| lowered == *n)
}

pub fn price_shaped(s: &str) -> bool {
    PRICE_RE.is_match(s)
}

pub fn date_shaped(s: &str) -> bool {
    YEAR_RE.is_match(s)
}

pub fn url_shaped(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/')
}

pub fn identity(s: &str) -> String {
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse("https://test.local/set/9469-gandalf-arrives", body)
    }

    #[test]
    fn label_value_row_extracts_second_cell() {
        let d = doc(
            r#"<div class="row rowlist"><div class="col-xs-5">Pieces</div><div class="col-xs-7">270</div></div>"#,
        );
        let spec = FieldSpec {
            name: "number_of_pieces",
            locators: &[Locator::LabelValue("Pieces")],
            validator: has_digit,
            post: identity,
        };
        assert_eq!(extract_field(&d, &spec).as_deref(), Some("270"));
    }

    #[test]
    fn falls_back_when_first_locator_misses() {
        let d = doc(r#"<meta property="og:image" content="https://img.test/9469.jpg">"#);
        let spec = FieldSpec {
            name: "image_url",
            locators: &[
                Locator::Attr("img.set-image", "src"),
                Locator::Meta("og:image"),
            ],
            validator: url_shaped,
            post: identity,
        };
        assert_eq!(
            extract_field(&d, &spec).as_deref(),
            Some("https://img.test/9469.jpg")
        );
    }

    #[test]
    fn invalid_candidate_falls_through_to_next_match() {
        let d = doc(
            r#"<div class="row rowlist"><div>Released</div><div>Unknown</div></div>
               <table><tr><th>Released</th><td>March 2004</td></tr></table>"#,
        );
        let spec = FieldSpec {
            name: "released",
            locators: &[Locator::LabelValue("Released")],
            validator: date_shaped,
            post: identity,
        };
        assert_eq!(extract_field(&d, &spec).as_deref(), Some("March 2004"));
    }

    #[test]
    fn missing_field_is_none_not_error() {
        let d = doc("<p>nothing useful</p>");
        let spec = FieldSpec {
            name: "theme",
            locators: &[Locator::LabelValue("Theme")],
            validator: reasonable_length,
            post: identity,
        };
        assert_eq!(extract_field(&d, &spec), None);
    }

    #[test]
    fn any_containing_skips_long_containers() {
        let long = "x".repeat(400);
        let html = format!(
            r#"<div>{long} 270 pieces</div><span>270 pieces</span>"#
        );
        let d = doc(&html);
        let spec = FieldSpec {
            name: "number_of_pieces",
            locators: &[Locator::AnyContaining("pieces")],
            validator: has_digit,
            post: identity,
        };
        assert_eq!(extract_field(&d, &spec).as_deref(), Some("270 pieces"));
    }
}
