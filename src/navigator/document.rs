use scraper::{ElementRef, Html, Selector};

/// A loaded page: final URL plus the parsed tree. Obstruction clearing
/// mutates the tree in place (detached nodes stop matching selectors), so a
/// handle is single-use per navigation step, never cached across loads.
#[derive(Debug)]
pub struct Document {
    pub url: String,
    pub html: Html,
}

impl Document {
    pub fn parse(url: &str, body: &str) -> Self {
        Self {
            url: url.to_string(),
            html: Html::parse_document(body),
        }
    }

    /// `<title>` text, whitespace-collapsed, or None when absent/empty.
    pub fn title(&self) -> Option<String> {
        let sel = Selector::parse("title").ok()?;
        let el = self.html.select(&sel).next()?;
        let text = collapse_ws(&el.text().collect::<String>());
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Resolve a possibly-relative href against this document's URL.
    pub fn resolve_href(&self, href: &str) -> Option<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        let base = reqwest::Url::parse(&self.url).ok()?;
        base.join(href).ok().map(|u| u.to_string())
    }
}

/// An element is interactable when it is not hidden and, for anchors and
/// forms, actually carries a target to follow. Mirrors the "present and
/// clickable" gate the navigation layer needs before activating anything.
pub fn is_interactable(el: &ElementRef) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() {
        return false;
    }
    if v.attr("aria-hidden") == Some("true") {
        return false;
    }
    if let Some(style) = v.attr("style") {
        let style: String = style.split_whitespace().collect();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return false;
        }
    }
    match v.name() {
        "a" => v.attr("href").is_some_and(|h| !h.trim().is_empty()),
        "form" => true,
        "input" | "button" => v.attr("disabled").is_none(),
        _ => {
            // Generic containers count as present only if they have content.
            !collapse_ws(&el.text().collect::<String>()).is_empty()
        }
    }
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a Document, sel: &str) -> ElementRef<'a> {
        let selector = Selector::parse(sel).unwrap();
        doc.html.select(&selector).next().unwrap()
    }

    #[test]
    fn title_collapses_whitespace() {
        let doc = Document::parse(
            "https://example.com",
            "<html><head><title>  9469   Gandalf Arrives </title></head></html>",
        );
        assert_eq!(doc.title().as_deref(), Some("9469 Gandalf Arrives"));
    }

    #[test]
    fn resolve_relative_href() {
        let doc = Document::parse("https://www.brickeconomy.com/search?query=9469", "<html></html>");
        assert_eq!(
            doc.resolve_href("/set/9469-gandalf-arrives").as_deref(),
            Some("https://www.brickeconomy.com/set/9469-gandalf-arrives")
        );
    }

    #[test]
    fn hidden_anchor_is_not_interactable() {
        let doc = Document::parse(
            "https://example.com",
            r#"<a href="/x" style="display: none">go</a>"#,
        );
        assert!(!is_interactable(&first(&doc, "a")));
    }

    #[test]
    fn anchor_without_href_is_not_interactable() {
        let doc = Document::parse("https://example.com", "<a>go</a>");
        assert!(!is_interactable(&first(&doc, "a")));
    }

    #[test]
    fn plain_anchor_is_interactable() {
        let doc = Document::parse("https://example.com", r#"<a href="/x">go</a>"#);
        assert!(is_interactable(&first(&doc, "a")));
    }

    #[test]
    fn empty_div_is_not_present() {
        let doc = Document::parse("https://example.com", "<div class='x'>  </div>");
        assert!(!is_interactable(&first(&doc, "div.x")));
    }
}
