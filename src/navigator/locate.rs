use scraper::Selector;
use tracing::{debug, trace};

use super::document::{collapse_ws, is_interactable, Document};
use crate::error::ScrapeError;

/// A navigation target, resolved through an ordered fallback chain of CSS
/// locators. The page's markup drifts over time; each intent lists the
/// selectors that have been observed to work, newest first.
#[derive(Debug, Clone)]
pub enum Intent {
    /// The site-wide search input (home page header).
    SearchForm,
    /// The "Sets" tab on a search-results page.
    SetsTab,
    /// A link from search results to a set detail page, best match first.
    ResultLink(String),
    /// The details panel on a set or minifig page.
    DetailPanel,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::SearchForm => "search form",
            Intent::SetsTab => "sets tab",
            Intent::ResultLink(_) => "result link",
            Intent::DetailPanel => "detail panel",
        }
    }

    fn selectors(&self) -> Vec<String> {
        match self {
            Intent::SearchForm => vec![
                "input#txtSearchHeader".into(),
                "form[action*='search'] input[type='text']".into(),
                "input[type='search']".into(),
                "form[role='search'] input".into(),
            ],
            Intent::SetsTab => vec![
                "a#sets-tab".into(),
                "a[data-toggle='tab'][href*='sets']".into(),
                "ul.nav-tabs a[href*='sets']".into(),
            ],
            Intent::ResultLink(code) => vec![
                format!("a[href^='/set/{code}-']"),
                format!("a[href^='/set/{code}']"),
                "table[id*='GridViewSets'] h4 a[href^='/set/']".into(),
                "div.search-results a[href^='/set/']".into(),
                "a[href^='/set/']".into(),
            ],
            Intent::DetailPanel => vec![
                "div[id*='PanelSetDetails']".into(),
                "div[id*='SetDetails']".into(),
                "div.side-box-body".into(),
                "div#main-content".into(),
            ],
        }
    }
}

/// The winning match for an intent: which selector matched, the element's
/// collapsed text, and its navigation target (resolved href for anchors,
/// resolved form action for inputs inside a form) when it has one.
#[derive(Debug, Clone)]
pub struct Located {
    pub selector: String,
    pub text: String,
    pub target: Option<String>,
}

/// Walk the intent's locator chain in order and accept the first present,
/// interactable match. Exhausting the chain is the only failure.
pub fn locate(doc: &Document, intent: &Intent) -> Result<Located, ScrapeError> {
    for raw in intent.selectors() {
        let Ok(selector) = Selector::parse(&raw) else {
            continue;
        };
        for el in doc.html.select(&selector) {
            if !is_interactable(&el) {
                trace!("{}: '{}' matched but not interactable", intent.label(), raw);
                continue;
            }
            let target = element_target(doc, &el);
            debug!("{}: matched via '{}'", intent.label(), raw);
            return Ok(Located {
                selector: raw,
                text: collapse_ws(&el.text().collect::<String>()),
                target,
            });
        }
    }
    Err(ScrapeError::LocatorNotFound {
        intent: intent.label(),
    })
}

/// Where activating this element would take us: an anchor's href, or the
/// enclosing form's action for form controls.
fn element_target(doc: &Document, el: &scraper::ElementRef) -> Option<String> {
    match el.value().name() {
        "a" => doc.resolve_href(el.value().attr("href")?),
        "input" | "button" => {
            let mut cursor = el.parent();
            while let Some(node) = cursor {
                if let Some(parent) = scraper::ElementRef::wrap(node) {
                    if parent.value().name() == "form" {
                        let action = parent.value().attr("action").unwrap_or("");
                        return if action.is_empty() {
                            Some(doc.url.clone())
                        } else {
                            doc.resolve_href(action)
                        };
                    }
                }
                cursor = node.parent();
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_locator_wins_when_present() {
        let doc = Document::parse(
            "https://www.brickeconomy.com/",
            r#"<form action="/search"><input id="txtSearchHeader" type="text"></form>"#,
        );
        let hit = locate(&doc, &Intent::SearchForm).unwrap();
        assert_eq!(hit.selector, "input#txtSearchHeader");
        assert_eq!(
            hit.target.as_deref(),
            Some("https://www.brickeconomy.com/search")
        );
    }

    #[test]
    fn falls_through_hidden_candidates() {
        let doc = Document::parse(
            "https://www.brickeconomy.com/search?query=9469",
            r#"<a href="/set/9469-gandalf" style="display:none">hidden</a>
               <div class="search-results"><a href="/set/9469-gandalf-arrives">9469 Gandalf Arrives</a></div>"#,
        );
        let hit = locate(&doc, &Intent::ResultLink("9469".into())).unwrap();
        assert_eq!(
            hit.target.as_deref(),
            Some("https://www.brickeconomy.com/set/9469-gandalf-arrives")
        );
    }

    #[test]
    fn exact_code_link_preferred_over_grid() {
        let doc = Document::parse(
            "https://www.brickeconomy.com/search?query=9469",
            r#"<a href="/set/10316-rivendell">10316 Rivendell</a>
               <a href="/set/9469-gandalf-arrives">9469 Gandalf Arrives</a>"#,
        );
        let hit = locate(&doc, &Intent::ResultLink("9469".into())).unwrap();
        assert!(hit.target.unwrap().contains("/set/9469-"));
    }

    #[test]
    fn detail_panel_found_on_detail_page() {
        let body = std::fs::read_to_string("tests/fixtures/set_9469.html").unwrap();
        let doc = Document::parse("https://test.local/set/9469-gandalf-arrives", &body);
        let hit = locate(&doc, &Intent::DetailPanel).unwrap();
        assert_eq!(hit.selector, "div[id*='PanelSetDetails']");
    }

    #[test]
    fn exhausted_chain_reports_intent() {
        let doc = Document::parse("https://www.brickeconomy.com/", "<p>maintenance</p>");
        let err = locate(&doc, &Intent::SearchForm).unwrap_err();
        match err {
            ScrapeError::LocatorNotFound { intent } => assert_eq!(intent, "search form"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
