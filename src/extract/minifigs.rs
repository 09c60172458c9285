use std::sync::LazyLock;

use scraper::Selector;

use super::{
    date_shaped, extract_field, identity, not_navigation, price_shaped, reasonable_length,
    FieldSpec, Locator,
};
use crate::navigator::document::{collapse_ws, Document};

/// Raw field values from a minifig page. `sets` is the untouched reference
/// list of set names this figure appears in; resolving those references to
/// codes happens later, in the linker.
#[derive(Debug, Clone, Default)]
pub struct RawMinifig {
    pub minifig_code: String,
    pub official_name: Option<String>,
    pub year: Option<String>,
    pub released: Option<String>,
    pub retail_price_gbp: Option<String>,
    pub theme: Option<String>,
    pub sets: Vec<String>,
}

const YEAR: FieldSpec = FieldSpec {
    name: "year",
    locators: &[Locator::LabelValue("Year"), Locator::AnyContaining("Year")],
    validator: date_shaped,
    post: identity,
};

const RELEASED: FieldSpec = FieldSpec {
    name: "released",
    locators: &[Locator::LabelValue("Released")],
    validator: date_shaped,
    post: identity,
};

const PRICE_GBP: FieldSpec = FieldSpec {
    name: "retail_price_gbp",
    locators: &[
        Locator::LabelValue("Retail price (GBP)"),
        Locator::AnyContaining("£"),
    ],
    validator: price_shaped,
    post: identity,
};

const THEME: FieldSpec = FieldSpec {
    name: "theme",
    locators: &[Locator::LabelValue("Theme")],
    validator: theme_valid,
    post: identity,
};

const NAME: FieldSpec = FieldSpec {
    name: "official_name",
    locators: &[
        Locator::Css("div[id*='MinifigDetails'] h1"),
        Locator::Css("h1"),
        Locator::Meta("og:title"),
        Locator::PageTitle,
    ],
    validator: reasonable_length,
    post: identity,
};

fn theme_valid(s: &str) -> bool {
    reasonable_length(s) && not_navigation(s)
}

pub fn extract(code: &str, doc: &Document) -> RawMinifig {
    RawMinifig {
        minifig_code: code.to_string(),
        official_name: extract_field(doc, &NAME)
            .or_else(|| super::sets::any_with_code(code, doc))
            .map(|n| super::sets::reshape_name(code, &n)),
        year: extract_field(doc, &YEAR),
        released: extract_field(doc, &RELEASED),
        retail_price_gbp: extract_field(doc, &PRICE_GBP),
        theme: extract_field(doc, &THEME),
        sets: set_references(doc),
    }
}

static SET_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        Selector::parse("table[id*='ctlSets'] h4 a[href^='/set/']").unwrap(),
        Selector::parse("a[href^='/set/']").unwrap(),
    ]
});

/// The "appears in" list: link texts pointing at set pages, deduplicated,
/// document order preserved. The first selector is the dedicated sets table;
/// the bare fallback also sweeps up related-set links, which the linker
/// tolerates.
fn set_references(doc: &Document) -> Vec<String> {
    for sel in SET_LINKS.iter() {
        let mut out: Vec<String> = Vec::new();
        for el in doc.html.select(sel) {
            let text = collapse_ws(&el.text().collect::<String>());
            if text.is_empty() || out.contains(&text) {
                continue;
            }
            out.push(text);
        }
        if !out.is_empty() {
            return out;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIFIG_PAGE: &str = r#"<html>
      <head><title>LEGO Gandalf the Grey Minifigure lor001 | BrickEconomy</title></head>
      <body>
        <div id="ContentPlaceHolder1_PanelMinifigDetails">
          <h1>Gandalf the Grey</h1>
          <div class="row rowlist"><div>Theme</div><div>The Lord of the Rings</div></div>
          <div class="row rowlist"><div>Year</div><div>2012</div></div>
          <div class="row rowlist"><div>Released</div><div>June 2012</div></div>
          <div class="row rowlist"><div>Retail price (GBP)</div><div>£8.50</div></div>
        </div>
        <table id="ContentPlaceHolder1_ctlSetsMinifigIsIn">
          <tr><td><h4><a href="/set/9469-gandalf-arrives">9469 Gandalf Arrives</a></h4></td></tr>
          <tr><td><h4><a href="/set/79005-the-wizard-battle">79005 The Wizard Battle</a></h4></td></tr>
          <tr><td><h4><a href="/set/9469-gandalf-arrives">9469 Gandalf Arrives</a></h4></td></tr>
        </table>
      </body></html>"#;

    fn page() -> Document {
        Document::parse("https://test.local/minifig/lor001", MINIFIG_PAGE)
    }

    #[test]
    fn extracts_minifig_fields() {
        let raw = extract("lor001", &page());
        assert_eq!(
            raw.official_name.as_deref(),
            Some("lor001: Gandalf the Grey")
        );
        assert_eq!(raw.year.as_deref(), Some("2012"));
        assert_eq!(raw.released.as_deref(), Some("June 2012"));
        assert_eq!(raw.retail_price_gbp.as_deref(), Some("£8.50"));
        assert_eq!(raw.theme.as_deref(), Some("The Lord of the Rings"));
    }

    #[test]
    fn set_reference_list_is_deduplicated_in_order() {
        let raw = extract("lor001", &page());
        assert_eq!(
            raw.sets,
            vec!["9469 Gandalf Arrives", "79005 The Wizard Battle"]
        );
    }

    #[test]
    fn name_recovered_from_code_bearing_element() {
        let doc = Document::parse(
            "https://test.local/minifig/lor003",
            "<html><body><span>lor003 Legolas Greenleaf</span></body></html>",
        );
        let raw = extract("lor003", &doc);
        assert_eq!(
            raw.official_name.as_deref(),
            Some("lor003: Legolas Greenleaf")
        );
    }

    #[test]
    fn no_sets_table_means_empty_list() {
        let doc = Document::parse(
            "https://test.local/minifig/lor002",
            "<html><body><h1>Frodo Baggins</h1></body></html>",
        );
        let raw = extract("lor002", &doc);
        assert!(raw.sets.is_empty());
        assert_eq!(raw.official_name.as_deref(), Some("lor002: Frodo Baggins"));
    }
}
