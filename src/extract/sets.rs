use std::sync::LazyLock;

use regex::Regex;

use super::{
    date_shaped, extract_field, has_digit, identity, not_navigation, price_shaped,
    reasonable_length, url_shaped, FieldSpec, Locator,
};
use crate::navigator::document::{collapse_ws, Document};

/// Raw field values pulled off a set detail page, untyped and uncleaned
/// beyond whitespace collapsing. Absent fields stay `None`.
#[derive(Debug, Clone, Default)]
pub struct RawSet {
    pub lego_code: String,
    pub official_name: Option<String>,
    pub number_of_pieces: Option<String>,
    pub number_of_minifigs: Option<String>,
    pub released: Option<String>,
    pub retired: Option<String>,
    pub retail_price_eur: Option<String>,
    pub retail_price_gbp: Option<String>,
    pub value_new_sealed: Option<String>,
    pub value_used: Option<String>,
    pub image_url: Option<String>,
    pub theme: Option<String>,
    pub subtheme: Option<String>,
}

const PIECES: FieldSpec = FieldSpec {
    name: "number_of_pieces",
    locators: &[
        Locator::LabelValue("Pieces"),
        Locator::AnyContaining("pieces"),
    ],
    validator: has_digit,
    post: identity,
};

const MINIFIGS: FieldSpec = FieldSpec {
    name: "number_of_minifigs",
    locators: &[Locator::LabelValue("Minifigs")],
    validator: has_digit,
    post: identity,
};

const RELEASED: FieldSpec = FieldSpec {
    name: "released",
    locators: &[
        Locator::LabelValue("Released"),
        Locator::AnyContaining("Released"),
    ],
    validator: date_shaped,
    post: identity,
};

const RETIRED: FieldSpec = FieldSpec {
    name: "retired",
    locators: &[Locator::LabelValue("Retired")],
    validator: date_shaped,
    post: identity,
};

const PRICE_EUR: FieldSpec = FieldSpec {
    name: "retail_price_eur",
    locators: &[
        Locator::LabelValue("Retail price (EUR)"),
        Locator::AnyContaining("€"),
    ],
    validator: price_shaped,
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

const VALUE_NEW: FieldSpec = FieldSpec {
    name: "value_new_sealed",
    locators: &[
        Locator::LabelValue("Value"),
        Locator::LabelValue("New / Sealed"),
    ],
    validator: price_shaped,
    post: identity,
};

const VALUE_USED: FieldSpec = FieldSpec {
    name: "value_used",
    locators: &[Locator::LabelValue("Used")],
    validator: price_shaped,
    post: identity,
};

const IMAGE: FieldSpec = FieldSpec {
    name: "image_url",
    locators: &[
        Locator::Meta("og:image"),
        Locator::Attr("img[id*='imgSetMain']", "src"),
        Locator::Attr("img.set-image", "src"),
    ],
    validator: url_shaped,
    post: identity,
};

const THEME: FieldSpec = FieldSpec {
    name: "theme",
    locators: &[Locator::LabelValue("Theme")],
    validator: theme_valid,
    post: identity,
};

const SUBTHEME: FieldSpec = FieldSpec {
    name: "subtheme",
    locators: &[Locator::LabelValue("Subtheme")],
    validator: theme_valid,
    post: identity,
};

fn theme_valid(s: &str) -> bool {
    reasonable_length(s) && not_navigation(s)
}

pub fn extract(code: &str, doc: &Document) -> RawSet {
    RawSet {
        lego_code: code.to_string(),
        official_name: extract_name(code, doc),
        number_of_pieces: extract_field(doc, &PIECES),
        number_of_minifigs: extract_field(doc, &MINIFIGS),
        released: extract_field(doc, &RELEASED),
        retired: extract_field(doc, &RETIRED),
        retail_price_eur: extract_field(doc, &PRICE_EUR),
        retail_price_gbp: extract_field(doc, &PRICE_GBP),
        value_new_sealed: extract_field(doc, &VALUE_NEW),
        value_used: extract_field(doc, &VALUE_USED),
        image_url: extract_field(doc, &IMAGE),
        theme: extract_field(doc, &THEME),
        subtheme: extract_field(doc, &SUBTHEME),
    }
}

const NAME_HEADINGS: FieldSpec = FieldSpec {
    name: "official_name",
    locators: &[
        Locator::Css("div[id*='SetDetails'] h1"),
        Locator::Css("h1"),
        Locator::Meta("og:title"),
        Locator::PageTitle,
    ],
    validator: reasonable_length,
    post: identity,
};

static BOILERPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(\||\u{2013}|\u{2014})\s*(BrickEconomy|LEGO).*$").unwrap());
static LEADING_LEGO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^LEGO\s+").unwrap());

/// Names come off headings or titles carrying site boilerplate; the stored
/// shape is always `"{code}: {description}"`.
fn extract_name(code: &str, doc: &Document) -> Option<String> {
    // Last resort after the heading chain: any short element mentioning
    // the code.
    let candidate = extract_field(doc, &NAME_HEADINGS).or_else(|| any_with_code(code, doc))?;
    Some(reshape_name(code, &candidate))
}

pub(crate) fn any_with_code(code: &str, doc: &Document) -> Option<String> {
    use scraper::Selector;
    let sel = Selector::parse("h1, h2, h3, h4, span, div").ok()?;
    doc.html
        .select(&sel)
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .find(|t| t.contains(code) && (2..=160).contains(&t.len()))
}

pub fn reshape_name(code: &str, raw: &str) -> String {
    let mut name = BOILERPLATE_RE.replace(raw, "").to_string();
    name = LEADING_LEGO_RE.replace(&name, "").to_string();
    let mut description = name.trim().to_string();
    // Strip a leading code token so it is not doubled.
    for prefix in [format!("{code}:"), format!("{code} -"), code.to_string()] {
        if let Some(rest) = description.strip_prefix(&prefix) {
            description = rest.trim().to_string();
            break;
        }
    }
    if description.is_empty() {
        code.to_string()
    } else {
        format!("{code}: {description}")
    }
}
