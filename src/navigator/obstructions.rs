use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use tracing::debug;

use super::document::Document;

/// Class/id fragments that mark cookie walls, consent modals and promo
/// overlays. The source injects these unpredictably; left in place they
/// pollute text scans and can shadow the real detail panel.
const OVERLAY_TOKENS: &[&str] = &["modal", "popup", "overlay", "cookie", "consent", "banner"];

static Z_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"z-index\s*:\s*(\d+)").unwrap());
static ALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());

/// Detach every overlay-like element from the tree. Safe to call repeatedly;
/// zero matches is the common case on clean pages. Returns how many nodes
/// were removed.
pub fn clear(doc: &mut Document) -> usize {
    let mut targets = Vec::new();
    for el in doc.html.select(&ALL) {
        let v = el.value();
        let class = v.attr("class").unwrap_or("");
        let id = v.attr("id").unwrap_or("");
        let style = v.attr("style").unwrap_or("");
        if is_overlay(class, id, style) {
            targets.push(el.id());
        }
    }

    let mut removed = 0;
    for id in targets {
        if let Some(mut node) = doc.html.tree.get_mut(id) {
            node.detach();
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("cleared {} obstruction node(s) from {}", removed, doc.url);
    }
    removed
}

fn is_overlay(class: &str, id: &str, style: &str) -> bool {
    let class = class.to_lowercase();
    let id = id.to_lowercase();
    if OVERLAY_TOKENS
        .iter()
        .any(|t| class.contains(t) || id.contains(t))
    {
        return true;
    }

    // Fixed positioning with a large z-index is overlay-shaped even without
    // a telltale class name.
    let compact: String = style.to_lowercase().split_whitespace().collect();
    if compact.contains("position:fixed") {
        if let Some(caps) = Z_INDEX_RE.captures(&compact) {
            if let Ok(z) = caps[1].parse::<u32>() {
                return z > 999;
            }
        }
    }
    false
}
