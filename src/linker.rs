use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::db::Relation;

/// References shorter than this never match by substring containment; tokens
/// like "rin" or a bare digit would attach to half the catalog.
const MIN_SUBSTRING_LEN: usize = 4;

/// Resolves free-text set references ("9469 Gandalf Arrives", "Shelob
/// Attacks") to known set codes. The index is built once per linking pass
/// from the stored names; matching is case-insensitive and ordered from
/// strict to loose, first hit wins.
pub struct EntityLinker {
    /// variant -> code, insertion order preserved so earlier sets win ties.
    variants: IndexMap<String, String>,
    codes: HashSet<String>,
}

impl EntityLinker {
    /// `sets` pairs each known code with its stored official name.
    pub fn new(sets: &[(String, String)]) -> Self {
        let mut variants = IndexMap::new();
        let mut codes = HashSet::new();
        for (code, name) in sets {
            let code_lc = code.to_lowercase();
            codes.insert(code_lc.clone());
            for variant in name_variants(code, name) {
                // First set to claim a variant keeps it.
                variants.entry(variant).or_insert_with(|| code.clone());
            }
        }
        Self { variants, codes }
    }

    /// Resolve one reference: exact variant, then a leading digit run that is
    /// itself a known code, then substring containment either direction.
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        let needle = normalize(reference);
        if needle.is_empty() {
            return None;
        }

        if let Some(code) = self.variants.get(&needle) {
            return Some(code);
        }

        let digits: String = needle.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && self.codes.contains(&digits) {
            return self
                .variants
                .values()
                .find(|c| c.to_lowercase() == digits)
                .map(|c| c.as_str());
        }

        if needle.len() >= MIN_SUBSTRING_LEN {
            for (variant, code) in &self.variants {
                if variant.len() >= MIN_SUBSTRING_LEN
                    && (variant.contains(&needle) || needle.contains(variant.as_str()))
                {
                    return Some(code);
                }
            }
        }

        debug!("unresolved set reference: '{}'", reference);
        None
    }

    /// Resolve a minifig's whole comma-joined reference list into relations,
    /// deduplicated per set. Unresolvable references drop out silently.
    pub fn link(&self, minifig_code: &str, references: &str) -> Vec<Relation> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for reference in references.split(',') {
            let reference = reference.trim();
            if reference.is_empty() {
                continue;
            }
            if let Some(code) = self.resolve(reference) {
                if seen.insert(code.to_string()) {
                    out.push(Relation {
                        set_code: code.to_string(),
                        minifig_code: minifig_code.to_string(),
                        quantity: 1,
                    });
                }
            }
        }
        out
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// All the shapes a set is findable under: full name, the name without its
/// leading code prefix, and the bare code.
fn name_variants(code: &str, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let full = normalize(name);
    if !full.is_empty() {
        out.push(full.clone());
    }
    let stripped = normalize(strip_code_prefix(name));
    if !stripped.is_empty() && !out.contains(&stripped) {
        out.push(stripped);
    }
    let code_lc = code.to_lowercase();
    if !out.contains(&code_lc) {
        out.push(code_lc);
    }
    out
}

/// "9469: Gandalf Arrives" -> "Gandalf Arrives".
fn strip_code_prefix(name: &str) -> &str {
    let rest = name.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == name.len() {
        return name;
    }
    rest.trim_start_matches([':', '-', ' '])
}
