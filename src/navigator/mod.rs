pub mod document;
pub mod locate;
pub mod obstructions;

use std::path::PathBuf;
use std::sync::Arc;

use scraper::Selector;
use tracing::{debug, info, warn};

use crate::config::{Config, NavigationMode};
use crate::error::{RetryError, ScrapeError};
use crate::fetch::PageFetcher;
use crate::retry::{self, RetryPolicy};

pub use document::Document;
pub use locate::{locate, Intent, Located};

/// Drives page loads for the pipeline: fetch with bounded retry, parse,
/// strip obstructions, then resolve targets through locator chains. One
/// navigator per run; it holds no per-page state.
pub struct Navigator {
    fetcher: Arc<dyn PageFetcher>,
    policy: RetryPolicy,
    mode: NavigationMode,
    config: Config,
}

impl Navigator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &Config) -> Self {
        Self {
            fetcher,
            policy: RetryPolicy::new(config.max_attempts, config.retry_base_delay),
            mode: config.mode,
            config: config.clone(),
        }
    }

    /// Fetch and parse a page, retrying transient failures, then clear any
    /// overlays so later locators see the real content.
    pub async fn load(&self, url: &str) -> Result<Document, RetryError> {
        let fetcher = Arc::clone(&self.fetcher);
        let body = retry::run(self.policy, url, || {
            let fetcher = Arc::clone(&fetcher);
            let url = url.to_string();
            async move { fetcher.fetch(&url).await }
        })
        .await?;

        if self.mode == NavigationMode::Visible {
            self.dump_page(url, &body);
        }

        let mut doc = Document::parse(url, &body);
        let cleared = obstructions::clear(&mut doc);
        if self.mode == NavigationMode::Visible {
            info!(
                "loaded {} ({} bytes, {} obstruction(s) cleared)",
                url,
                body.len(),
                cleared
            );
        }
        Ok(doc)
    }

    /// Resolve a set code to its detail page: home page, search results,
    /// then the best result link. Prefers a link whose path starts with the
    /// exact code; otherwise falls back to the results grid, disambiguated
    /// by the configured theme list.
    pub async fn find_set_detail(&self, code: &str) -> Result<Document, ScrapeError> {
        let home = self.load(&self.config.base_url).await.map_err(flatten)?;
        locate(&home, &Intent::SearchForm)?;

        let results = self
            .load(&self.config.set_search_url(code))
            .await
            .map_err(flatten)?;

        // The tab is informational; result links are reachable either way.
        if let Err(e) = locate(&results, &Intent::SetsTab) {
            debug!("sets tab not present, scanning results directly: {e}");
        }

        // A missing result link gets one fresh load of the results page
        // before we give up on the code.
        let url = match self.pick_result_link(&results, code) {
            Ok(url) => url,
            Err(ScrapeError::LocatorNotFound { intent }) => {
                debug!("no {} for {} on first pass, reloading results", intent, code);
                let results = self
                    .load(&self.config.set_search_url(code))
                    .await
                    .map_err(flatten)?;
                self.pick_result_link(&results, code)?
            }
            Err(e) => return Err(e),
        };
        info!("resolved {} -> {}", code, url);
        let detail = self.load(&url).await.map_err(flatten)?;
        // Extraction tolerates a missing panel; note it so markup drift
        // shows up in the logs before fields start coming back empty.
        if let Err(e) = locate(&detail, &Intent::DetailPanel) {
            debug!("detail panel not located on {}: {e}", detail.url);
        }
        Ok(detail)
    }

    /// Minifig pages are addressable by code directly; a 404-shaped page
    /// (status or title) means the code does not exist.
    pub async fn load_minifig(&self, code: &str) -> Result<Document, RetryError> {
        let url = self.config.minifig_url(code);
        let doc = self.load(&url).await?;
        if let Some(title) = doc.title() {
            let lowered = title.to_lowercase();
            if lowered.contains("404") || lowered.contains("page not found") {
                return Err(RetryError {
                    attempts: 1,
                    last: ScrapeError::NotFound { url },
                });
            }
        }
        Ok(doc)
    }

    fn pick_result_link(&self, results: &Document, code: &str) -> Result<String, ScrapeError> {
        let hit = locate(results, &Intent::ResultLink(code.to_string()))?;
        let exact_prefix = format!("a[href^='/set/{code}");
        if hit.selector.starts_with(&exact_prefix) {
            return hit.target.ok_or(ScrapeError::LocatorNotFound {
                intent: "result link",
            });
        }

        // Inexact match: scan the whole grid and prefer a result from one of
        // the themes we actually collect.
        let sel = Selector::parse("a[href^='/set/']").map_err(|_| {
            ScrapeError::LocatorNotFound {
                intent: "result link",
            }
        })?;
        let mut first: Option<String> = None;
        for el in results.html.select(&sel) {
            if !document::is_interactable(&el) {
                continue;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(url) = results.resolve_href(href) else {
                continue;
            };
            if first.is_none() {
                first = Some(url.clone());
            }
            let context = document::collapse_ws(&el.text().collect::<String>());
            if self
                .config
                .target_themes
                .iter()
                .any(|t| context.contains(t.as_str()))
            {
                return Ok(url);
            }
        }
        match first {
            Some(url) => {
                warn!("no themed result for {}, taking first grid link", code);
                Ok(url)
            }
            None => Err(ScrapeError::LocatorNotFound {
                intent: "result link",
            }),
        }
    }

    fn dump_page(&self, url: &str, body: &str) {
        let name: String = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = PathBuf::from("debug_pages").join(format!("{name}.html"));
        if let Err(e) = std::fs::create_dir_all("debug_pages")
            .and_then(|_| std::fs::write(&path, body))
        {
            warn!("could not dump {} to {}: {}", url, path.display(), e);
        }
    }
}

/// Collapse retry exhaustion to its last underlying cause where the caller
/// only needs the error taxonomy, not the attempt count.
fn flatten(err: RetryError) -> ScrapeError {
    err.last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.base_url = "https://test.local".into();
        cfg.retry_base_delay = std::time::Duration::from_millis(1);
        cfg
    }

    const HOME: &str = r#"<html><head><title>BrickEconomy</title></head><body>
        <form action="/search"><input id="txtSearchHeader" type="text"></form>
    </body></html>"#;

    #[tokio::test]
    async fn finds_exact_set_link_through_search() {
        let cfg = test_config();
        let fetcher = StaticFetcher::new()
            .with_page("https://test.local", HOME)
            .with_page(
                "https://test.local/search?query=9469",
                r#"<div class="search-results">
                    <a href="/set/10316-rivendell">10316 Rivendell</a>
                    <a href="/set/9469-gandalf-arrives">9469 Gandalf Arrives</a>
                </div>"#,
            )
            .with_page(
                "https://test.local/set/9469-gandalf-arrives",
                "<html><head><title>9469 Gandalf Arrives</title></head></html>",
            );
        let nav = Navigator::new(Arc::new(fetcher), &cfg);
        let doc = nav.find_set_detail("9469").await.unwrap();
        assert!(doc.url.ends_with("/set/9469-gandalf-arrives"));
    }

    #[tokio::test]
    async fn retries_flaky_home_page() {
        let cfg = test_config();
        let fetcher = StaticFetcher::new().with_flaky_page("https://test.local", HOME, 2);
        let nav = Navigator::new(Arc::new(fetcher), &cfg);
        let doc = nav.load("https://test.local").await.unwrap();
        assert_eq!(doc.title().as_deref(), Some("BrickEconomy"));
    }

    #[tokio::test]
    async fn theme_disambiguation_on_inexact_results() {
        let cfg = test_config();
        let fetcher = StaticFetcher::new()
            .with_page("https://test.local", HOME)
            .with_page(
                "https://test.local/search?query=79003",
                r#"<div class="search-results">
                    <a href="/set/fire-boat">60109 Fire Boat City</a>
                    <a href="/set/an-unexpected-gathering">An Unexpected Gathering The Hobbit</a>
                </div>"#,
            )
            .with_page(
                "https://test.local/set/an-unexpected-gathering",
                "<html><head><title>79003</title></head></html>",
            );
        let nav = Navigator::new(Arc::new(fetcher), &cfg);
        let doc = nav.find_set_detail("79003").await.unwrap();
        assert!(doc.url.ends_with("/set/an-unexpected-gathering"));
    }

    #[tokio::test]
    async fn empty_results_fail_after_one_reload() {
        let cfg = test_config();
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_page("https://test.local", HOME)
                .with_page(
                    "https://test.local/search?query=9469",
                    r#"<div class="search-results"><p>No results.</p></div>"#,
                ),
        );
        let nav = Navigator::new(Arc::clone(&fetcher) as Arc<dyn PageFetcher>, &cfg);
        let err = nav.find_set_detail("9469").await.unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::LocatorNotFound { intent: "result link" }
        ));
        // Home once, results twice.
        assert_eq!(fetcher.request_count("https://test.local/search?query=9469"), 2);
    }

    #[tokio::test]
    async fn missing_minifig_is_not_found() {
        let cfg = test_config();
        let fetcher = StaticFetcher::new().with_page(
            "https://test.local/minifig/zzz999",
            "<html><head><title>404 - Page Not Found</title></head></html>",
        );
        let nav = Navigator::new(Arc::new(fetcher), &cfg);
        let err = nav.load_minifig("zzz999").await.unwrap_err();
        assert!(matches!(err.last, ScrapeError::NotFound { .. }));
    }
}
