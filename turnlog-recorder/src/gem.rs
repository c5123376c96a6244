use crate::extractor::first_match;
use crate::logging::Logger;
use crate::selectors;
use crate::utils::ChatUrl;
use serde::{Deserialize, Serialize};
use turnlog::Document;

/// Identity of the Gem persona a chat runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GemInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Tracks the Gem of the current page. The cached value belongs to one
/// URL context and is dropped when navigation leaves it.
pub struct GemDetector {
    logger: Logger,
    current: Option<GemInfo>,
}

impl GemDetector {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            current: None,
        }
    }

    pub fn reset(&mut self) {
        if self.current.take().is_some() {
            self.logger.debug("Gem context cleared");
        }
    }

    pub fn current_gem_info(&self) -> Option<&GemInfo> {
        self.current.as_ref()
    }

    /// Refresh the cached Gem from `url` and the page. Names already found
    /// for the same Gem are kept.
    pub fn detect(&mut self, doc: &Document, url: &str) -> Option<&GemInfo> {
        let Some(gem_id) = ChatUrl::parse(url).gem_id().map(str::to_string) else {
            self.reset();
            return None;
        };

        let cached_complete = self
            .current
            .as_ref()
            .is_some_and(|gem| gem.id == gem_id && gem.name.is_some());
        if !cached_complete {
            let text_of = |list: &[&str]| {
                first_match(doc, list)
                    .map(|el| el.inner_text().trim().to_string())
                    .filter(|text| !text.is_empty())
            };
            let name = text_of(selectors::GEM_NAME);
            if name.is_none() {
                self.logger
                    .debug(format_args!("Gem {gem_id} detected but its name is not rendered yet"));
            }
            let gem = GemInfo {
                id: gem_id,
                name,
                description: text_of(selectors::GEM_DESCRIPTION),
            };
            self.logger.info(format_args!("Gem detected: {:?}", gem));
            self.current = Some(gem);
        }
        self.current.as_ref()
    }

    /// Drop the cached Gem when navigation moves into, out of or between
    /// Gems. Returns whether a reset happened.
    pub fn on_url_changed(&mut self, old_url: &str, new_url: &str) -> bool {
        let old = ChatUrl::parse(old_url);
        let new = ChatUrl::parse(new_url);
        if old.gem_id() != new.gem_id() {
            self.reset();
            return true;
        }
        false
    }
}
