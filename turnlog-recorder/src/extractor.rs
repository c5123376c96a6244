//! Best-effort reads of the prompt area and page chrome.
//!
//! Nothing here fails: a missing element yields an empty value or a
//! sentinel plus a warning.

mod account;
mod codeblock;

pub use account::{
    find_account_label, parse_account_label, AccountInfo, LabelStrategy, STRATEGIES, UNKNOWN,
};
pub use codeblock::{mask_codeblocks, MaskedPrompt};

use crate::config::RecorderConfig;
use crate::logging::Logger;
use crate::selectors;
use crate::utils::truncate_chars;
use turnlog::{Document, ElementRef};

/// First element matched by any of `selectors`, tried in order.
pub fn first_match<'a>(doc: &'a Document, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|selector| doc.query_selector(*selector))
}

fn visible_text(element: &ElementRef<'_>) -> String {
    element.inner_text().replace('\u{a0}', " ")
}

fn first_text(doc: &Document, selectors: &[&str]) -> Option<String> {
    first_match(doc, selectors)
        .map(|el| visible_text(&el).trim().to_string())
        .filter(|text| !text.is_empty())
}

#[derive(Clone)]
pub struct InputExtractor {
    logger: Logger,
    original_prompt_max_chars: usize,
}

impl InputExtractor {
    pub fn new(logger: Logger, config: &RecorderConfig) -> Self {
        Self {
            logger,
            original_prompt_max_chars: config.original_prompt_max_chars,
        }
    }

    fn editor_text(&self, doc: &Document) -> Option<String> {
        match first_match(doc, selectors::PROMPT_EDITOR) {
            Some(editor) => Some(visible_text(&editor)),
            None => {
                self.logger.warn("Prompt editor not found");
                None
            }
        }
    }

    /// Editor text with codeblocks masked.
    pub fn prompt_text(&self, doc: &Document) -> MaskedPrompt {
        let Some(text) = self.editor_text(doc) else {
            return MaskedPrompt::default();
        };
        let masked = mask_codeblocks(&text);
        if masked.has_codeblocks {
            self.logger.debug(format_args!(
                "Masked {} codeblock(s) in prompt",
                masked.codeblock_count
            ));
        }
        masked
    }

    /// Raw editor text, truncated for comparison with page titles.
    pub fn original_prompt_text(&self, doc: &Document) -> String {
        self.editor_text(doc)
            .map(|text| truncate_chars(&text, self.original_prompt_max_chars))
            .unwrap_or_default()
    }

    /// Names of attached files, preferring each preview's `title`.
    pub fn attached_files(&self, doc: &Document) -> Vec<String> {
        let previews = selectors::FILE_PREVIEWS
            .iter()
            .map(|selector| doc.query_selector_all(*selector))
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let files: Vec<String> = previews
            .iter()
            .filter_map(|preview| {
                let name = preview
                    .attr("title")
                    .map(str::trim)
                    .filter(|title| !title.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| visible_text(preview).trim().to_string());
                (!name.is_empty()).then_some(name)
            })
            .collect();

        if !files.is_empty() {
            self.logger
                .debug(format_args!("Found {} attached file(s)", files.len()));
        }
        files
    }

    pub fn account_info(&self, doc: &Document) -> AccountInfo {
        let Some((strategy, label)) = find_account_label(doc) else {
            self.logger.warn("No account label found");
            return AccountInfo::unknown();
        };
        match parse_account_label(&label) {
            Some(info) => {
                self.logger
                    .debug(format_args!("Account found via {strategy}"));
                info
            }
            None => {
                self.logger
                    .warn(format_args!("Could not parse account label from {strategy}"));
                AccountInfo::unknown()
            }
        }
    }

    pub fn model_name(&self, doc: &Document) -> String {
        first_text(doc, selectors::MODEL_NAME).unwrap_or_else(|| {
            self.logger.warn("Model name not found");
            UNKNOWN.to_string()
        })
    }

    pub fn gemini_plan(&self, doc: &Document) -> Option<String> {
        first_text(doc, selectors::PLAN_BADGE)
    }

    /// Title of the active conversation as shown in the page, if any.
    pub fn conversation_title(&self, doc: &Document) -> Option<String> {
        first_text(doc, selectors::CONVERSATION_TITLE)
    }
}
