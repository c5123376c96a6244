//! Deadline-bounded watches over page state.
//!
//! The observer never reads the page on its own. Its owner feeds it the
//! current document and title candidates as page events arrive and asks it
//! to expire watches when the next deadline passes.

use crate::config::RecorderConfig;
use crate::extractor::first_match;
use crate::logging::Logger;
use crate::selectors;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use turnlog::Document;

/// Handle to an armed watch. Cancelling disarms it without firing.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    finished: Arc<AtomicBool>,
}

impl WatchHandle {
    fn new() -> Self {
        Self {
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.finish();
    }

    /// False once the watch fired, timed out or was cancelled.
    pub fn is_active(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }
}

/// The title watch for `generation` saw a title that belongs to its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    pub generation: u64,
    pub title: String,
}

/// A watch that hit its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expired {
    Sidebar,
    Title { generation: u64 },
}

type SidebarCallback = Box<dyn FnOnce() + Send>;

struct SidebarWatch {
    deadline: Instant,
    callback: SidebarCallback,
    handle: WatchHandle,
}

struct TitleWatch {
    generation: u64,
    expected: String,
    deadline: Instant,
    last_candidate: Option<String>,
}

/// Lowercased, whitespace-collapsed first `max_chars` characters of `text`.
/// Also reports whether the text ended in an ellipsis.
fn normalize_prefix(text: &str, max_chars: usize) -> (String, bool) {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = collapsed.trim_end_matches(['…', '.']).trim_end();
    let ellipsized = stripped.len() < collapsed.len()
        && (collapsed.ends_with('…') || collapsed.ends_with("..."));
    let prefix: String = stripped.to_lowercase().chars().take(max_chars).collect();
    (prefix.trim_end().to_string(), ellipsized)
}

/// Whether `title` is the page's rendering of `prompt`: their normalized
/// prefixes are equal, or the title was cut short with an ellipsis and the
/// prompt starts with what remains. A cut title must keep at least half of
/// the compared prefix.
pub fn title_matches_prompt(title: &str, prompt: &str, prefix_chars: usize) -> bool {
    let (prompt_prefix, _) = normalize_prefix(prompt, prefix_chars);
    let (title_prefix, ellipsized) = normalize_prefix(title, prefix_chars);
    if prompt_prefix.is_empty() || title_prefix.is_empty() {
        return false;
    }
    if title_prefix == prompt_prefix {
        return true;
    }
    let min_cut_chars = (prefix_chars / 2).max(1);
    ellipsized
        && title_prefix.chars().count() >= min_cut_chars
        && prompt_prefix.starts_with(&title_prefix)
}

pub struct DomObserver {
    logger: Logger,
    sidebar_timeout: Duration,
    title_timeout: Duration,
    prefix_chars: usize,
    sidebar: Option<SidebarWatch>,
    title: Option<TitleWatch>,
}

impl DomObserver {
    pub fn new(logger: Logger, config: &RecorderConfig) -> Self {
        Self {
            logger,
            sidebar_timeout: config.sidebar_timeout(),
            title_timeout: config.title_timeout(),
            prefix_chars: config.title_match_prefix_chars,
            sidebar: None,
            title: None,
        }
    }

    /// Call `callback` once the sidebar is present: right away if it already
    /// is, else on the first [`DomObserver::check_sidebar`] that finds it
    /// before the sidebar timeout. Replaces any earlier sidebar watch.
    pub fn watch_for_sidebar(
        &mut self,
        doc: &Document,
        now: Instant,
        callback: impl FnOnce() + Send + 'static,
    ) -> WatchHandle {
        if let Some(previous) = self.sidebar.take() {
            previous.handle.cancel();
        }

        let handle = WatchHandle::new();
        if first_match(doc, selectors::SIDEBAR).is_some() {
            self.logger.debug("Sidebar already present");
            handle.finish();
            callback();
            return handle;
        }

        self.sidebar = Some(SidebarWatch {
            deadline: now + self.sidebar_timeout,
            callback: Box::new(callback),
            handle: handle.clone(),
        });
        self.logger.debug("Waiting for sidebar");
        handle
    }

    /// Fire the sidebar watch if the sidebar has appeared.
    pub fn check_sidebar(&mut self, doc: &Document) {
        let Some(watch) = self.sidebar.take() else {
            return;
        };
        if !watch.handle.is_active() {
            self.logger.debug("Sidebar watch was cancelled");
            return;
        }
        if first_match(doc, selectors::SIDEBAR).is_some() {
            self.logger.info("Sidebar found");
            watch.handle.finish();
            (watch.callback)();
        } else {
            self.sidebar = Some(watch);
        }
    }

    pub fn is_watching_sidebar(&self) -> bool {
        self.sidebar
            .as_ref()
            .is_some_and(|watch| watch.handle.is_active())
    }

    /// Start watching titles for the turn `generation`, replacing any watch
    /// for an older turn. A title matches when it renders `expected`.
    pub fn arm_title_watch(&mut self, generation: u64, expected: &str, now: Instant) {
        if let Some(previous) = &self.title {
            self.logger.debug(format_args!(
                "Title watch for turn {} replaced by turn {}",
                previous.generation, generation
            ));
        }
        self.title = Some(TitleWatch {
            generation,
            expected: expected.to_string(),
            deadline: now + self.title_timeout,
            last_candidate: None,
        });
    }

    pub fn disarm_title_watch(&mut self) {
        if let Some(watch) = self.title.take() {
            self.logger
                .debug(format_args!("Title watch for turn {} disarmed", watch.generation));
        }
    }

    pub fn title_watch_generation(&self) -> Option<u64> {
        self.title.as_ref().map(|watch| watch.generation)
    }

    /// Offer a title seen on the page. A title that matches the expected
    /// text disarms the watch and is returned; anything else leaves the
    /// watch armed.
    pub fn on_title_candidate(&mut self, title: &str) -> Option<TitleMatch> {
        let watch = self.title.as_mut()?;
        let title = title.trim();
        if title.is_empty() || watch.last_candidate.as_deref() == Some(title) {
            return None;
        }
        watch.last_candidate = Some(title.to_string());

        if !title_matches_prompt(title, &watch.expected, self.prefix_chars) {
            self.logger.debug(format_args!(
                "Ignoring unrelated title {:?} for turn {}",
                title, watch.generation
            ));
            return None;
        }

        let generation = watch.generation;
        self.title = None;
        self.logger
            .info(format_args!("Title for turn {generation}: {title:?}"));
        Some(TitleMatch {
            generation,
            title: title.to_string(),
        })
    }

    /// Disarm every watch whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();

        if self.sidebar.as_ref().is_some_and(|w| !w.handle.is_active()) {
            self.sidebar = None;
        }
        if self.sidebar.as_ref().is_some_and(|w| w.deadline <= now) {
            if let Some(watch) = self.sidebar.take() {
                watch.handle.finish();
            }
            self.logger.info("Sidebar did not appear before timeout");
            expired.push(Expired::Sidebar);
        }

        if self.title.as_ref().is_some_and(|w| w.deadline <= now) {
            if let Some(watch) = self.title.take() {
                self.logger.warn(format_args!(
                    "No title for turn {} before timeout",
                    watch.generation
                ));
                expired.push(Expired::Title {
                    generation: watch.generation,
                });
            }
        }
        expired
    }

    /// Earliest deadline among armed watches.
    pub fn next_deadline(&self) -> Option<Instant> {
        let sidebar = self
            .sidebar
            .as_ref()
            .filter(|w| w.handle.is_active())
            .map(|w| w.deadline);
        let title = self.title.as_ref().map(|w| w.deadline);
        match (sidebar, title) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
