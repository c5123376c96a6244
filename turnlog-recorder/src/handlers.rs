//! Turn capture state machine.
//!
//! `Idle -> Pending` on a send action; `Pending -> Idle` when a matching
//! title finalizes the turn into a [`HistoryRecord`], or when a timeout, a
//! newer send or navigation away drops it.

use crate::config::RecorderConfig;
use crate::extractor::InputExtractor;
use crate::gem::{GemDetector, GemInfo};
use crate::history::{HistoryRecord, HistoryStore};
use crate::logging::{Component, LogConfigCache, Logger};
use crate::observer::{DomObserver, Expired, WatchHandle};
use crate::selectors;
use crate::utils::{now_timestamp, ChatUrl};
use std::sync::Arc;
use tokio::time::Instant;
use turnlog::{Document, ElementRef, NodePath, PageSnapshot, Selector};

/// Everything captured at send time, waiting for the turn's title.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub generation: u64,
    pub is_new_chat_pending: bool,
    /// The chat the turn belongs to. Moves once, from a new chat to the
    /// conversation created for it.
    pub url: String,
    pub model_name: String,
    pub prompt: String,
    pub original_prompt: String,
    pub attached_files: Vec<String>,
    pub account_name: String,
    pub account_email: String,
    pub gemini_plan: Option<String>,
    pub gem: Option<GemInfo>,
    pub armed_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Pending { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTrigger {
    Button,
    EnterKey,
}

pub struct EventHandlers {
    config: RecorderConfig,
    logger: Logger,
    extractor: InputExtractor,
    gems: GemDetector,
    observer: DomObserver,
    history: Arc<dyn HistoryStore>,
    send_control: Selector,
    prompt_editor: Selector,
    pending: Option<PendingTurn>,
    generation: u64,
    current_url: String,
}

impl EventHandlers {
    pub fn new(
        config: RecorderConfig,
        log_config: Arc<LogConfigCache>,
        history: Arc<dyn HistoryStore>,
        initial_url: impl Into<String>,
    ) -> Self {
        let logger_for = |component| Logger::new(component, log_config.clone());
        Self {
            logger: logger_for(Component::EventHandlers),
            extractor: InputExtractor::new(logger_for(Component::InputExtractor), &config),
            gems: GemDetector::new(logger_for(Component::GemDetector)),
            observer: DomObserver::new(logger_for(Component::DomObserver), &config),
            history,
            send_control: Selector::from(selectors::SEND_BUTTON.join(", ")),
            prompt_editor: Selector::from(selectors::PROMPT_EDITOR.join(", ")),
            pending: None,
            generation: 0,
            current_url: initial_url.into(),
            config,
        }
    }

    pub fn state(&self) -> TurnState {
        match &self.pending {
            Some(turn) => TurnState::Pending {
                generation: turn.generation,
            },
            None => TurnState::Idle,
        }
    }

    pub fn pending(&self) -> Option<&PendingTurn> {
        self.pending.as_ref()
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn current_gem_info(&self) -> Option<&GemInfo> {
        self.gems.current_gem_info()
    }

    pub fn extractor(&self) -> &InputExtractor {
        &self.extractor
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.observer.next_deadline()
    }

    /// Initial page state: detect the Gem and start waiting for the sidebar.
    pub fn start(
        &mut self,
        snapshot: &PageSnapshot,
        now: Instant,
        on_sidebar: impl FnOnce() + Send + 'static,
    ) -> WatchHandle {
        self.current_url = snapshot.url.clone();
        self.gems.detect(&snapshot.document, &snapshot.url);
        self.observer
            .watch_for_sidebar(&snapshot.document, now, on_sidebar)
    }

    /// The enabled send control containing `target`, if any.
    pub fn send_control_at<'a>(
        &self,
        doc: &'a Document,
        target: &NodePath,
    ) -> Option<ElementRef<'a>> {
        doc.element(target)?.closest(&self.send_control)
    }

    /// A click on an enabled send control starts a turn. Returns the new
    /// turn's generation.
    pub fn handle_click(
        &mut self,
        snapshot: &PageSnapshot,
        target: &NodePath,
        now: Instant,
    ) -> Option<u64> {
        let control = self.send_control_at(&snapshot.document, target)?;
        if control.is_disabled() {
            self.logger.debug("Send control is disabled, click ignored");
            return None;
        }
        self.begin_turn(snapshot, SendTrigger::Button, now)
    }

    pub fn handle_key_down(
        &mut self,
        snapshot: &PageSnapshot,
        key: &str,
        shift: bool,
        target: Option<&NodePath>,
        now: Instant,
    ) -> Option<u64> {
        if !self.config.capture_enter_key || key != "Enter" || shift {
            return None;
        }
        let in_editor = target
            .and_then(|path| snapshot.document.element(path))
            .and_then(|el| el.closest(&self.prompt_editor))
            .is_some();
        if !in_editor {
            return None;
        }
        self.begin_turn(snapshot, SendTrigger::EnterKey, now)
    }

    /// New chats wait for a title rendering the prompt. Sends inside an
    /// existing conversation wait for that conversation's own title and are
    /// ignored when it is not on the page.
    fn begin_turn(
        &mut self,
        snapshot: &PageSnapshot,
        trigger: SendTrigger,
        now: Instant,
    ) -> Option<u64> {
        let doc = &snapshot.document;
        let prompt = self.extractor.prompt_text(doc);
        let attached_files = self.extractor.attached_files(doc);
        if prompt.text.is_empty() && attached_files.is_empty() {
            self.logger
                .debug(format_args!("{trigger:?} send with nothing to send, ignored"));
            return None;
        }

        let chat_url = ChatUrl::parse(&snapshot.url);
        let is_new_chat_pending = !matches!(chat_url, ChatUrl::Conversation { .. });
        let original_prompt = self.extractor.original_prompt_text(doc);
        let expected_title = if is_new_chat_pending {
            original_prompt.clone()
        } else if !self.config.record_existing_conversations {
            self.logger.debug("Send inside an existing conversation ignored");
            return None;
        } else {
            let Some(title) = self.extractor.conversation_title(doc) else {
                self.logger.debug(
                    "Existing conversation shows no title to confirm the send, ignored",
                );
                return None;
            };
            title
        };

        let account = self.extractor.account_info(doc);
        let gem = self.gems.detect(doc, &snapshot.url).cloned();

        self.generation += 1;
        let generation = self.generation;
        if let Some(previous) = self.pending.take() {
            self.logger.warn(format_args!(
                "Pending turn {} overwritten by turn {} before its title arrived",
                previous.generation, generation
            ));
        }

        let turn = PendingTurn {
            generation,
            is_new_chat_pending,
            url: snapshot.url.clone(),
            model_name: self.extractor.model_name(doc),
            prompt: prompt.text,
            original_prompt,
            attached_files,
            account_name: account.name,
            account_email: account.email,
            gemini_plan: self.extractor.gemini_plan(doc),
            gem,
            armed_at: now,
        };
        self.logger.info(format_args!(
            "Turn {} captured via {:?} ({} chars, {} file(s), new chat: {})",
            generation,
            trigger,
            turn.prompt.chars().count(),
            turn.attached_files.len(),
            turn.is_new_chat_pending
        ));

        self.observer
            .arm_title_watch(generation, &expected_title, now);
        self.pending = Some(turn);
        Some(generation)
    }

    /// Offer a title seen on the page to the pending turn.
    pub fn handle_title_candidate(&mut self, title: &str, now: Instant) -> Option<HistoryRecord> {
        let matched = self.observer.on_title_candidate(title)?;
        match self.pending.take() {
            Some(turn) if turn.generation == matched.generation => {
                self.finalize(turn, matched.title, now)
            }
            other => {
                self.logger.debug(format_args!(
                    "Title for stale turn {} ignored",
                    matched.generation
                ));
                self.pending = other;
                None
            }
        }
    }

    pub fn handle_title_changed(
        &mut self,
        snapshot: &PageSnapshot,
        now: Instant,
    ) -> Option<HistoryRecord> {
        self.pending.as_ref()?;
        self.handle_title_candidate(&snapshot.title, now)
    }

    pub fn handle_dom_mutated(
        &mut self,
        snapshot: &PageSnapshot,
        now: Instant,
    ) -> Option<HistoryRecord> {
        let doc = &snapshot.document;
        self.observer.check_sidebar(doc);

        let gem_name_missing = self
            .gems
            .current_gem_info()
            .is_some_and(|gem| gem.name.is_none());
        if gem_name_missing {
            self.gems.detect(doc, &snapshot.url);
        }

        self.pending.as_ref()?;
        let title = self.extractor.conversation_title(doc)?;
        self.handle_title_candidate(&title, now)
    }

    /// Follow a URL change. A new chat moving to its first conversation URL
    /// keeps its pending turn; any other move drops it.
    pub fn handle_navigation(&mut self, snapshot: &PageSnapshot) {
        let old_url = std::mem::replace(&mut self.current_url, snapshot.url.clone());
        if old_url == snapshot.url {
            return;
        }
        self.gems.on_url_changed(&old_url, &snapshot.url);
        self.gems.detect(&snapshot.document, &snapshot.url);

        let Some(turn) = self.pending.as_mut() else {
            return;
        };
        let from = ChatUrl::parse(&turn.url);
        let to = ChatUrl::parse(&snapshot.url);
        let keeps_turn = match &to {
            ChatUrl::Conversation {
                gem_id,
                conversation_id,
            } => {
                (from.is_new_chat() && gem_id.as_deref() == from.gem_id())
                    || from.conversation_id() == Some(conversation_id.as_str())
            }
            _ => false,
        };

        if keeps_turn {
            self.logger.debug(format_args!(
                "Turn {} followed its chat to {}",
                turn.generation, snapshot.url
            ));
            turn.url = snapshot.url.clone();
        } else {
            self.logger.info(format_args!(
                "Turn {} dropped: navigated away to {}",
                turn.generation, snapshot.url
            ));
            self.pending = None;
            self.observer.disarm_title_watch();
        }
    }

    /// Expire watches whose deadline passed, dropping a timed-out turn.
    pub fn handle_timeout(&mut self, now: Instant) {
        for expired in self.observer.expire(now) {
            if let Expired::Title { generation } = expired {
                if self
                    .pending
                    .as_ref()
                    .is_some_and(|turn| turn.generation == generation)
                {
                    self.pending = None;
                    self.logger
                        .warn(format_args!("Turn {generation} dropped: no title in time"));
                }
            }
        }
    }

    fn finalize(&mut self, turn: PendingTurn, title: String, now: Instant) -> Option<HistoryRecord> {
        let record = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_timestamp(),
            title,
            url: self.current_url.clone(),
            prompt: turn.prompt,
            attached_files: turn.attached_files,
            account_name: turn.account_name,
            account_email: turn.account_email,
            model_name: turn.model_name,
            gemini_plan: turn.gemini_plan,
            gem: turn.gem,
            is_new_chat: turn.is_new_chat_pending,
        };

        if let Err(e) = self.history.append(record.clone()) {
            self.logger.error(format_args!(
                "Failed to store turn {}: {}",
                turn.generation, e
            ));
            return None;
        }
        self.logger.info(format_args!(
            "Turn {} recorded as {:?} after {:?}",
            turn.generation,
            record.title,
            now.saturating_duration_since(turn.armed_at)
        ));
        Some(record)
    }
}
