//! Conversation capture for the Gemini web app
//!
//! Watches a [`turnlog::Page`] for prompt submissions, snapshots the prompt,
//! attachments, account, model and Gem at send time, and records a
//! [`HistoryRecord`] once the page shows the turn's title.
//!
//! [`ContentScript`] wires the pieces together and runs them on one loop.

pub mod config;
pub mod content;
pub mod error;
pub mod extractor;
pub mod gem;
pub mod handlers;
pub mod history;
pub mod logging;
pub mod messaging;
pub mod observer;
pub mod selectors;
pub mod settings;
pub mod utils;

pub use config::RecorderConfig;
pub use content::{ContentScript, MessageRequest, Messenger};
pub use error::{RecorderError, Result};
pub use extractor::{AccountInfo, InputExtractor, MaskedPrompt};
pub use gem::{GemDetector, GemInfo};
pub use handlers::{EventHandlers, PendingTurn, SendTrigger, TurnState};
pub use history::{HistoryRecord, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
pub use logging::{Component, LogConfig, LogConfigCache, LogLevel, Logger, LOG_CONFIG_KEY};
pub use messaging::{Message, PageInfo, Response};
pub use observer::{DomObserver, Expired, TitleMatch, WatchHandle};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, SettingsChange, SettingsStore};
