//! The content script: one loop that owns the capture pipeline.
//!
//! Page updates, cross-context messages, settings changes and watch
//! deadlines are handled one at a time, in arrival order. A click is fully
//! processed, pending snapshot included, before any later mutation is seen.

use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::handlers::EventHandlers;
use crate::history::{HistoryRecord, HistoryStore};
use crate::logging::{Component, LogConfigCache, Logger, LOG_CONFIG_KEY};
use crate::messaging::{Message, PageInfo, Response};
use crate::settings::SettingsStore;
use crate::utils::ChatUrl;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_stream::Stream;
use turnlog::{Page, PageEvent, PageSnapshot, PageSubscription, PageUpdate};

const MESSAGE_BUFFER: usize = 32;
const RECORD_BUFFER: usize = 100;

/// A message plus the channel its answer goes back on.
pub struct MessageRequest {
    pub message: Message,
    pub reply: oneshot::Sender<Response>,
}

/// Sends messages to a running [`ContentScript`].
#[derive(Clone)]
pub struct Messenger {
    tx: mpsc::Sender<MessageRequest>,
}

impl Messenger {
    pub async fn send(&self, message: Message) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(MessageRequest { message, reply })
            .await
            .map_err(|_| RecorderError::ChannelClosed("content script stopped".to_string()))?;
        response.await.map_err(|_| {
            RecorderError::ChannelClosed("content script dropped the request".to_string())
        })
    }
}

struct ScriptCore {
    handlers: EventHandlers,
    log_config: Arc<LogConfigCache>,
    logger: Logger,
    records: broadcast::Sender<HistoryRecord>,
}

pub struct ContentScript {
    core: ScriptCore,
    settings: Arc<dyn SettingsStore>,
    events: PageSubscription,
    initial: PageSnapshot,
    messages_tx: mpsc::Sender<MessageRequest>,
    messages_rx: mpsc::Receiver<MessageRequest>,
    ready: watch::Sender<bool>,
}

impl ContentScript {
    /// Attach to `page`. Events are buffered from this call on, so nothing
    /// is missed between construction and [`ContentScript::run`].
    pub fn new(
        page: &Page,
        config: RecorderConfig,
        settings: Arc<dyn SettingsStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        config.validate()?;

        let events = page.subscribe();
        let initial = page.snapshot();
        let log_config = Arc::new(LogConfigCache::new(settings.clone()));
        let handlers = EventHandlers::new(config, log_config.clone(), history, initial.url.clone());
        let (records, _) = broadcast::channel(RECORD_BUFFER);
        let (messages_tx, messages_rx) = mpsc::channel(MESSAGE_BUFFER);
        let (ready, _) = watch::channel(false);

        Ok(Self {
            core: ScriptCore {
                handlers,
                logger: Logger::new(Component::Main, log_config.clone()),
                log_config,
                records,
            },
            settings,
            events,
            initial,
            messages_tx,
            messages_rx,
            ready,
        })
    }

    pub fn messenger(&self) -> Messenger {
        Messenger {
            tx: self.messages_tx.clone(),
        }
    }

    pub fn log_config(&self) -> Arc<LogConfigCache> {
        self.core.log_config.clone()
    }

    /// Becomes `true` once the page's sidebar has been seen.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Records as they are captured. Ends when the script stops.
    pub fn record_stream(&self) -> impl Stream<Item = HistoryRecord> {
        let mut rx = self.core.records.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(record) => yield record,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Record stream lagged, skipped {} records", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process page updates until every handle to the page is dropped.
    pub async fn run(self) {
        let ContentScript {
            mut core,
            settings,
            mut events,
            initial,
            messages_tx,
            mut messages_rx,
            ready,
        } = self;
        drop(messages_tx);

        let mut settings_rx = settings.subscribe();
        let mut settings_open = true;

        core.logger
            .info(format_args!("Content script started on {}", initial.url));
        core.handlers.start(&initial, Instant::now(), move || {
            let _ = ready.send(true);
        });

        loop {
            let deadline = core.handlers.next_deadline();
            let wait_for_deadline = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                update = events.recv() => match update {
                    Ok(update) => core.dispatch(update),
                    Err(_) => {
                        core.logger.info("Page closed, content script stopping");
                        break;
                    }
                },
                Some(request) = messages_rx.recv() => core.answer(request),
                change = settings_rx.recv(), if settings_open => match change {
                    Ok(change) if change.key == LOG_CONFIG_KEY => {
                        core.log_config.invalidate();
                        core.logger.debug("Log config changed, cache invalidated");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => core.log_config.invalidate(),
                    Err(broadcast::error::RecvError::Closed) => settings_open = false,
                },
                _ = wait_for_deadline => core.handlers.handle_timeout(Instant::now()),
            }
        }
    }
}

impl ScriptCore {
    fn dispatch(&mut self, update: PageUpdate) {
        let now = Instant::now();
        self.handlers.handle_timeout(now);

        let snapshot = &update.snapshot;
        let record = match &update.event {
            PageEvent::Navigated { .. } => {
                self.handlers.handle_navigation(snapshot);
                None
            }
            PageEvent::TitleChanged { .. } => self.handlers.handle_title_changed(snapshot, now),
            PageEvent::DomMutated => self.handlers.handle_dom_mutated(snapshot, now),
            PageEvent::Click { target } => {
                self.handlers.handle_click(snapshot, target, now);
                None
            }
            PageEvent::KeyDown { key, shift, target } => {
                self.handlers
                    .handle_key_down(snapshot, key, *shift, target.as_ref(), now);
                None
            }
        };

        if let Some(record) = record {
            // Nobody streaming records is fine; the store already has it.
            let _ = self.records.send(record);
        }
    }

    fn page_info(&self) -> PageInfo {
        let url = self.handlers.current_url().to_string();
        let chat = ChatUrl::parse(&url);
        PageInfo {
            is_gemini_chat: chat.is_chat(),
            is_gem: chat.is_gem(),
            gem_info: self.handlers.current_gem_info().cloned(),
            url,
        }
    }

    fn answer(&mut self, request: MessageRequest) {
        self.logger
            .debug(format_args!("Message received: {:?}", request.message));
        let response = match request.message {
            Message::GetPageInfo => Response::PageInfo(self.page_info()),
            Message::InvalidateLogConfigCache => {
                self.log_config.invalidate();
                Response::ok()
            }
        };
        if request.reply.send(response).is_err() {
            self.logger.debug("Requester went away before the reply");
        }
    }
}
