use crate::element::{Document, NodePath};
use crate::errors::DomError;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 256;

/// Something that happened on the page, in the order the page saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    /// Same-document navigation (history API) or a full load.
    Navigated { url: String },
    /// `document.title` changed.
    TitleChanged { title: String },
    /// Any change to the element tree.
    DomMutated,
    /// A click, delivered with the deepest target element.
    Click { target: NodePath },
    /// A key press, with the focused element if any.
    KeyDown {
        key: String,
        #[serde(default)]
        shift: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<NodePath>,
    },
}

struct PageState {
    url: String,
    title: String,
    document: Arc<Document>,
}

impl PageState {
    fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            url: self.url.clone(),
            title: self.title.clone(),
            document: self.document.clone(),
        }
    }
}

/// The page as it was right after an event. Later changes to the page do
/// not affect a snapshot already taken.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub document: Arc<Document>,
}

/// An event together with the page state it produced.
#[derive(Debug, Clone)]
pub struct PageUpdate {
    pub event: PageEvent,
    pub snapshot: PageSnapshot,
}

/// A live page: current URL, tab title and element tree, plus an ordered
/// stream of [`PageUpdate`]s for subscribers.
///
/// Cloning yields another handle to the same page.
#[derive(Clone)]
pub struct Page {
    state: Arc<Mutex<PageState>>,
    events: broadcast::Sender<PageUpdate>,
}

impl Page {
    pub fn new(url: impl Into<String>, title: impl Into<String>, document: Document) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(PageState {
                url: url.into(),
                title: title.into(),
                document: Arc::new(document),
            })),
            events,
        }
    }

    pub fn blank() -> Self {
        Self::new("about:blank", "", Document::default())
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Called with the state lock held so updates leave in the order the
    // state changed.
    fn emit(&self, state: &PageState, event: PageEvent) {
        debug!(?event, "page event");
        // No subscribers is fine: nobody is listening yet.
        let _ = self.events.send(PageUpdate {
            event,
            snapshot: state.snapshot(),
        });
    }

    /// Subscribe to events emitted after this call. Dropping the
    /// subscription cancels it.
    pub fn subscribe(&self) -> PageSubscription {
        PageSubscription {
            rx: self.events.subscribe(),
        }
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn title(&self) -> String {
        self.state().title.clone()
    }

    pub fn snapshot(&self) -> PageSnapshot {
        self.state().snapshot()
    }

    /// Clone of the current element tree.
    pub fn document(&self) -> Document {
        Document::clone(&self.state().document)
    }

    /// Run `f` against the current element tree without cloning it.
    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.state().document)
    }

    pub fn navigate(&self, url: impl Into<String>) {
        let url = url.into();
        let mut state = self.state();
        state.url = url.clone();
        self.emit(&state, PageEvent::Navigated { url });
    }

    /// Set the tab title. Emits only when the title actually changes.
    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        let mut state = self.state();
        if state.title == title {
            return;
        }
        state.title = title.clone();
        self.emit(&state, PageEvent::TitleChanged { title });
    }

    /// Mutate the element tree in place and notify subscribers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut state = self.state();
        let result = f(Arc::make_mut(&mut state.document));
        self.emit(&state, PageEvent::DomMutated);
        result
    }

    pub fn set_document(&self, document: Document) {
        let mut state = self.state();
        state.document = Arc::new(document);
        self.emit(&state, PageEvent::DomMutated);
    }

    /// Click the first element matching `selector`.
    pub fn click(&self, selector: impl Into<Selector>) -> Result<NodePath, DomError> {
        let selector = selector.into();
        if let Selector::Invalid(reason) = &selector {
            return Err(DomError::InvalidSelector(reason.clone()));
        }
        let state = self.state();
        let target = state
            .document
            .query_selector(&selector)
            .map(|el| el.path().clone())
            .ok_or_else(|| DomError::ElementNotFound(selector.to_string()))?;
        self.emit(
            &state,
            PageEvent::Click {
                target: target.clone(),
            },
        );
        Ok(target)
    }

    pub fn click_path(&self, target: NodePath) -> Result<(), DomError> {
        let state = self.state();
        if state.document.node(&target).is_none() {
            return Err(DomError::ElementDetached(target.to_string()));
        }
        self.emit(&state, PageEvent::Click { target });
        Ok(())
    }

    /// Press a key, optionally with focus on the first element matching `focus`.
    pub fn press_key(
        &self,
        key: impl Into<String>,
        shift: bool,
        focus: Option<&str>,
    ) -> Result<(), DomError> {
        let state = self.state();
        let target = match focus {
            Some(selector) => Some(
                state
                    .document
                    .query_selector(selector)
                    .map(|el| el.path().clone())
                    .ok_or_else(|| DomError::ElementNotFound(selector.to_string()))?,
            ),
            None => None,
        };
        self.emit(
            &state,
            PageEvent::KeyDown {
                key: key.into(),
                shift,
                target,
            },
        );
        Ok(())
    }
}

/// Cancellable subscription to a [`Page`]'s events.
pub struct PageSubscription {
    rx: broadcast::Receiver<PageUpdate>,
}

impl PageSubscription {
    /// Next event. Lagging subscribers skip what they missed and keep going;
    /// an error means the page is gone.
    pub async fn recv(&mut self) -> Result<PageUpdate, DomError> {
        loop {
            match self.rx.recv().await {
                Ok(update) => return Ok(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Page subscription lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(DomError::ChannelClosed),
            }
        }
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<PageUpdate> {
        loop {
            match self.rx.try_recv() {
                Ok(update) => return Some(update),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Page subscription lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn cancel(self) {
        drop(self);
    }
}
