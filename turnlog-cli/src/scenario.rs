//! Scripted page sessions replayed against a live content script.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, info};
use turnlog::{Document, Page};
use turnlog_recorder::{
    ContentScript, HistoryRecord, HistoryStore, Message, RecorderConfig, Response, SettingsStore,
};

/// Initial page state plus the steps to drive it through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub document: Document,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Navigate {
        url: String,
    },
    SetTitle {
        title: String,
    },
    SetDocument {
        document: Document,
    },
    Click {
        selector: String,
    },
    Key {
        key: String,
        #[serde(default)]
        shift: bool,
        /// Selector of the element holding focus.
        #[serde(default)]
        focus: Option<String>,
    },
    Message {
        message: Message,
    },
    WaitMs {
        ms: u64,
    },
    SetSetting {
        key: String,
        value: String,
    },
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid scenario {}", path.display()))
    }
}

/// What a replay produced.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub records: Vec<HistoryRecord>,
    /// Answers to `message` steps, in step order.
    pub responses: Vec<Response>,
}

/// Run `scenario` to completion. The page is closed after the last step,
/// so turns still waiting for a title are not recorded.
pub async fn replay(
    scenario: Scenario,
    config: RecorderConfig,
    settings: Arc<dyn SettingsStore>,
    history: Arc<dyn HistoryStore>,
) -> Result<ReplayReport> {
    let Scenario {
        url,
        title,
        document,
        steps,
    } = scenario;

    let page = Page::new(url, title, document);
    let script = ContentScript::new(&page, config, settings.clone(), history)
        .context("Failed to attach content script")?;
    let messenger = script.messenger();
    let collector = tokio::spawn(script.record_stream().collect::<Vec<_>>());
    let task = script.spawn();

    info!("Replaying {} steps", steps.len());
    let mut responses = Vec::new();
    for (index, step) in steps.into_iter().enumerate() {
        debug!(step = index, "{:?}", step);
        match step {
            Step::Navigate { url } => page.navigate(url),
            Step::SetTitle { title } => page.set_title(title),
            Step::SetDocument { document } => page.set_document(document),
            Step::Click { selector } => {
                page.click(selector.as_str())
                    .with_context(|| format!("Step {index}: click {selector}"))?;
            }
            Step::Key { key, shift, focus } => {
                page.press_key(key.as_str(), shift, focus.as_deref())
                    .with_context(|| format!("Step {index}: key {key}"))?;
            }
            Step::Message { message } => {
                let response = messenger
                    .send(message)
                    .await
                    .with_context(|| format!("Step {index}: message"))?;
                responses.push(response);
            }
            Step::WaitMs { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::SetSetting { key, value } => {
                settings
                    .set(&key, &value)
                    .with_context(|| format!("Step {index}: set {key}"))?;
            }
        }
        tokio::task::yield_now().await;
    }

    drop(page);
    task.await.context("Content script panicked")?;
    let records = collector.await.context("Record collector panicked")?;
    info!("Replay finished with {} records", records.len());

    Ok(ReplayReport { records, responses })
}
