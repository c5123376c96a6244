use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_stream::StreamExt;
use turnlog::{Document, Node, Page};
use turnlog_recorder::{
    ContentScript, HistoryRecord, HistoryStore, Message, MemoryHistoryStore, MemorySettingsStore,
    PageInfo, RecorderConfig, Response, SettingsStore, LOG_CONFIG_KEY,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

const NEW_CHAT: &str = "https://gemini.google.com/app";
const CONVERSATION: &str = "https://gemini.google.com/app/5f2a9c";

fn chat_document(prompt: &[&str], files: &[&str], sidebar: bool) -> Document {
    let mut body = Node::element("body")
        .child(
            Node::element("a")
                .attr("href", "https://accounts.google.com/SignOutOptions")
                .attr("aria-label", "Google Account: Jane Doe (jane@example.com)"),
        )
        .child(
            Node::element("bard-mode-switcher").child(
                Node::element("div")
                    .attr("data-test-id", "logo-pill-label-container")
                    .child(Node::element("span").with_text("2.5 Flash")),
            ),
        )
        .with_children(files.iter().map(|name| {
            Node::element("uploader-file-preview")
                .attr("title", *name)
                .with_text("file")
        }))
        .child(
            Node::element("rich-textarea").child(
                Node::element("div")
                    .class("ql-editor")
                    .attr("contenteditable", "true")
                    .with_children(prompt.iter().map(|line| Node::element("p").with_text(*line))),
            ),
        )
        .child(
            Node::element("button")
                .class("send-button")
                .child(Node::element("mat-icon").with_text("send")),
        );
    if sidebar {
        body = body.child(Node::element("side-navigation-v2"));
    }
    Document::new(Node::element("html").child(body))
}

struct Harness {
    page: Page,
    settings: Arc<MemorySettingsStore>,
    history: Arc<MemoryHistoryStore>,
    script: Option<ContentScript>,
}

impl Harness {
    fn new(url: &str, document: Document) -> Self {
        init_tracing();
        let page = Page::new(url, "Gemini", document);
        let settings = Arc::new(MemorySettingsStore::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let script = ContentScript::new(
            &page,
            RecorderConfig::default(),
            settings.clone(),
            history.clone(),
        )
        .expect("content script");
        Self {
            page,
            settings,
            history,
            script: Some(script),
        }
    }

    fn script(&self) -> &ContentScript {
        self.script.as_ref().expect("not started yet")
    }

    fn start(&mut self) -> tokio::task::JoinHandle<()> {
        self.script.take().expect("started twice").spawn()
    }

    /// The app's own reaction to a send: clear the editor.
    fn clear_editor(&self) {
        self.page.mutate(|doc| {
            let path = doc
                .query_selector(".ql-editor")
                .map(|el| el.path().clone())
                .expect("editor");
            if let Some(editor) = doc.node_mut(&path) {
                editor.set_text_content("");
            }
        });
    }

    fn send(&self, prompt: &[&str]) {
        self.page.set_document(chat_document(prompt, &[], true));
        self.page.click("button.send-button mat-icon").expect("click");
        self.clear_editor();
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn next_record(
    stream: &mut (impl tokio_stream::Stream<Item = HistoryRecord> + Unpin),
) -> HistoryRecord {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("record in time")
        .expect("stream open")
}

#[tokio::test(start_paused = true)]
async fn test_new_chat_turn_is_recorded() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let mut records = h.script().record_stream();
    let mut ready = h.script().ready();
    let _task = h.start();
    ready.wait_for(|ready| *ready).await.expect("ready");

    h.page.set_document(chat_document(
        &["Why is this loop so slow in Python?", "```python", "for i in range(10**9): pass", "```"],
        &["profile.txt"],
        true,
    ));
    h.page.click("button.send-button").expect("click");
    h.clear_editor();
    h.page.navigate(CONVERSATION);
    h.page.set_title("Why is this loop so slow in Python?");

    let record = next_record(&mut records).await;
    assert_eq!(record.prompt, "Why is this loop so slow in Python?\n[codeblock-1]");
    assert_eq!(record.title, "Why is this loop so slow in Python?");
    assert_eq!(record.url, CONVERSATION);
    assert_eq!(record.attached_files, vec!["profile.txt".to_string()]);
    assert_eq!(record.account_name, "Jane Doe");
    assert_eq!(record.account_email, "jane@example.com");
    assert_eq!(record.model_name, "2.5 Flash");
    assert!(record.is_new_chat);
    assert_eq!(h.history.all().unwrap(), vec![record]);
}

#[tokio::test(start_paused = true)]
async fn test_second_send_discards_first_turn() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let mut records = h.script().record_stream();
    let _task = h.start();

    h.send(&["First attempt at a question"]);
    h.send(&["Second attempt at a question"]);
    h.page.set_title("First attempt at a question");
    settle().await;
    assert!(h.history.is_empty());

    h.page.set_title("Second attempt at a question");
    let record = next_record(&mut records).await;
    assert_eq!(record.prompt, "Second attempt at a question");
    assert_eq!(h.history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_title_does_not_finalize() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let mut records = h.script().record_stream();
    let _task = h.start();

    h.send(&["Draft a cover letter"]);
    h.page.set_title("(1) New notification");
    settle().await;
    assert!(h.history.is_empty());

    h.page.set_title("Draft a cover letter");
    assert_eq!(next_record(&mut records).await.title, "Draft a cover letter");
}

#[tokio::test(start_paused = true)]
async fn test_title_after_timeout_is_ignored() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let _task = h.start();

    h.send(&["Slow answer please"]);
    settle().await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    h.page.set_title("Slow answer please");
    settle().await;
    assert!(h.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_page_info_and_cache_invalidation() {
    let gem_url = "https://gemini.google.com/gem/coding-partner";
    let mut h = Harness::new(gem_url, chat_document(&[], &[], false));
    let messenger = h.script().messenger();
    let log_config = h.script().log_config();
    let _task = h.start();

    let response = messenger.send(Message::GetPageInfo).await.unwrap();
    match response {
        Response::PageInfo(PageInfo {
            url,
            is_gemini_chat,
            is_gem,
            gem_info,
        }) => {
            assert_eq!(url, gem_url);
            assert!(is_gemini_chat);
            assert!(is_gem);
            assert_eq!(gem_info.map(|gem| gem.id).as_deref(), Some("coding-partner"));
        }
        other => panic!("Expected page info, got {other:?}"),
    }

    log_config.get();
    h.settings
        .set(LOG_CONFIG_KEY, r#"{"levels":{"debug":false}}"#)
        .unwrap();
    assert!(log_config.get().levels.debug, "stale until invalidated");

    let response = messenger
        .send(Message::InvalidateLogConfigCache)
        .await
        .unwrap();
    assert_eq!(response, Response::ok());
    assert!(!log_config.get().levels.debug);
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_invalidates_log_config() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let log_config = h.script().log_config();
    let _task = h.start();

    assert!(log_config.get().enabled);
    h.settings
        .set(LOG_CONFIG_KEY, r#"{"enabled":false}"#)
        .unwrap();
    settle().await;
    assert!(!log_config.get().enabled);
}

#[tokio::test(start_paused = true)]
async fn test_ready_waits_for_sidebar() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], false));
    let ready = h.script().ready();
    let _task = h.start();

    settle().await;
    assert!(!*ready.borrow());
    h.page.set_document(chat_document(&[], &[], true));
    settle().await;
    assert!(*ready.borrow());
}

#[tokio::test(start_paused = true)]
async fn test_script_stops_when_page_is_gone() {
    let mut h = Harness::new(NEW_CHAT, chat_document(&[], &[], true));
    let mut records = h.script().record_stream();
    let task = h.start();

    drop(h);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stops in time")
        .expect("no panic");
    assert!(records.next().await.is_none());
}
