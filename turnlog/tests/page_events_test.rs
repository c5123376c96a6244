use std::sync::Once;
use turnlog::{Document, DomError, Node, NodePath, Page, PageEvent};

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

fn chat_page() -> Page {
    let document = Document::new(
        Node::element("html").child(
            Node::element("body")
                .child(Node::element("div").class("ql-editor").with_text("hello"))
                .child(
                    Node::element("button")
                        .class("send-button")
                        .child(Node::element("mat-icon").with_text("send")),
                ),
        ),
    );
    Page::new("https://gemini.google.com/app", "Gemini", document)
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    init_tracing();
    let page = chat_page();
    let mut sub = page.subscribe();

    let target = page.click("button.send-button mat-icon").expect("click");
    page.set_title("Greeting");
    page.mutate(|doc| {
        let path = doc
            .query_selector(".ql-editor")
            .map(|el| el.path().clone())
            .expect("editor");
        if let Some(node) = doc.node_mut(&path) {
            node.set_text_content("");
        }
    });
    page.navigate("https://gemini.google.com/app/abc123");

    assert_eq!(sub.recv().await.unwrap().event, PageEvent::Click { target });
    assert_eq!(
        sub.recv().await.unwrap().event,
        PageEvent::TitleChanged {
            title: "Greeting".to_string()
        }
    );
    assert_eq!(sub.recv().await.unwrap().event, PageEvent::DomMutated);
    assert_eq!(
        sub.recv().await.unwrap().event,
        PageEvent::Navigated {
            url: "https://gemini.google.com/app/abc123".to_string()
        }
    );
    assert!(sub.try_recv().is_none());

    assert_eq!(page.url(), "https://gemini.google.com/app/abc123");
    assert_eq!(
        page.with_document(|doc| doc.query_selector(".ql-editor").map(|e| e.inner_text())),
        Some(String::new())
    );
}

#[tokio::test]
async fn test_unchanged_title_is_not_emitted() {
    let page = chat_page();
    let mut sub = page.subscribe();
    page.set_title("Gemini");
    assert!(sub.try_recv().is_none());
    assert_eq!(page.title(), "Gemini");
}

#[tokio::test]
async fn test_subscription_only_sees_later_events() {
    let page = chat_page();
    page.set_title("before");
    let mut sub = page.subscribe();
    page.set_title("after");
    assert_eq!(
        sub.recv().await.unwrap().event,
        PageEvent::TitleChanged {
            title: "after".to_string()
        }
    );
}

#[test]
fn test_click_errors() {
    let page = chat_page();
    assert!(matches!(
        page.click("button.missing"),
        Err(DomError::ElementNotFound(_))
    ));
    assert!(matches!(
        page.click("button["),
        Err(DomError::InvalidSelector(_))
    ));
    assert!(matches!(
        page.click_path(NodePath::from(vec![0, 7])),
        Err(DomError::ElementDetached(_))
    ));
}

#[test]
fn test_key_press_targets_focus() {
    let page = chat_page();
    let mut sub = page.subscribe();
    page.press_key("Enter", false, Some(".ql-editor"))
        .expect("press");
    match sub.try_recv().map(|update| update.event) {
        Some(PageEvent::KeyDown { key, shift, target }) => {
            assert_eq!(key, "Enter");
            assert!(!shift);
            assert_eq!(target, Some(NodePath::from(vec![0, 0])));
        }
        other => panic!("Expected KeyDown, got {other:?}"),
    }
}

#[test]
fn test_page_event_wire_format() {
    let event = PageEvent::KeyDown {
        key: "Enter".to_string(),
        shift: true,
        target: None,
    };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["type"], "key_down");
    assert_eq!(json["shift"], true);
    assert!(json.get("target").is_none());

    let parsed: PageEvent =
        serde_json::from_str(r#"{"type":"click","target":[0,1]}"#).expect("parse");
    assert_eq!(
        parsed,
        PageEvent::Click {
            target: NodePath::from(vec![0, 1])
        }
    );
}

#[tokio::test]
async fn test_dropped_page_closes_subscription() {
    let page = chat_page();
    let mut sub = page.subscribe();
    drop(page);
    assert!(matches!(sub.recv().await, Err(DomError::ChannelClosed)));
}

#[tokio::test]
async fn test_snapshot_is_taken_at_emit_time() {
    let page = chat_page();
    let mut sub = page.subscribe();

    page.click("button.send-button").expect("click");
    page.mutate(|doc| {
        let path = doc
            .query_selector(".ql-editor")
            .map(|el| el.path().clone())
            .expect("editor");
        if let Some(node) = doc.node_mut(&path) {
            node.set_text_content("");
        }
    });
    page.navigate("https://gemini.google.com/app/abc123");

    let click = sub.recv().await.unwrap();
    assert!(matches!(click.event, PageEvent::Click { .. }));
    assert_eq!(click.snapshot.url, "https://gemini.google.com/app");
    assert_eq!(
        click
            .snapshot
            .document
            .query_selector(".ql-editor")
            .map(|e| e.inner_text()),
        Some("hello".to_string())
    );

    let mutated = sub.recv().await.unwrap();
    assert_eq!(
        mutated
            .snapshot
            .document
            .query_selector(".ql-editor")
            .map(|e| e.inner_text()),
        Some(String::new())
    );
    assert_eq!(
        sub.recv().await.unwrap().snapshot.url,
        "https://gemini.google.com/app/abc123"
    );
}
