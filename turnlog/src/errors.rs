use thiserror::Error;

/// Failures from page queries and page event delivery.
#[derive(Error, Debug)]
pub enum DomError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is detached from the document: {0}")]
    ElementDetached(String),

    #[error("Page event channel closed")]
    ChannelClosed,
}
