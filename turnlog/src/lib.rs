//! Page model for observing a live web page from Rust
//!
//! A [`Page`] holds the current URL, tab title and element tree of a host
//! page and publishes an ordered stream of [`PageEvent`]s (navigation, title
//! changes, DOM mutations, clicks, key presses). Elements are located with a
//! CSS-style [`Selector`] and read through borrowed [`ElementRef`] handles.

pub mod element;
pub mod errors;
pub mod page;
pub mod selector;

pub use element::{Document, ElementRef, Node, NodePath, TEXT_TAG};
pub use errors::DomError;
pub use page::{Page, PageEvent, PageSnapshot, PageSubscription, PageUpdate};
pub use selector::Selector;
