use crate::selectors;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use turnlog::Document;

pub const UNKNOWN: &str = "Unknown";

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").ok());

// "Google Account: Jane Doe (jane@example.com)"
static NAME_BEFORE_EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r":\s*([^:()]+?)\s*\(\s*[^()\s]+@[^()\s]+\s*\)").ok());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    pub email: String,
}

impl AccountInfo {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            email: UNKNOWN.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN && self.email == UNKNOWN
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Finds an accessible label that names the signed-in account.
pub type LabelStrategy = fn(&Document) -> Option<String>;

/// Label lookups in the order they are tried.
pub const STRATEGIES: &[(&str, LabelStrategy)] = &[
    ("account-management link", from_account_link),
    ("profile image", from_profile_image),
    ("account menu", from_account_menu),
    ("labelled element scan", from_any_labelled_element),
];

fn label_with_at(label: Option<&str>) -> Option<String> {
    label
        .filter(|label| label.contains('@'))
        .map(|label| label.to_string())
}

pub fn from_account_link(doc: &Document) -> Option<String> {
    doc.query_selector_all(selectors::ACCOUNT_MANAGEMENT_LINK)
        .iter()
        .find_map(|link| label_with_at(link.attr(selectors::ARIA_LABEL)))
}

pub fn from_profile_image(doc: &Document) -> Option<String> {
    selectors::PROFILE_IMAGE.iter().find_map(|selector| {
        doc.query_selector_all(*selector).iter().find_map(|img| {
            img.closest("a")
                .and_then(|anchor| label_with_at(anchor.attr(selectors::ARIA_LABEL)))
        })
    })
}

pub fn from_account_menu(doc: &Document) -> Option<String> {
    selectors::ACCOUNT_MENU_CONTAINERS
        .iter()
        .flat_map(|selector| doc.query_selector_all(*selector))
        .find_map(|container| {
            container
                .query_selector_all("a[aria-label]")
                .iter()
                .find_map(|anchor| label_with_at(anchor.attr(selectors::ARIA_LABEL)))
        })
}

pub fn from_any_labelled_element(doc: &Document) -> Option<String> {
    let email = EMAIL.as_ref()?;
    doc.query_selector_all(selectors::LABELLED)
        .iter()
        .filter_map(|el| el.attr(selectors::ARIA_LABEL))
        .find(|label| email.is_match(label))
        .map(|label| label.to_string())
}

/// First label any strategy finds, with the name of the strategy.
pub fn find_account_label(doc: &Document) -> Option<(&'static str, String)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(doc).map(|label| (*name, label)))
}

/// Split an account label into name and email. `None` when the label
/// cannot be parsed at all.
pub fn parse_account_label(label: &str) -> Option<AccountInfo> {
    let email_re = EMAIL.as_ref()?;
    let email = email_re.find(label).map(|m| m.as_str().to_string());

    let name = NAME_BEFORE_EMAIL
        .as_ref()
        .and_then(|re| re.captures(label))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| derive_name(label, email.as_deref()));

    if name.is_none() && email.is_none() {
        return None;
    }
    Some(AccountInfo {
        name: name.unwrap_or_else(|| UNKNOWN.to_string()),
        email: email.unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

fn derive_name(label: &str, email: Option<&str>) -> Option<String> {
    let without_email = match email {
        Some(email) => label.replace(email, ""),
        None => label.to_string(),
    };
    let tail = without_email
        .rsplit(':')
        .next()
        .unwrap_or(without_email.as_str());
    let name = tail
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_string();
    (!name.is_empty()).then_some(name)
}
