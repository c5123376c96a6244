//! Selectors for the host page's markup.
//!
//! The host page owns this markup and changes it without notice, so most
//! lookups carry an ordered list of alternatives; the first one that matches
//! wins.

/// The rich-text prompt editor.
pub const PROMPT_EDITOR: &[&str] = &[
    "rich-textarea .ql-editor",
    ".ql-editor[contenteditable=\"true\"]",
    "div[contenteditable=\"true\"][role=\"textbox\"]",
];

/// Attached-file chips shown above the editor.
pub const FILE_PREVIEWS: &[&str] = &[
    "uploader-file-preview [data-test-id=\"file-name\"]",
    ".file-preview-container .file-name",
    "uploader-file-preview",
];

/// Controls that submit the prompt. Clicks inside them count too.
pub const SEND_BUTTON: &[&str] = &[
    "button.send-button",
    "button[data-test-id=\"send-button\"]",
    "button[aria-label^=\"Send\"]",
];

/// Navigation sidebar; its appearance means the app shell is ready.
pub const SIDEBAR: &[&str] = &[
    "side-navigation-v2",
    "bard-sidenav",
    ".sidenav-with-history-container",
];

/// The title of the active conversation.
pub const CONVERSATION_TITLE: &[&str] = &[
    "[data-test-id=\"conversation-title\"]",
    ".conversation.selected .conversation-title",
    ".conversation-title-container .conversation-title",
];

/// Label of the active model in the mode switcher.
pub const MODEL_NAME: &[&str] = &[
    "bard-mode-switcher [data-test-id=\"logo-pill-label-container\"] span",
    "[data-test-id=\"bard-mode-menu-button\"] span",
    ".current-mode-title",
];

/// Subscription plan badge next to the logo.
pub const PLAN_BADGE: &[&str] = &[
    "[data-test-id=\"plan-badge\"]",
    ".gemini-plan-badge",
    ".pro-badge",
];

/// Name and description of the active Gem.
pub const GEM_NAME: &[&str] = &[
    "bot-info-card .bot-name",
    "[data-test-id=\"bot-name\"]",
    ".bot-name-container .bot-name",
];

pub const GEM_DESCRIPTION: &[&str] = &[
    "bot-info-card .bot-description",
    "[data-test-id=\"bot-description\"]",
];

/// Account strategy 1: links to the account-management domain.
pub const ACCOUNT_MANAGEMENT_LINK: &str = "a[href*=\"accounts.google.com\"]";

/// Account strategy 2: the signed-in profile picture.
pub const PROFILE_IMAGE: &[&str] = &[
    "img.gb_P",
    "img.gbii",
    "img[src*=\"googleusercontent.com\"]",
];

/// Account strategy 3: account-menu containers.
pub const ACCOUNT_MENU_CONTAINERS: &[&str] = &["#gb", ".gb_z", ".gb_B", ".gb_Ja"];

/// Account strategy 4: anything carrying an accessible label.
pub const LABELLED: &str = "[aria-label]";

pub const ARIA_LABEL: &str = "aria-label";
