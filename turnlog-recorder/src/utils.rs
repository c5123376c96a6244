//! URL classification and timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

pub const GEMINI_HOST: &str = "gemini.google.com";

/// What a page URL points at inside the chat application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUrl {
    /// An empty chat, optionally inside a Gem (`/app`, `/gem/<gem>`).
    NewChat { gem_id: Option<String> },
    /// An existing conversation (`/app/<id>`, `/gem/<gem>/<id>`).
    Conversation {
        gem_id: Option<String>,
        conversation_id: String,
    },
    /// Anything else, including other hosts.
    Other,
}

impl ChatUrl {
    pub fn parse(url: &str) -> Self {
        let Ok(parsed) = Url::parse(url) else {
            return ChatUrl::Other;
        };
        if parsed.host_str() != Some(GEMINI_HOST) {
            return ChatUrl::Other;
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        // Multi-account sessions prefix the path with /u/<index>.
        let rest = match segments.as_slice() {
            ["u", index, rest @ ..] if index.chars().all(|c| c.is_ascii_digit()) => rest,
            all => all,
        };

        match rest {
            ["app"] => ChatUrl::NewChat { gem_id: None },
            ["app", id] => ChatUrl::Conversation {
                gem_id: None,
                conversation_id: id.to_string(),
            },
            ["gem", gem] => ChatUrl::NewChat {
                gem_id: Some(gem.to_string()),
            },
            ["gem", gem, id] => ChatUrl::Conversation {
                gem_id: Some(gem.to_string()),
                conversation_id: id.to_string(),
            },
            _ => ChatUrl::Other,
        }
    }

    pub fn is_chat(&self) -> bool {
        !matches!(self, ChatUrl::Other)
    }

    pub fn is_new_chat(&self) -> bool {
        matches!(self, ChatUrl::NewChat { .. })
    }

    pub fn gem_id(&self) -> Option<&str> {
        match self {
            ChatUrl::NewChat { gem_id } | ChatUrl::Conversation { gem_id, .. } => {
                gem_id.as_deref()
            }
            ChatUrl::Other => None,
        }
    }

    pub fn is_gem(&self) -> bool {
        self.gem_id().is_some()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ChatUrl::Conversation {
                conversation_id, ..
            } => Some(conversation_id.as_str()),
            _ => None,
        }
    }
}

pub fn is_gemini_chat_url(url: &str) -> bool {
    ChatUrl::parse(url).is_chat()
}

pub fn is_gem_url(url: &str) -> bool {
    ChatUrl::parse(url).is_gem()
}

/// ISO-8601 UTC with millisecond precision, e.g. `2025-01-31T09:15:02.120Z`.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_classify_chat_urls() {
        assert_eq!(
            ChatUrl::parse("https://gemini.google.com/app"),
            ChatUrl::NewChat { gem_id: None }
        );
        assert_eq!(
            ChatUrl::parse("https://gemini.google.com/app/"),
            ChatUrl::NewChat { gem_id: None }
        );
        assert_eq!(
            ChatUrl::parse("https://gemini.google.com/u/1/app/5f2a9c?hl=en"),
            ChatUrl::Conversation {
                gem_id: None,
                conversation_id: "5f2a9c".to_string()
            }
        );
        assert_eq!(
            ChatUrl::parse("https://gemini.google.com/gem/coding-partner"),
            ChatUrl::NewChat {
                gem_id: Some("coding-partner".to_string())
            }
        );
        let gem_conv = ChatUrl::parse("https://gemini.google.com/gem/coding-partner/77ab");
        assert_eq!(gem_conv.gem_id(), Some("coding-partner"));
        assert_eq!(gem_conv.conversation_id(), Some("77ab"));
        assert!(!gem_conv.is_new_chat());
    }

    #[test]
    fn test_non_chat_urls() {
        for url in [
            "https://gemini.google.com/gems/view",
            "https://gemini.google.com/",
            "https://example.com/app",
            "not a url",
            "https://gemini.google.com/u/x/app",
        ] {
            assert_eq!(ChatUrl::parse(url), ChatUrl::Other, "{url}");
            assert!(!is_gemini_chat_url(url));
            assert!(!is_gem_url(url));
        }
        assert!(is_gem_url("https://gemini.google.com/u/0/gem/abc"));
    }

    #[test]
    fn test_format_timestamp() {
        let time = Utc.with_ymd_and_hms(2025, 1, 31, 9, 15, 2).unwrap();
        assert_eq!(format_timestamp(time), "2025-01-31T09:15:02.000Z");
        assert!(DateTime::parse_from_rfc3339(&now_timestamp()).is_ok());
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 200), "short");
    }
}
