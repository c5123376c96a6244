const FENCE: &str = "```";

/// Prompt text with every fenced codeblock replaced by `[codeblock-N]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedPrompt {
    pub text: String,
    pub has_codeblocks: bool,
    pub codeblock_count: usize,
}

/// Replace fenced codeblocks with numbered placeholders.
///
/// An opening fence swallows the rest of its line (the language tag). The
/// block ends at the next fence that starts a line and is followed by
/// whitespace or the end of the text. Without such a fence the block runs to
/// the end of the text. The result is trimmed.
pub fn mask_codeblocks(input: &str) -> MaskedPrompt {
    let mut out = String::with_capacity(input.len());
    let mut count = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find(FENCE) {
        let open = cursor + offset;
        out.push_str(&input[cursor..open]);
        count += 1;
        out.push_str(&format!("[codeblock-{count}]"));

        let after_open = open + FENCE.len();
        let body = match input[after_open..].find('\n') {
            Some(newline) => after_open + newline + 1,
            None => input.len(),
        };

        match find_closing_fence(input, body) {
            Some(close) => cursor = close + FENCE.len(),
            None => {
                cursor = input.len();
                break;
            }
        }
    }
    out.push_str(&input[cursor..]);

    MaskedPrompt {
        text: out.trim().to_string(),
        has_codeblocks: count > 0,
        codeblock_count: count,
    }
}

fn find_closing_fence(text: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(offset) = text[pos..].find(FENCE) {
        let at = pos + offset;
        let starts_line = at == 0 || text[..at].ends_with('\n');
        let ends_cleanly = text[at + FENCE.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace);
        if starts_line && ends_cleanly {
            return Some(at);
        }
        pos = at + FENCE.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block_inline_with_text() {
        let masked = mask_codeblocks("Hello ```js\ncode\n``` world");
        assert_eq!(masked.text, "Hello [codeblock-1] world");
        assert!(masked.has_codeblocks);
        assert_eq!(masked.codeblock_count, 1);
    }

    #[test]
    fn test_unclosed_block_consumes_rest() {
        let masked = mask_codeblocks("pre ```js\nbroken");
        assert_eq!(masked.text, "pre [codeblock-1]");
        assert_eq!(masked.codeblock_count, 1);
    }

    #[test]
    fn test_multiple_blocks_numbered_in_order() {
        let input = "Compare\n```rust\nfn a() {}\n```\nwith\n```\nfn b() {}\n```\nplease ";
        let masked = mask_codeblocks(input);
        assert_eq!(
            masked.text,
            "Compare\n[codeblock-1]\nwith\n[codeblock-2]\nplease"
        );
        assert_eq!(masked.codeblock_count, 2);
    }

    #[test]
    fn test_no_codeblocks_passes_through_trimmed() {
        let masked = mask_codeblocks("  just a question?\n ");
        assert_eq!(masked.text, "just a question?");
        assert!(!masked.has_codeblocks);
        assert_eq!(masked.codeblock_count, 0);
    }

    #[test]
    fn test_fence_mid_line_does_not_close() {
        // The inner ``` is not at a line start, so the block runs on.
        let masked = mask_codeblocks("a\n```\nlet s = \"```\";\n```\nb");
        assert_eq!(masked.text, "a\n[codeblock-1]\nb");
    }

    #[test]
    fn test_fence_followed_by_text_does_not_close() {
        let masked = mask_codeblocks("```md\n```python\nx\n```");
        assert_eq!(masked.text, "[codeblock-1]");
        assert_eq!(masked.codeblock_count, 1);
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(mask_codeblocks("```\n```").text, "[codeblock-1]");
    }
}
