//! Token estimation for backends that stream without usage metadata.
//!
//! Character-based heuristic: ~4 characters per token, rounded up.

use leadline_core::message::Message;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

/// Estimate the prompt size of a message list (content only).
pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    let chars: u64 = messages
        .iter()
        .map(|m| m.content.chars().count() as u64)
        .sum();
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn messages_summed_before_rounding() {
        let msgs = vec![Message::system("abcde"), Message::user("fgh")];
        assert_eq!(estimate_messages_tokens(&msgs), 2);
    }
}
