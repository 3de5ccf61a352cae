//! PII masking for fetched records.
//!
//! Phone numbers keep their first and last digits and formatting; email
//! local parts keep their first and last letter. Dates are never touched.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

/// An optional country prefix and up to three digit groups, each joined by
/// at most one separator; the area code may be parenthesized.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s()]?)?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}")
        .expect("phone pattern is valid")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-zA-Z0-9._+-]+)@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})\b")
        .expect("email pattern is valid")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{4}/\d{2}/\d{2})\b")
        .expect("date pattern is valid")
});

/// Minimum digit count for a match to be treated as a phone number.
const MIN_PHONE_DIGITS: usize = 8;

/// Mask phone numbers and email addresses in `text`.
pub fn mask_sensitive_data(text: &str) -> String {
    let masked = mask_phones(text);
    EMAIL
        .replace_all(&masked, |caps: &Captures| {
            format!("{}@{}", mask_local_part(&caps[1]), &caps[2])
        })
        .into_owned()
}

/// Phone masking runs only on the text between dates, so a date is never
/// masked and never glued onto a neighbouring number.
fn mask_phones(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for date in DATE.find_iter(text) {
        out.push_str(&mask_phones_in(&text[rest..date.start()]));
        out.push_str(date.as_str());
        rest = date.end();
    }
    out.push_str(&mask_phones_in(&text[rest..]));
    out
}

fn mask_phones_in(segment: &str) -> std::borrow::Cow<'_, str> {
    PHONE.replace_all(segment, |caps: &Captures| mask_phone(&caps[0]))
}

fn mask_phone(candidate: &str) -> String {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    if digits < MIN_PHONE_DIGITS {
        return candidate.to_string();
    }

    let keep = if digits <= 10 { 2 } else { 3 };
    let mut seen = 0;
    candidate
        .chars()
        .map(|c| {
            if !c.is_ascii_digit() {
                return c;
            }
            let position = seen;
            seen += 1;
            if position < keep || position >= digits - keep {
                c
            } else {
                '*'
            }
        })
        .collect()
}

/// Mask each dot-separated segment of an email local part independently.
fn mask_local_part(local: &str) -> String {
    local
        .split('.')
        .map(mask_segment)
        .collect::<Vec<_>>()
        .join(".")
}

fn mask_segment(segment: &str) -> String {
    let letters = segment.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if letters <= 2 {
        return segment.to_string();
    }

    let stars = if letters <= 5 { "***" } else { "****" };
    // The email pattern only admits ASCII, so byte offsets are char offsets.
    let first = segment.find(|c: char| c.is_ascii_alphabetic());
    let last = segment.rfind(|c: char| c.is_ascii_alphabetic());
    match (first, last) {
        (Some(first), Some(last)) => {
            format!("{}{}{}", &segment[..=first], stars, &segment[last..])
        }
        _ => segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_mobile_number_keeping_format() {
        assert_eq!(mask_sensitive_data("Call 0412 345 678"), "Call 04** *** *78");
    }

    #[test]
    fn eight_digit_number_masks_middle_four() {
        assert_eq!(mask_sensitive_data("9876 5432"), "98** **32");
    }

    #[test]
    fn long_international_number_keeps_three_each_side() {
        assert_eq!(
            mask_sensitive_data("+61 412 345 678"),
            "+61 4** *** 678"
        );
    }

    #[test]
    fn parenthesized_area_code() {
        assert_eq!(mask_sensitive_data("(02) 9876 5432"), "(02) **** **32");
    }

    #[test]
    fn short_numbers_untouched() {
        assert_eq!(mask_sensitive_data("Unit 12, 2026 postcode"), "Unit 12, 2026 postcode");
    }

    #[test]
    fn dates_untouched() {
        let text = "Listed 2024-01-01, sold 01/02/2024, settled 2024/03/04";
        assert_eq!(mask_sensitive_data(text), text);
    }

    #[test]
    fn phone_after_date_is_masked() {
        assert_eq!(
            mask_sensitive_data("Listed 2024-01-01 0412 345 678"),
            "Listed 2024-01-01 04** *** *78"
        );
    }

    #[test]
    fn date_after_phone_is_untouched() {
        assert_eq!(
            mask_sensitive_data("0412 345 678 2024-01-01"),
            "04** *** *78 2024-01-01"
        );
    }

    #[test]
    fn slash_date_next_to_phone() {
        assert_eq!(
            mask_sensitive_data("Sold 20/01/2024, call 0412345678"),
            "Sold 20/01/2024, call 04******78"
        );
    }

    #[test]
    fn masks_email_local_parts() {
        assert_eq!(
            mask_sensitive_data("jane.doe@example.com"),
            "j***e.d***e@example.com"
        );
        assert_eq!(
            mask_sensitive_data("contact: jonathan@agency.com.au"),
            "contact: j****n@agency.com.au"
        );
    }

    #[test]
    fn short_email_segments_untouched() {
        assert_eq!(mask_sensitive_data("jo.li@x.io"), "jo.li@x.io");
    }

    #[test]
    fn non_letters_around_segment_preserved() {
        assert_eq!(mask_sensitive_data("_mark1@mail.com"), "_m***k1@mail.com");
    }

    #[test]
    fn masks_inside_json() {
        let raw = r#"[{"full_name":"Jane Doe","phone2_mobile":"0412345678","emailaddress":"jane.doe@example.com"}]"#;
        let masked = mask_sensitive_data(raw);
        assert!(masked.contains(r#""phone2_mobile":"04******78""#));
        assert!(masked.contains(r#""emailaddress":"j***e.d***e@example.com""#));
        assert!(masked.contains("Jane Doe"));
    }

    #[test]
    fn text_without_pii_is_unchanged() {
        let text = "No results found for your query.";
        assert_eq!(mask_sensitive_data(text), text);
    }
}
