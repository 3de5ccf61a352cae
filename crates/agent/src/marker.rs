//! Response classification: does a model reply ask for external data?

/// What the dispatch loop should do with a first-invocation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The reply asks for a lookup with this query.
    Fetch { query: String },
    /// The reply is the answer (trimmed).
    Final { text: String },
}

/// Decides whether a reply is a fetch request.
pub trait MarkerRule: Send + Sync {
    fn classify(&self, reply: &str) -> Classification;
}

/// The default rule: a reply whose trimmed text starts with `FETCH`
/// (any case), optionally followed by `:`, is a fetch request for the
/// rest of the line.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchMarker;

const MARKER: &str = "FETCH";

impl MarkerRule for FetchMarker {
    fn classify(&self, reply: &str) -> Classification {
        let trimmed = reply.trim();

        let is_marker = trimmed
            .get(..MARKER.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(MARKER));
        if !is_marker {
            return Classification::Final {
                text: trimmed.to_string(),
            };
        }

        let rest = &trimmed[MARKER.len()..];
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        Classification::Fetch {
            query: rest.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(query: &str) -> Classification {
        Classification::Fetch {
            query: query.into(),
        }
    }

    #[test]
    fn marker_with_colon() {
        assert_eq!(FetchMarker.classify("FETCH: Bondi"), fetch("Bondi"));
    }

    #[test]
    fn marker_is_case_insensitive_and_whitespace_tolerant() {
        assert_eq!(FetchMarker.classify("  fetch:   2026  \n"), fetch("2026"));
        assert_eq!(FetchMarker.classify("Fetch Parramatta"), fetch("Parramatta"));
    }

    #[test]
    fn bare_marker_has_empty_query() {
        assert_eq!(FetchMarker.classify("FETCH"), fetch(""));
        assert_eq!(FetchMarker.classify("FETCH:"), fetch(""));
    }

    #[test]
    fn non_marker_is_final_and_trimmed() {
        assert_eq!(
            FetchMarker.classify("  Thanks for your question, here is some advice...\n"),
            Classification::Final {
                text: "Thanks for your question, here is some advice...".into()
            }
        );
    }

    #[test]
    fn marker_must_lead() {
        assert!(matches!(
            FetchMarker.classify("I will FETCH: Bondi"),
            Classification::Final { .. }
        ));
    }

    #[test]
    fn multibyte_prefix_does_not_panic() {
        assert!(matches!(
            FetchMarker.classify("é FETCH"),
            Classification::Final { .. }
        ));
    }
}
