//! Code resolver: reduces an inbound identifier to candidate predicates.
//!
//! QR payloads are not a fixed schema (legacy formats coexist with newer
//! ones), so the resolver is an ordered list of independent parser
//! strategies (URL form, `|`-delimited form, regex fallback), each emitting
//! zero or more candidate predicates into one OR-combined set. Every
//! predicate is an exact-equality test, never partial or fuzzy: being
//! liberal in what we accept must never manufacture a match between two
//! different tickets.
//!
//! Adding a future QR format means adding a strategy, not growing a
//! monolithic parser.

use crate::types::{SecurityCode, TicketCode, TicketId};
use regex::Regex;
use smallvec::SmallVec;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Exact-equality candidate predicate against the ticket store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketPredicate {
    /// Match on the human-readable ticket code
    CodeEquals(TicketCode),
    /// Match on the fallback security code
    SecurityCodeEquals(SecurityCode),
    /// Match on the internal ticket id
    IdEquals(TicketId),
}

/// OR-combined set of candidate predicates.
pub type PredicateSet = SmallVec<[TicketPredicate; 2]>;

/// No interpretable ticket identifier could be derived from the request.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no interpretable ticket identifier in request")]
pub struct MalformedIdentifier;

/// A payload segment longer than this is assumed to be an internal id,
/// not a code.
const LONG_IDENTIFIER_THRESHOLD: usize = 20;

/// Ticket-code shape used by the last-resort payload scan.
#[allow(clippy::expect_used)]
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CS-[0-9]{6}").expect("code pattern is a valid regex"));

/// Query parameters recognized by the URL strategy as carrying a code.
const CODE_QUERY_PARAMS: [&str; 2] = ["codigo", "code"];
/// Query parameters recognized by the URL strategy as carrying an id.
const ID_QUERY_PARAMS: [&str; 2] = ["id", "ticket"];

/// Resolve an inbound validation request into candidate predicates.
///
/// Inputs are the literal `code`, the literal `security_code`, and the raw
/// `qr_payload`, each optional. The result is the union of every predicate
/// any strategy emitted, deduplicated.
///
/// # Errors
///
/// Returns [`MalformedIdentifier`] when no predicate can be derived from
/// any of the inputs.
pub fn resolve(
    code: Option<&str>,
    security_code: Option<&str>,
    qr_payload: Option<&str>,
) -> Result<PredicateSet, MalformedIdentifier> {
    let mut predicates = PredicateSet::new();

    if let Some(raw) = code {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            push_unique(
                &mut predicates,
                TicketPredicate::CodeEquals(TicketCode::new(trimmed)),
            );
        }
    }

    if let Some(raw) = security_code {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            push_unique(
                &mut predicates,
                TicketPredicate::SecurityCodeEquals(SecurityCode::new(trimmed)),
            );
        }
    }

    if let Some(payload) = qr_payload {
        let before = predicates.len();
        url_strategy(payload, &mut predicates);
        delimited_strategy(payload, &mut predicates);
        // Last resort: only when the structured strategies read nothing
        // from the payload.
        if predicates.len() == before {
            pattern_strategy(payload, &mut predicates);
        }
    }

    if predicates.is_empty() {
        Err(MalformedIdentifier)
    } else {
        Ok(predicates)
    }
}

fn push_unique(predicates: &mut PredicateSet, predicate: TicketPredicate) {
    if !predicates.contains(&predicate) {
        predicates.push(predicate);
    }
}

/// URL form: newer QR payloads embed a link with the code or id in
/// recognized query parameters.
fn url_strategy(payload: &str, predicates: &mut PredicateSet) {
    let Ok(parsed) = Url::parse(payload.trim()) else {
        return;
    };
    for (key, value) in parsed.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if CODE_QUERY_PARAMS.contains(&key.as_ref()) {
            push_unique(predicates, TicketPredicate::CodeEquals(TicketCode::new(value)));
        } else if ID_QUERY_PARAMS.contains(&key.as_ref()) {
            if let Ok(uuid) = Uuid::parse_str(value) {
                push_unique(
                    predicates,
                    TicketPredicate::IdEquals(TicketId::from_uuid(uuid)),
                );
            }
        }
    }
}

/// Delimited form: legacy payloads join fields with `|`. A segment that
/// follows the code convention is a code; a long segment parsing as a UUID
/// is an internal id. Anything else emits nothing, never a guessed match.
fn delimited_strategy(payload: &str, predicates: &mut PredicateSet) {
    if !payload.contains('|') {
        return;
    }
    for segment in payload.split('|') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if TicketCode::matches_convention(segment) {
            push_unique(
                predicates,
                TicketPredicate::CodeEquals(TicketCode::new(segment)),
            );
        } else if segment.len() > LONG_IDENTIFIER_THRESHOLD {
            if let Ok(uuid) = Uuid::parse_str(segment) {
                push_unique(
                    predicates,
                    TicketPredicate::IdEquals(TicketId::from_uuid(uuid)),
                );
            }
        }
    }
}

/// Last-resort fallback: scan the raw payload for the first ticket-code
/// shaped substring.
fn pattern_strategy(payload: &str, predicates: &mut PredicateSet) {
    if let Some(found) = CODE_PATTERN.find(payload) {
        push_unique(
            predicates,
            TicketPredicate::CodeEquals(TicketCode::new(found.as_str())),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn code(c: &str) -> TicketPredicate {
        TicketPredicate::CodeEquals(TicketCode::new(c))
    }

    #[test]
    fn literal_code_is_trimmed_into_a_single_predicate() {
        let predicates = resolve(Some("  CS-100001  "), None, None).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100001")]);
    }

    #[test]
    fn literal_security_code_is_matched_exactly() {
        let predicates = resolve(None, Some("100001"), None).unwrap();
        assert_eq!(
            predicates.as_slice(),
            [TicketPredicate::SecurityCodeEquals(SecurityCode::new("100001"))]
        );
    }

    #[test]
    fn url_payload_with_codigo_parameter_resolves_to_code() {
        let predicates =
            resolve(None, None, Some("https://example/x?codigo=CS-100003")).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100003")]);
    }

    #[test]
    fn url_payload_with_id_parameter_resolves_to_ticket_id() {
        let uuid = Uuid::new_v4();
        let payload = format!("https://example/validate?id={uuid}");
        let predicates = resolve(None, None, Some(&payload)).unwrap();
        assert_eq!(
            predicates.as_slice(),
            [TicketPredicate::IdEquals(TicketId::from_uuid(uuid))]
        );
    }

    #[test]
    fn delimited_payload_yields_code_and_long_id_predicates() {
        let uuid = Uuid::new_v4();
        let payload = format!("evt-55|CS-100003|{uuid}");
        let predicates = resolve(None, None, Some(&payload)).unwrap();
        assert_eq!(
            predicates.as_slice(),
            [
                code("CS-100003"),
                TicketPredicate::IdEquals(TicketId::from_uuid(uuid)),
            ]
        );
    }

    #[test]
    fn short_unconventional_segments_are_ignored() {
        // "evt-55" is neither code-shaped nor long enough to be an id.
        let predicates = resolve(None, None, Some("evt-55|CS-100009|x")).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100009")]);
    }

    #[test]
    fn long_non_uuid_segment_never_becomes_a_predicate() {
        let result = resolve(None, None, Some("aaaa|bbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
        assert_eq!(result, Err(MalformedIdentifier));
    }

    #[test]
    fn fallback_scan_finds_embedded_code_shape() {
        let predicates = resolve(None, None, Some("TICKET CS-100042 GA")).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100042")]);
    }

    #[test]
    fn fallback_does_not_run_when_structured_strategies_matched() {
        // The pipe segment matches; the embedded CS-999999 in the noise
        // segment must not produce a second candidate.
        let predicates = resolve(None, None, Some("note CS-999999|CS-100010")).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100010")]);
    }

    #[test]
    fn empty_inputs_are_malformed() {
        assert_eq!(resolve(None, None, None), Err(MalformedIdentifier));
        assert_eq!(resolve(Some("   "), None, Some("")), Err(MalformedIdentifier));
    }

    #[test]
    fn random_text_without_code_shape_is_malformed() {
        assert_eq!(
            resolve(None, None, Some("lorem ipsum dolor")),
            Err(MalformedIdentifier)
        );
    }

    #[test]
    fn duplicate_candidates_are_emitted_once() {
        let predicates =
            resolve(Some("CS-100001"), None, Some("CS-100001|CS-100001")).unwrap();
        assert_eq!(predicates.as_slice(), [code("CS-100001")]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary input never panics; it either resolves or is malformed.
            #[test]
            fn resolver_is_total(payload in ".{0,200}") {
                let _ = resolve(None, None, Some(&payload));
            }

            /// A code embedded behind a pipe is always recovered verbatim.
            #[test]
            fn pipe_embedded_code_is_recovered(n in 0u32..1_000_000) {
                let ticket_code = format!("CS-{n:06}");
                let payload = format!("gate|{ticket_code}");
                let predicates = resolve(None, None, Some(&payload)).unwrap();
                prop_assert!(predicates.contains(
                    &TicketPredicate::CodeEquals(TicketCode::new(&ticket_code))
                ));
            }

            /// Every emitted code predicate quotes a substring of some input;
            /// the resolver never manufactures an identifier. (Inputs with
            /// `=` are excluded: URL query values are percent-decoded.)
            #[test]
            fn code_predicates_quote_the_input(payload in "[^=]{0,200}") {
                if let Ok(predicates) = resolve(None, None, Some(&payload)) {
                    for predicate in &predicates {
                        if let TicketPredicate::CodeEquals(c) = predicate {
                            prop_assert!(payload.contains(c.as_str()));
                        }
                    }
                }
            }
        }
    }
}
