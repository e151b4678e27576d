//! Capability and media URN grammar: parsing, canonicalization, and the
//! specificity-based matching rules the host's routing table is built on.
//!
//! A capability URN (`cap:op=transform;in=media:void;...`) names what a plugin can
//! do. A media URN (`media:form=map;textable`) names the shape of a value flowing
//! through the system. Both share one tag-list grammar; the difference is purely in
//! how they're matched (wildcard-aware specificity ranking for caps, the stricter
//! `satisfies` relation for media).

mod cap;
mod error;
mod parser;
mod urn;

pub use cap::{ArgSource, Cap, CapArg, CapOutput, ResolvedMediaSpec, Value, ValidationRule};
pub use error::ParseError;
pub use urn::{best_match, Scheme, Urn, UrnBuilder, WILDCARD};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_cap() {
        let urn = Urn::parse_cap("cap:op=transform").expect("valid urn");
        assert_eq!(urn.get("op"), Some("transform"));
        assert_eq!(urn.canonical(), "cap:op=transform");
    }

    #[test]
    fn empty_cap_is_valid() {
        let urn = Urn::parse_cap("cap:").expect("empty tag list is valid");
        assert_eq!(urn.canonical(), "cap:");
        assert_eq!(urn.specificity(), 0);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = Urn::parse_cap("op=transform").unwrap_err();
        assert!(matches!(err, ParseError::MissingPrefix { pos: 0 }));
    }

    #[test]
    fn rejects_trailing_semicolon() {
        let err = Urn::parse_cap("cap:op=transform;").unwrap_err();
        assert!(matches!(err, ParseError::EmptyTag { .. }));
    }

    #[test]
    fn rejects_double_semicolon() {
        let err = Urn::parse_cap("cap:op=transform;;in=media:void").unwrap_err();
        assert!(matches!(err, ParseError::EmptyTag { .. }));
    }

    #[test]
    fn rejects_key_without_value() {
        let err = Urn::parse_cap("cap:op").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTagFormat { .. }));
    }

    #[test]
    fn rejects_numeric_only_key() {
        let err = Urn::parse_cap("cap:123=x").unwrap_err();
        assert!(matches!(err, ParseError::NumericOnlyKey { .. }));
    }

    #[test]
    fn rejects_duplicate_key() {
        let err = Urn::parse_cap("cap:op=a;op=b").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateKey { .. }));
    }

    #[test]
    fn rejects_unterminated_quote() {
        let err = Urn::parse_cap("cap:op=\"unterminated").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedQuote { .. }));
    }

    #[test]
    fn rejects_bad_escape() {
        let err = Urn::parse_cap("cap:op=\"a\\nb\"").unwrap_err();
        assert!(matches!(err, ParseError::InvalidEscape { .. }));
    }

    #[test]
    fn quoted_value_round_trips_byte_exact() {
        let urn = Urn::parse_cap(r#"cap:out="media:form=map;textable""#).expect("valid urn");
        assert_eq!(urn.get("out"), Some("media:form=map;textable"));
        assert_eq!(urn.canonical(), r#"cap:out="media:form=map;textable""#);
    }

    #[test]
    fn keys_sort_and_lowercase_while_unquoted_values_keep_their_case() {
        // Keys are always lower-cased and sorted; unquoted values that contain no
        // structural separator are serialized verbatim, case included.
        let urn = Urn::parse_cap(
            r#"cap:OP=Transform;FORMAT=JSON;in="media:void";out="media:form=map;textable""#,
        )
        .expect("valid urn");
        assert_eq!(
            urn.canonical(),
            r#"cap:format=JSON;in=media:void;op=Transform;out="media:form=map;textable""#
        );
    }

    #[test]
    fn escaped_quote_round_trips() {
        let urn = Urn::parse_cap(r#"cap:label="say \"hi\"""#).expect("valid urn");
        assert_eq!(urn.get("label"), Some(r#"say "hi""#));
        assert_eq!(urn.canonical(), r#"cap:label="say \"hi\"""#);
    }

    #[test]
    fn wildcard_matches_any_request_value() {
        let published = Urn::parse_cap("cap:op=transform;format=*").expect("valid");
        let request = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        assert!(published.matches(&request));
    }

    #[test]
    fn mismatched_value_does_not_match() {
        let published = Urn::parse_cap("cap:op=transform;format=xml").expect("valid");
        let request = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        assert!(!published.matches(&request));
    }

    #[test]
    fn request_tag_absent_from_cap_still_matches() {
        let published = Urn::parse_cap("cap:op=transform").expect("valid");
        let request = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        assert!(published.matches(&request));
    }

    #[test]
    fn specificity_prefers_more_concrete_match() {
        let wildcard = Urn::parse_cap("cap:op=transform;format=*").expect("valid");
        let concrete = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        let request = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        assert!(concrete.is_more_specific_than(&wildcard));

        let published = [wildcard.clone(), concrete.clone()];
        let best = best_match(&published, |u| u, &request).expect("a match exists");
        assert_eq!(best, &concrete);
    }

    #[test]
    fn best_match_breaks_ties_by_insertion_order() {
        let first = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        let second = Urn::parse_cap("cap:op=transform;format=json;extra=*").expect("valid");
        let request = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        let published = [first.clone(), second];
        let best = best_match(&published, |u| u, &request).expect("a match exists");
        assert_eq!(best, &first);
    }

    #[test]
    fn satisfies_requires_exact_value_for_every_pattern_tag() {
        let instance = Urn::parse_media("media:form=map;textable=true;extra=ignored")
            .expect("valid media urn");
        let pattern = Urn::parse_media("media:form=map;textable=true").expect("valid pattern");
        assert!(instance.satisfies(&pattern));

        let mismatched = Urn::parse_media("media:form=list;textable=true").expect("valid");
        assert!(!mismatched.satisfies(&pattern));
    }

    #[test]
    fn builder_roundtrips_through_parser() {
        let urn = UrnBuilder::cap()
            .tag("op", "transform")
            .expect("valid key")
            .tag("out", "media:form=map;textable")
            .expect("valid key")
            .build();
        let reparsed = Urn::parse_cap(&urn.canonical()).expect("builder output reparses");
        assert_eq!(urn, reparsed);
    }

    #[test]
    fn builder_rejects_duplicate_tag() {
        let err = UrnBuilder::cap()
            .tag("op", "transform")
            .expect("valid key")
            .tag("op", "other")
            .unwrap_err();
        assert!(matches!(err, ParseError::DuplicateKey { .. }));
    }

    #[test]
    fn content_hash_is_stable_for_equal_urns() {
        let a = Urn::parse_cap("cap:op=transform;format=json").expect("valid");
        let b = Urn::parse_cap("cap:format=json;op=transform").expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.content_hash(), b.content_hash());
    }
}
