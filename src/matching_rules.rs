//! Syntax-driven value normalization for attribute matching (RFC 4517).
//!
//! Every rule is an immutable, stateless value — the lookup tables below are
//! built once, lazily, and shared process-wide, the same way the control
//! registry's default instance is built in [`crate::controls`].

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{LdapError, Result};

/// A single normalized, syntax-specific value.
pub type Normalized = Vec<u8>;

/// Which part of a substring filter a value came from, since some rules
/// normalize the middle differently from the edges (trimming only applies at
/// the initial/final boundary, not `any` chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstringKind {
    Initial,
    Any,
    Final,
}

/// The closed set of matching rules required by the core, one variant per
/// RFC 4517 syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingRule {
    CaseIgnore,
    CaseExact,
    NumericString,
    OctetString,
    DistinguishedName,
    Boolean,
    Integer,
    GeneralizedTime,
    TelephoneNumber,
}

struct RuleNames {
    equality_name: &'static str,
    equality_oid: &'static str,
    ordering_name: Option<&'static str>,
    ordering_oid: Option<&'static str>,
    substring_name: Option<&'static str>,
    substring_oid: Option<&'static str>,
}

impl MatchingRule {
    fn names(self) -> RuleNames {
        use MatchingRule::*;
        match self {
            CaseIgnore => RuleNames {
                equality_name: "caseIgnoreMatch",
                equality_oid: "2.5.13.2",
                ordering_name: Some("caseIgnoreOrderingMatch"),
                ordering_oid: Some("2.5.13.3"),
                substring_name: Some("caseIgnoreSubstringsMatch"),
                substring_oid: Some("2.5.13.4"),
            },
            CaseExact => RuleNames {
                equality_name: "caseExactMatch",
                equality_oid: "2.5.13.5",
                ordering_name: Some("caseExactOrderingMatch"),
                ordering_oid: Some("2.5.13.6"),
                substring_name: Some("caseExactSubstringsMatch"),
                substring_oid: Some("2.5.13.7"),
            },
            NumericString => RuleNames {
                equality_name: "numericStringMatch",
                equality_oid: "2.5.13.8",
                ordering_name: Some("numericStringOrderingMatch"),
                ordering_oid: Some("2.5.13.9"),
                substring_name: Some("numericStringSubstringsMatch"),
                substring_oid: Some("2.5.13.10"),
            },
            OctetString => RuleNames {
                equality_name: "octetStringMatch",
                equality_oid: "2.5.13.17",
                ordering_name: None,
                ordering_oid: None,
                substring_name: Some("octetStringSubstringsMatch"),
                substring_oid: Some("2.5.13.18"),
            },
            DistinguishedName => RuleNames {
                equality_name: "distinguishedNameMatch",
                equality_oid: "2.5.13.1",
                ordering_name: None,
                ordering_oid: None,
                substring_name: None,
                substring_oid: None,
            },
            Boolean => RuleNames {
                equality_name: "booleanMatch",
                equality_oid: "2.5.13.13",
                ordering_name: None,
                ordering_oid: None,
                substring_name: None,
                substring_oid: None,
            },
            Integer => RuleNames {
                equality_name: "integerMatch",
                equality_oid: "2.5.13.14",
                ordering_name: Some("integerOrderingMatch"),
                ordering_oid: Some("2.5.13.15"),
                substring_name: None,
                substring_oid: None,
            },
            GeneralizedTime => RuleNames {
                equality_name: "generalizedTimeMatch",
                equality_oid: "2.5.13.27",
                ordering_name: Some("generalizedTimeOrderingMatch"),
                ordering_oid: Some("2.5.13.28"),
                substring_name: None,
                substring_oid: None,
            },
            TelephoneNumber => RuleNames {
                equality_name: "telephoneNumberMatch",
                equality_oid: "2.5.13.20",
                ordering_name: None,
                ordering_oid: None,
                substring_name: Some("telephoneNumberSubstringsMatch"),
                substring_oid: Some("2.5.13.21"),
            },
        }
    }

    pub fn equality_name(self) -> &'static str {
        self.names().equality_name
    }

    pub fn equality_oid(self) -> &'static str {
        self.names().equality_oid
    }

    /// Normalize a value per this rule's syntax. Failures carry the offset
    /// of the first offending character, per the invariant that
    /// normalization failures are deterministic in their reason.
    pub fn normalize(self, value: &[u8]) -> Result<Normalized> {
        use MatchingRule::*;
        match self {
            CaseIgnore => Ok(normalize_whitespace(&fold_case(value))),
            CaseExact => Ok(normalize_whitespace(value)),
            NumericString => normalize_numeric_string(value),
            OctetString => Ok(value.to_vec()),
            DistinguishedName => normalize_dn(value),
            Boolean => normalize_boolean(value),
            Integer => normalize_integer(value),
            GeneralizedTime => normalize_generalized_time(value),
            TelephoneNumber => Ok(normalize_whitespace(&fold_case(&strip_phone_punctuation(
                value,
            )))),
        }
    }

    /// Normalize one chunk of a substring filter assertion. Initial/Final
    /// chunks get the same whitespace trimming as a whole-value normalize;
    /// `Any` chunks only get internal whitespace collapsed, since there is
    /// no boundary to trim against.
    pub fn normalize_substring(self, value: &[u8], kind: SubstringKind) -> Result<Normalized> {
        use MatchingRule::*;
        match (self, kind) {
            (CaseIgnore, SubstringKind::Any) => Ok(collapse_whitespace(&fold_case(value))),
            (CaseExact, SubstringKind::Any) => Ok(collapse_whitespace(value)),
            _ => self.normalize(value),
        }
    }

    pub fn values_match(self, a: &[u8], b: &[u8]) -> Result<bool> {
        Ok(self.normalize(a)? == self.normalize(b)?)
    }

    /// Lexicographic comparison of normalized forms. Only meaningful for
    /// rules that define an ordering match.
    pub fn compare_values(self, a: &[u8], b: &[u8]) -> Result<std::cmp::Ordering> {
        Ok(self.normalize(a)?.cmp(&self.normalize(b)?))
    }
}

fn fold_case(value: &[u8]) -> Vec<u8> {
    if value.is_ascii() {
        value.iter().map(|b| b.to_ascii_lowercase()).collect()
    } else {
        String::from_utf8_lossy(value)
            .chars()
            .flat_map(char::to_lowercase)
            .collect::<String>()
            .into_bytes()
    }
}

fn collapse_whitespace(value: &[u8]) -> Vec<u8> {
    let s = String::from_utf8_lossy(value);
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.into_bytes()
}

fn normalize_whitespace(value: &[u8]) -> Vec<u8> {
    let collapsed = collapse_whitespace(value);
    let s = std::str::from_utf8(&collapsed).unwrap_or_default();
    s.trim().as_bytes().to_vec()
}

fn normalize_numeric_string(value: &[u8]) -> Result<Normalized> {
    let mut out = Vec::with_capacity(value.len());
    for (i, &b) in value.iter().enumerate() {
        match b {
            b' ' => continue,
            b'0'..=b'9' => out.push(b),
            _ => {
                return Err(LdapError::invalid_syntax(
                    i,
                    "numeric string must contain only digits and spaces",
                ))
            }
        }
    }
    Ok(out)
}

fn strip_phone_punctuation(value: &[u8]) -> Vec<u8> {
    value
        .iter()
        .copied()
        .filter(|&b| b != b' ' && b != b'-')
        .collect()
}

fn normalize_boolean(value: &[u8]) -> Result<Normalized> {
    let s = std::str::from_utf8(value)
        .map_err(|_| LdapError::invalid_syntax(0, "boolean value must be UTF-8"))?;
    match s.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(b"TRUE".to_vec()),
        "FALSE" => Ok(b"FALSE".to_vec()),
        _ => Err(LdapError::invalid_syntax(
            0,
            "boolean value must be TRUE or FALSE",
        )),
    }
}

fn normalize_integer(value: &[u8]) -> Result<Normalized> {
    let s = std::str::from_utf8(value)
        .map_err(|_| LdapError::invalid_syntax(0, "integer value must be UTF-8"))?;
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LdapError::invalid_syntax(
            0,
            "integer value must contain only decimal digits",
        ));
    }
    let trimmed = digits.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    let mut out = String::new();
    if negative && trimmed != "0" {
        out.push('-');
    }
    out.push_str(trimmed);
    Ok(out.into_bytes())
}

fn normalize_generalized_time(value: &[u8]) -> Result<Normalized> {
    let s = std::str::from_utf8(value)
        .map_err(|_| LdapError::invalid_syntax(0, "generalized time must be UTF-8"))?;
    let bytes = s.as_bytes();
    if bytes.len() < 11 || !bytes[..10].iter().all(u8::is_ascii_digit) {
        return Err(LdapError::invalid_syntax(
            0,
            "generalized time must start with a 10-digit YYYYMMDDHH stamp",
        ));
    }
    let year = &s[0..4];
    let month = &s[4..6];
    let day = &s[6..8];
    let hour = &s[8..10];
    let mut rest = &s[10..];

    let minute = if rest.as_bytes().first().map_or(false, u8::is_ascii_digit) {
        let (m, r) = split_two_digits(rest, 11)?;
        rest = r;
        m
    } else {
        "00"
    };
    let second = if rest.as_bytes().first().map_or(false, u8::is_ascii_digit) {
        let (s2, r) = split_two_digits(rest, 13)?;
        rest = r;
        s2
    } else {
        "00"
    };

    let mut millis = "000".to_string();
    if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(',')) {
        let frac_len = r.bytes().take_while(u8::is_ascii_digit).count();
        if frac_len == 0 {
            return Err(LdapError::invalid_syntax(
                10,
                "fractional seconds must have at least one digit",
            ));
        }
        let frac = &r[..frac_len];
        let mut ms = format!("{frac:0<3}");
        ms.truncate(3);
        millis = ms;
        rest = &r[frac_len..];
    }

    let offset_is_zulu = rest == "Z";
    if !offset_is_zulu {
        return Err(LdapError::invalid_syntax(
            s.len() - rest.len(),
            "only the Z (UTC) generalized time offset is supported",
        ));
    }

    Ok(format!("{year}{month}{day}{hour}{minute}{second}.{millis}Z").into_bytes())
}

fn split_two_digits(s: &str, offset: usize) -> Result<(&str, &str)> {
    if s.len() < 2 || !s.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
        return Err(LdapError::invalid_syntax(
            offset,
            "expected a two-digit field",
        ));
    }
    Ok(s.split_at(2))
}

fn normalize_dn(value: &[u8]) -> Result<Normalized> {
    let s = std::str::from_utf8(value)
        .map_err(|_| LdapError::invalid_syntax(0, "distinguished name must be UTF-8"))?;
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let mut rdns = Vec::new();
    for rdn in s.split(',') {
        let rdn = rdn.trim();
        let mut avas = Vec::new();
        for ava in rdn.split('+') {
            let (attr_type, attr_value) = ava.split_once('=').ok_or_else(|| {
                LdapError::invalid_syntax(0, "RDN attribute-value assertion missing '='")
            })?;
            let normalized_type = attr_type.trim().to_ascii_lowercase();
            let normalized_value = MatchingRule::CaseIgnore.normalize(attr_value.trim().as_bytes())?;
            avas.push(format!(
                "{normalized_type}={}",
                String::from_utf8_lossy(&normalized_value)
            ));
        }
        rdns.push(avas.join("+"));
    }
    Ok(rdns.join(",").into_bytes())
}

struct RuleTable {
    by_name: HashMap<String, MatchingRule>,
    by_oid: HashMap<&'static str, MatchingRule>,
}

static ALL_RULES: &[MatchingRule] = &[
    MatchingRule::CaseIgnore,
    MatchingRule::CaseExact,
    MatchingRule::NumericString,
    MatchingRule::OctetString,
    MatchingRule::DistinguishedName,
    MatchingRule::Boolean,
    MatchingRule::Integer,
    MatchingRule::GeneralizedTime,
    MatchingRule::TelephoneNumber,
];

static TABLE: Lazy<RuleTable> = Lazy::new(|| {
    let mut by_name = HashMap::new();
    let mut by_oid = HashMap::new();
    for &rule in ALL_RULES {
        let names = rule.names();
        by_name.insert(names.equality_name.to_ascii_lowercase(), rule);
        by_oid.insert(names.equality_oid, rule);
        if let (Some(name), Some(oid)) = (names.ordering_name, names.ordering_oid) {
            by_name.insert(name.to_ascii_lowercase(), rule);
            by_oid.insert(oid, rule);
        }
        if let (Some(name), Some(oid)) = (names.substring_name, names.substring_oid) {
            by_name.insert(name.to_ascii_lowercase(), rule);
            by_oid.insert(oid, rule);
        }
    }
    RuleTable { by_name, by_oid }
});

/// Look up a matching rule by name, case-insensitively.
pub fn by_name(name: &str) -> Option<MatchingRule> {
    TABLE.by_name.get(&name.to_ascii_lowercase()).copied()
}

/// Look up a matching rule by its numeric OID.
pub fn by_oid(oid: &str) -> Option<MatchingRule> {
    TABLE.by_oid.get(oid).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_ignore_collapses_whitespace_and_folds_case() {
        let a = MatchingRule::CaseIgnore.normalize(b"Hello   World").unwrap();
        let b = MatchingRule::CaseIgnore.normalize(b"hello world").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, b"hello world");
    }

    #[test]
    fn numeric_string_removes_spaces_not_collapses() {
        assert_eq!(
            MatchingRule::NumericString.normalize(b" 12 34 ").unwrap(),
            b"1234"
        );
    }

    #[test]
    fn numeric_string_rejects_non_digit() {
        let err = MatchingRule::NumericString.normalize(b"12a").unwrap_err();
        match err {
            LdapError::InvalidSyntax { offset, .. } => assert_eq!(offset, 2),
            other => panic!("expected InvalidSyntax, got {other:?}"),
        }
    }

    #[test]
    fn octet_string_is_byte_identity() {
        assert_eq!(
            MatchingRule::OctetString.normalize(b"\x00\x01\xff").unwrap(),
            vec![0x00, 0x01, 0xff]
        );
    }

    #[test]
    fn boolean_match_canonicalizes_to_uppercase() {
        assert_eq!(MatchingRule::Boolean.normalize(b"true").unwrap(), b"TRUE");
        assert_eq!(MatchingRule::Boolean.normalize(b"False").unwrap(), b"FALSE");
        assert!(MatchingRule::Boolean.normalize(b"yes").is_err());
    }

    #[test]
    fn integer_match_strips_leading_zeros() {
        assert_eq!(MatchingRule::Integer.normalize(b"007").unwrap(), b"7");
        assert_eq!(MatchingRule::Integer.normalize(b"-007").unwrap(), b"-7");
        assert_eq!(MatchingRule::Integer.normalize(b"000").unwrap(), b"0");
    }

    #[test]
    fn telephone_number_strips_punctuation_and_folds_case() {
        let a = MatchingRule::TelephoneNumber
            .normalize(b"+1 555-0100 x1")
            .unwrap();
        let b = MatchingRule::TelephoneNumber
            .normalize(b"+15550100x1")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn generalized_time_normalizes_to_canonical_form() {
        let a = MatchingRule::GeneralizedTime.normalize(b"20240102030405Z").unwrap();
        assert_eq!(a, b"20240102030405.000Z");
        let b = MatchingRule::GeneralizedTime
            .normalize(b"20240102030405.5Z")
            .unwrap();
        assert_eq!(b, b"20240102030405.500Z");
    }

    #[test]
    fn distinguished_name_match_normalizes_attribute_types_and_values() {
        let a = MatchingRule::DistinguishedName
            .normalize(b"CN=Jane Doe, DC=Example, DC=COM")
            .unwrap();
        let b = MatchingRule::DistinguishedName
            .normalize(b"cn=jane   doe,dc=example,dc=com")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_is_idempotent() {
        for rule in ALL_RULES {
            let inputs: &[&[u8]] = &[b"Hello World", b"007", b"true", b"20240102030405Z"];
            for input in inputs {
                if let Ok(once) = rule.normalize(input) {
                    let twice = rule.normalize(&once).unwrap();
                    assert_eq!(once, twice, "{:?} not idempotent on {:?}", rule, input);
                }
            }
        }
    }

    #[test]
    fn values_match_is_symmetric() {
        assert!(MatchingRule::CaseIgnore
            .values_match(b"Hello World", b"hello world")
            .unwrap());
        assert!(MatchingRule::CaseIgnore
            .values_match(b"hello world", b"Hello World")
            .unwrap());
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        assert_eq!(by_name("CaseIgnoreMatch"), Some(MatchingRule::CaseIgnore));
        assert_eq!(by_name("caseignorematch"), Some(MatchingRule::CaseIgnore));
        assert_eq!(by_oid("2.5.13.2"), Some(MatchingRule::CaseIgnore));
        assert_eq!(by_name("doesNotExist"), None);
    }

    #[test]
    fn substring_any_chunk_is_not_trimmed_but_is_collapsed() {
        let any = MatchingRule::CaseIgnore
            .normalize_substring(b"  middle  ", SubstringKind::Any)
            .unwrap();
        assert_eq!(any, b" middle ");
    }
}
