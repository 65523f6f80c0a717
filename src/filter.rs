//! Search filters: a recursive tagged CHOICE (RFC 4511 §4.5.1).

use std::borrow::Cow;

use crate::ber::reader::SliceReader;
use crate::ber::writer::SliceWriter;
use crate::ber::{BerError, BerResult, Class};
use crate::ldap::LdapString;

/// Filter decode recursion is capped to keep a maliciously nested filter
/// from exhausting the host stack (see the recursion-limit invariant on
/// [`crate::ber::element::Element::decode_one`]).
const MAX_FILTER_DEPTH: usize = 100;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter<'a> {
    And(Vec<Filter<'a>>),
    Or(Vec<Filter<'a>>),
    Not(Box<Filter<'a>>),
    EqualityMatch(AttributeValueAssertion<'a>),
    Substrings(SubstringFilter<'a>),
    GreaterOrEqual(AttributeValueAssertion<'a>),
    LessOrEqual(AttributeValueAssertion<'a>),
    Present(LdapString<'a>),
    ApproxMatch(AttributeValueAssertion<'a>),
    ExtensibleMatch(MatchingRuleAssertion<'a>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartialAttribute<'a> {
    pub attr_type: LdapString<'a>,
    pub attr_vals: Vec<AttributeValue<'a>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute<'a> {
    pub attr_type: LdapString<'a>,
    pub attr_vals: Vec<AttributeValue<'a>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeValueAssertion<'a> {
    pub attribute_desc: LdapString<'a>,
    pub assertion_value: Cow<'a, [u8]>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeDescription<'a>(pub Cow<'a, str>);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatchingRuleAssertion<'a> {
    pub matching_rule: Option<LdapString<'a>>,
    pub rule_type: Option<AttributeDescription<'a>>,
    pub assertion_value: AssertionValue<'a>,
    pub dn_attributes: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatchingRuleId<'a>(pub Cow<'a, str>);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubstringFilter<'a> {
    pub filter_type: LdapString<'a>,
    pub substrings: Vec<Substring<'a>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Substring<'a> {
    Initial(AssertionValue<'a>),
    Any(AssertionValue<'a>),
    Final(AssertionValue<'a>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssertionValue<'a>(pub Cow<'a, [u8]>);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeValue<'a>(pub Cow<'a, [u8]>);

fn decode_ava<'a>(r: &mut SliceReader<'a>) -> BerResult<AttributeValueAssertion<'a>> {
    let attribute_desc = decode_ldap_string(r)?;
    let assertion_value = Cow::Borrowed(r.read_octet_string()?);
    Ok(AttributeValueAssertion {
        attribute_desc,
        assertion_value,
    })
}

fn encode_ava(w: &mut SliceWriter, ava: &AttributeValueAssertion) {
    w.write_octet_string(ava.attribute_desc.0.as_bytes());
    w.write_octet_string(&ava.assertion_value);
}

fn decode_ldap_string<'a>(r: &mut SliceReader<'a>) -> BerResult<LdapString<'a>> {
    let bytes = r.read_octet_string()?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| BerError::Malformed("LDAPString must be UTF-8".into()))?;
    Ok(LdapString(Cow::Borrowed(s)))
}

impl<'a> Filter<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> BerResult<Filter<'a>> {
        Self::decode_at_depth(r, 0)
    }

    fn decode_at_depth(r: &mut SliceReader<'a>, depth: usize) -> BerResult<Filter<'a>> {
        if depth > MAX_FILTER_DEPTH {
            return Err(BerError::RecursionLimitExceeded {
                limit: MAX_FILTER_DEPTH,
            });
        }
        let tag = r.peek_tag()?;
        if tag.class != Class::ContextSpecific {
            return Err(BerError::Malformed(
                "Filter CHOICE tag must be context-specific".into(),
            ));
        }
        match tag.number {
            0 => {
                let h = r.begin_tagged(Class::ContextSpecific, 0)?;
                let mut filters = Vec::new();
                while r.has_more_elements(&h) {
                    filters.push(Filter::decode_at_depth(r, depth + 1)?);
                }
                r.end_sequence(h)?;
                Ok(Filter::And(filters))
            }
            1 => {
                let h = r.begin_tagged(Class::ContextSpecific, 1)?;
                let mut filters = Vec::new();
                while r.has_more_elements(&h) {
                    filters.push(Filter::decode_at_depth(r, depth + 1)?);
                }
                r.end_sequence(h)?;
                Ok(Filter::Or(filters))
            }
            2 => {
                let h = r.begin_tagged(Class::ContextSpecific, 2)?;
                let inner = Filter::decode_at_depth(r, depth + 1)?;
                r.end_sequence(h)?;
                Ok(Filter::Not(Box::new(inner)))
            }
            3 => {
                let h = r.begin_tagged(Class::ContextSpecific, 3)?;
                let ava = decode_ava(r)?;
                r.end_sequence(h)?;
                Ok(Filter::EqualityMatch(ava))
            }
            4 => {
                let h = r.begin_tagged(Class::ContextSpecific, 4)?;
                let filter_type = decode_ldap_string(r)?;
                let seq = r.begin_sequence()?;
                let mut substrings = Vec::new();
                while r.has_more_elements(&seq) {
                    substrings.push(decode_substring(r)?);
                }
                r.end_sequence(seq)?;
                r.end_sequence(h)?;
                if substrings.is_empty() {
                    return Err(BerError::Malformed(
                        "SubstringFilter must have at least one substring".into(),
                    ));
                }
                Ok(Filter::Substrings(SubstringFilter {
                    filter_type,
                    substrings,
                }))
            }
            5 => {
                let h = r.begin_tagged(Class::ContextSpecific, 5)?;
                let ava = decode_ava(r)?;
                r.end_sequence(h)?;
                Ok(Filter::GreaterOrEqual(ava))
            }
            6 => {
                let h = r.begin_tagged(Class::ContextSpecific, 6)?;
                let ava = decode_ava(r)?;
                r.end_sequence(h)?;
                Ok(Filter::LessOrEqual(ava))
            }
            7 => {
                let content = r.read_tagged_primitive(Class::ContextSpecific, 7)?;
                let s = std::str::from_utf8(content)
                    .map_err(|_| BerError::Malformed("AttributeDescription must be UTF-8".into()))?;
                Ok(Filter::Present(LdapString(Cow::Borrowed(s))))
            }
            8 => {
                let h = r.begin_tagged(Class::ContextSpecific, 8)?;
                let ava = decode_ava(r)?;
                r.end_sequence(h)?;
                Ok(Filter::ApproxMatch(ava))
            }
            9 => {
                let h = r.begin_tagged(Class::ContextSpecific, 9)?;
                let assertion = decode_matching_rule_assertion(r, &h)?;
                r.end_sequence(h)?;
                Ok(Filter::ExtensibleMatch(assertion))
            }
            other => Err(BerError::Malformed(format!(
                "unknown Filter CHOICE tag {other}"
            ))),
        }
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        match self {
            Filter::And(filters) => {
                let h = w.begin_tagged(Class::ContextSpecific, 0, true);
                for f in filters {
                    f.encode(w);
                }
                w.end_sequence(h);
            }
            Filter::Or(filters) => {
                let h = w.begin_tagged(Class::ContextSpecific, 1, true);
                for f in filters {
                    f.encode(w);
                }
                w.end_sequence(h);
            }
            Filter::Not(inner) => {
                let h = w.begin_tagged(Class::ContextSpecific, 2, true);
                inner.encode(w);
                w.end_sequence(h);
            }
            Filter::EqualityMatch(ava) => {
                let h = w.begin_tagged(Class::ContextSpecific, 3, true);
                encode_ava(w, ava);
                w.end_sequence(h);
            }
            Filter::Substrings(sf) => {
                let h = w.begin_tagged(Class::ContextSpecific, 4, true);
                w.write_octet_string(sf.filter_type.0.as_bytes());
                let seq = w.begin_sequence();
                for s in &sf.substrings {
                    encode_substring(w, s);
                }
                w.end_sequence(seq);
                w.end_sequence(h);
            }
            Filter::GreaterOrEqual(ava) => {
                let h = w.begin_tagged(Class::ContextSpecific, 5, true);
                encode_ava(w, ava);
                w.end_sequence(h);
            }
            Filter::LessOrEqual(ava) => {
                let h = w.begin_tagged(Class::ContextSpecific, 6, true);
                encode_ava(w, ava);
                w.end_sequence(h);
            }
            Filter::Present(s) => {
                w.write_tagged_primitive(Class::ContextSpecific, 7, s.0.as_bytes());
            }
            Filter::ApproxMatch(ava) => {
                let h = w.begin_tagged(Class::ContextSpecific, 8, true);
                encode_ava(w, ava);
                w.end_sequence(h);
            }
            Filter::ExtensibleMatch(mra) => {
                let h = w.begin_tagged(Class::ContextSpecific, 9, true);
                if let Some(rule) = &mra.matching_rule {
                    w.write_tagged_primitive(Class::ContextSpecific, 1, rule.0.as_bytes());
                }
                if let Some(rule_type) = &mra.rule_type {
                    w.write_tagged_primitive(Class::ContextSpecific, 2, rule_type.0.as_bytes());
                }
                w.write_tagged_primitive(Class::ContextSpecific, 3, &mra.assertion_value.0);
                if mra.dn_attributes {
                    let content = [0xff];
                    w.write_tagged_primitive(Class::ContextSpecific, 4, &content);
                }
                w.end_sequence(h);
            }
        }
    }
}

fn decode_substring<'a>(r: &mut SliceReader<'a>) -> BerResult<Substring<'a>> {
    let tag = r.peek_tag()?;
    if tag.class != Class::ContextSpecific {
        return Err(BerError::Malformed(
            "substring CHOICE tag must be context-specific".into(),
        ));
    }
    match tag.number {
        0 => {
            let content = r.read_tagged_primitive(Class::ContextSpecific, 0)?;
            Ok(Substring::Initial(AssertionValue(Cow::Borrowed(content))))
        }
        1 => {
            let content = r.read_tagged_primitive(Class::ContextSpecific, 1)?;
            Ok(Substring::Any(AssertionValue(Cow::Borrowed(content))))
        }
        2 => {
            let content = r.read_tagged_primitive(Class::ContextSpecific, 2)?;
            Ok(Substring::Final(AssertionValue(Cow::Borrowed(content))))
        }
        other => Err(BerError::Malformed(format!(
            "unknown substring CHOICE tag {other}"
        ))),
    }
}

fn encode_substring(w: &mut SliceWriter, s: &Substring) {
    match s {
        Substring::Initial(v) => w.write_tagged_primitive(Class::ContextSpecific, 0, &v.0),
        Substring::Any(v) => w.write_tagged_primitive(Class::ContextSpecific, 1, &v.0),
        Substring::Final(v) => w.write_tagged_primitive(Class::ContextSpecific, 2, &v.0),
    }
}

/// `MatchingRuleAssertion ::= SEQUENCE { matchingRule [1] OPTIONAL, type [2]
/// OPTIONAL, matchValue [3], dnAttributes [4] DEFAULT FALSE }`. `matchValue`
/// is mandatory; the handle bounds how far optional-field lookahead may go.
fn decode_matching_rule_assertion<'a>(
    r: &mut SliceReader<'a>,
    h: &crate::ber::reader::SequenceHandle,
) -> BerResult<MatchingRuleAssertion<'a>> {
    let mut matching_rule = None;
    let mut rule_type = None;
    if r.has_more_elements(h) && r.peek_tag()?.number == 1 {
        let content = r.read_tagged_primitive(Class::ContextSpecific, 1)?;
        let s = std::str::from_utf8(content)
            .map_err(|_| BerError::Malformed("matchingRule must be UTF-8".into()))?;
        matching_rule = Some(LdapString(Cow::Borrowed(s)));
    }
    if r.has_more_elements(h) && r.peek_tag()?.number == 2 {
        let content = r.read_tagged_primitive(Class::ContextSpecific, 2)?;
        let s = std::str::from_utf8(content)
            .map_err(|_| BerError::Malformed("matching rule type must be UTF-8".into()))?;
        rule_type = Some(AttributeDescription(Cow::Borrowed(s)));
    }
    let value_content = r.read_tagged_primitive(Class::ContextSpecific, 3)?;
    let assertion_value = AssertionValue(Cow::Borrowed(value_content));
    let mut dn_attributes = false;
    if r.has_more_elements(h) && r.peek_tag()?.number == 4 {
        let content = r.read_tagged_primitive(Class::ContextSpecific, 4)?;
        dn_attributes = content.iter().any(|&b| b != 0);
    }
    Ok(MatchingRuleAssertion {
        matching_rule,
        rule_type,
        assertion_value,
        dn_attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_filter_roundtrip() {
        let filter = Filter::Present(LdapString(Cow::Borrowed("cn")));
        let mut w = SliceWriter::new();
        filter.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0x87, 0x02, b'c', b'n']);
        let mut r = SliceReader::new(&bytes);
        let decoded = Filter::decode(&mut r).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn equality_filter_roundtrip() {
        let filter = Filter::EqualityMatch(AttributeValueAssertion {
            attribute_desc: LdapString(Cow::Borrowed("mail")),
            assertion_value: Cow::Borrowed(b"a@b"),
        });
        let mut w = SliceWriter::new();
        filter.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = SliceReader::new(&bytes);
        let decoded = Filter::decode(&mut r).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn and_or_not_nest_correctly() {
        let inner = Filter::Present(LdapString(Cow::Borrowed("objectClass")));
        let filter = Filter::And(vec![
            inner.clone(),
            Filter::Not(Box::new(inner)),
        ]);
        let mut w = SliceWriter::new();
        filter.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = SliceReader::new(&bytes);
        let decoded = Filter::decode(&mut r).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn substrings_filter_roundtrip() {
        let filter = Filter::Substrings(SubstringFilter {
            filter_type: LdapString(Cow::Borrowed("cn")),
            substrings: vec![
                Substring::Initial(AssertionValue(Cow::Borrowed(b"Al"))),
                Substring::Any(AssertionValue(Cow::Borrowed(b"c"))),
                Substring::Final(AssertionValue(Cow::Borrowed(b"e"))),
            ],
        });
        let mut w = SliceWriter::new();
        filter.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = SliceReader::new(&bytes);
        let decoded = Filter::decode(&mut r).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn deeply_nested_filter_hits_recursion_limit() {
        let mut w = SliceWriter::new();
        let mut handles = Vec::new();
        for _ in 0..(MAX_FILTER_DEPTH + 10) {
            handles.push(w.begin_tagged(Class::ContextSpecific, 2, true));
        }
        w.write_tagged_primitive(Class::ContextSpecific, 7, b"cn");
        for h in handles.into_iter().rev() {
            w.end_sequence(h);
        }
        let bytes = w.into_bytes();
        let mut r = SliceReader::new(&bytes);
        let result = Filter::decode(&mut r);
        assert!(matches!(
            result,
            Err(BerError::RecursionLimitExceeded { .. })
        ));
    }
}
