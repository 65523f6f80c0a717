//! Wire encoding/decoding for [`LdapMessage`] and every [`ProtocolOp`]
//! variant, built on the streaming [`SliceReader`]/[`SliceWriter`] pair.
//!
//! Each variant owns exactly one APPLICATION tag (RFC 4511 §4.1.1); encoding
//! opens a constructed tagged sequence, writes children in the order the
//! grammar declares them, and closes it. Decoding asserts the tag and reads
//! children positionally, the same discipline the design notes call for.

use std::borrow::Cow;
use std::convert::TryFrom;

use crate::ber::reader::SliceReader;
use crate::ber::writer::SliceWriter;
use crate::ber::Class;
use crate::error::{LdapError, Result};
use crate::filter::{Attribute, AttributeValueAssertion, Filter, PartialAttribute};
use crate::ldap::*;

fn read_ldap_dn<'a>(r: &mut SliceReader<'a>) -> Result<LdapDN<'a>> {
    let bytes = r.read_octet_string()?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| LdapError::ProtocolViolation("DN must be UTF-8".into()))?;
    Ok(LdapDN(Cow::Borrowed(s)))
}

fn write_ldap_dn(w: &mut SliceWriter, dn: &LdapDN) {
    w.write_octet_string(dn.0.as_bytes());
}

fn read_ldap_string<'a>(r: &mut SliceReader<'a>) -> Result<LdapString<'a>> {
    let bytes = r.read_octet_string()?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| LdapError::ProtocolViolation("LDAPString must be UTF-8".into()))?;
    Ok(LdapString(Cow::Borrowed(s)))
}

fn write_ldap_string(w: &mut SliceWriter, s: &LdapString) {
    w.write_octet_string(s.0.as_bytes());
}

fn read_ldap_oid<'a>(r: &mut SliceReader<'a>) -> Result<LdapOID<'a>> {
    let bytes = r.read_octet_string()?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| LdapError::ProtocolViolation("LDAPOID must be UTF-8".into()))?;
    Ok(LdapOID(Cow::Borrowed(s)))
}

fn write_ldap_oid(w: &mut SliceWriter, oid: &LdapOID) {
    w.write_octet_string(oid.0.as_bytes());
}

fn read_ldap_result<'a>(r: &mut SliceReader<'a>) -> Result<LdapResult<'a>> {
    let result_code = ResultCode(r.read_enum_u32()?);
    let matched_dn = read_ldap_dn(r)?;
    let diagnostic_message = read_ldap_string(r)?;
    let referral = read_opt_referral(r)?;
    Ok(LdapResult {
        result_code,
        matched_dn,
        diagnostic_message,
        referral,
    })
}

fn write_ldap_result(w: &mut SliceWriter, result: &LdapResult) {
    w.write_enumerated(result.result_code.0 as i128);
    write_ldap_dn(w, &result.matched_dn);
    write_ldap_string(w, &result.diagnostic_message);
    write_opt_referral(w, &result.referral);
}

/// `referral [3] SEQUENCE OF LDAPURL OPTIONAL`, present only when the
/// result carries at least one referral URL.
fn read_opt_referral<'a>(r: &mut SliceReader<'a>) -> Result<Vec<LdapString<'a>>> {
    if r.is_empty() {
        return Ok(Vec::new());
    }
    let tag = r.peek_tag().map_err(LdapError::from)?;
    if tag.class != Class::ContextSpecific || tag.number != 3 {
        return Ok(Vec::new());
    }
    let h = r.begin_tagged(Class::ContextSpecific, 3)?;
    let mut referral = Vec::new();
    while r.has_more_elements(&h) {
        referral.push(read_ldap_string(r)?);
    }
    r.end_sequence(h)?;
    Ok(referral)
}

fn write_opt_referral(w: &mut SliceWriter, referral: &[LdapString]) {
    if referral.is_empty() {
        return;
    }
    let h = w.begin_tagged(Class::ContextSpecific, 3, true);
    for uri in referral {
        write_ldap_string(w, uri);
    }
    w.end_sequence(h);
}

fn read_attr_type_and_values<'a>(
    r: &mut SliceReader<'a>,
) -> Result<(LdapString<'a>, Vec<crate::filter::AttributeValue<'a>>)> {
    let h = r.begin_sequence()?;
    let attr_type = read_ldap_string(r)?;
    let set = r.begin_sequence()?;
    let mut attr_vals = Vec::new();
    while r.has_more_elements(&set) {
        attr_vals.push(crate::filter::AttributeValue(Cow::Borrowed(
            r.read_octet_string()?,
        )));
    }
    r.end_sequence(set)?;
    r.end_sequence(h)?;
    Ok((attr_type, attr_vals))
}

fn write_attr_type_and_values(
    w: &mut SliceWriter,
    attr_type: &LdapString,
    attr_vals: &[crate::filter::AttributeValue],
) {
    let h = w.begin_sequence();
    write_ldap_string(w, attr_type);
    let set = w.begin_set();
    for v in attr_vals {
        w.write_octet_string(&v.0);
    }
    w.end_sequence(set);
    w.end_sequence(h);
}

fn read_partial_attribute<'a>(r: &mut SliceReader<'a>) -> Result<PartialAttribute<'a>> {
    let (attr_type, attr_vals) = read_attr_type_and_values(r)?;
    Ok(PartialAttribute {
        attr_type,
        attr_vals,
    })
}

fn write_partial_attribute(w: &mut SliceWriter, attr: &PartialAttribute) {
    write_attr_type_and_values(w, &attr.attr_type, &attr.attr_vals);
}

fn read_attribute<'a>(r: &mut SliceReader<'a>) -> Result<Attribute<'a>> {
    let (attr_type, attr_vals) = read_attr_type_and_values(r)?;
    if attr_vals.is_empty() {
        return Err(LdapError::ProtocolViolation(
            "Attribute must carry at least one value".into(),
        ));
    }
    Ok(Attribute {
        attr_type,
        attr_vals,
    })
}

fn write_attribute(w: &mut SliceWriter, attr: &Attribute) -> Result<()> {
    if attr.attr_vals.is_empty() {
        return Err(LdapError::ProtocolViolation(
            "Attribute must carry at least one value".into(),
        ));
    }
    write_attr_type_and_values(w, &attr.attr_type, &attr.attr_vals);
    Ok(())
}

impl<'a> BindRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<BindRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 0)?;
        let version = r.read_u32()?;
        if version == 0 || version > 127 {
            return Err(LdapError::ProtocolViolation(
                "BindRequest version must be in 1..127".into(),
            ));
        }
        let name = read_ldap_dn(r)?;
        let authentication = AuthenticationChoice::decode(r)?;
        r.end_sequence(h)?;
        Ok(BindRequest {
            version: version as u8,
            name,
            authentication,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 0, true);
        w.write_integer(self.version as i128);
        write_ldap_dn(w, &self.name);
        self.authentication.encode(w);
        w.end_sequence(h);
    }
}

impl<'a> AuthenticationChoice<'a> {
    fn decode(r: &mut SliceReader<'a>) -> Result<AuthenticationChoice<'a>> {
        let tag = r.peek_tag()?;
        match tag.number {
            0 => {
                let content = r.read_tagged_primitive(Class::ContextSpecific, 0)?;
                Ok(AuthenticationChoice::Simple(Cow::Borrowed(content)))
            }
            3 => {
                let h = r.begin_tagged(Class::ContextSpecific, 3)?;
                let mechanism = read_ldap_string(r)?;
                let credentials = r
                    .read_opt_tagged_primitive(Class::Universal, crate::ber::universal::OCTET_STRING)
                    .map_err(LdapError::from)?
                    .map(Cow::Borrowed);
                r.end_sequence(h)?;
                Ok(AuthenticationChoice::Sasl(SaslCredentials {
                    mechanism,
                    credentials,
                }))
            }
            other => Err(LdapError::ProtocolViolation(format!(
                "unknown AuthenticationChoice tag {other}"
            ))),
        }
    }

    fn encode(&self, w: &mut SliceWriter) {
        match self {
            AuthenticationChoice::Simple(bytes) => {
                w.write_tagged_primitive(Class::ContextSpecific, 0, bytes)
            }
            AuthenticationChoice::Sasl(creds) => {
                let h = w.begin_tagged(Class::ContextSpecific, 3, true);
                write_ldap_string(w, &creds.mechanism);
                if let Some(c) = &creds.credentials {
                    w.write_octet_string(c);
                }
                w.end_sequence(h);
            }
        }
    }
}

impl<'a> BindResponse<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<BindResponse<'a>> {
        let h = r.begin_tagged(Class::Application, 1)?;
        let result = read_ldap_result(r)?;
        let server_sasl_creds = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 7)
            .map_err(LdapError::from)?
            .map(Cow::Borrowed);
        r.end_sequence(h)?;
        Ok(BindResponse {
            result,
            server_sasl_creds,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 1, true);
        write_ldap_result(w, &self.result);
        if let Some(creds) = &self.server_sasl_creds {
            w.write_tagged_primitive(Class::ContextSpecific, 7, creds);
        }
        w.end_sequence(h);
    }
}

fn decode_unbind_request(r: &mut SliceReader) -> Result<()> {
    // UnbindRequest ::= [APPLICATION 2] NULL, but some clients emit it with
    // genuinely empty content rather than an explicit NULL child.
    let h = r.begin_tagged(Class::Application, 2)?;
    if r.has_more_elements(&h) {
        r.read_null()?;
    }
    r.end_sequence(h)?;
    Ok(())
}

fn encode_unbind_request(w: &mut SliceWriter) {
    let h = w.begin_tagged(Class::Application, 2, true);
    w.end_sequence(h);
}

impl<'a> SearchRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<SearchRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 3)?;
        let base_object = read_ldap_dn(r)?;
        let scope = SearchScope(r.read_enum_u32()?);
        let deref_aliases = DerefAliases(r.read_enum_u32()?);
        let size_limit = r.read_u32()?;
        let time_limit = r.read_u32()?;
        let types_only = r.read_boolean()?;
        let filter = Filter::decode(r).map_err(LdapError::from)?;
        let attrs_handle = r.begin_sequence()?;
        let mut attributes = Vec::new();
        while r.has_more_elements(&attrs_handle) {
            attributes.push(read_ldap_string(r)?);
        }
        r.end_sequence(attrs_handle)?;
        r.end_sequence(h)?;
        Ok(SearchRequest {
            base_object,
            scope,
            deref_aliases,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 3, true);
        write_ldap_dn(w, &self.base_object);
        w.write_enumerated(self.scope.0 as i128);
        w.write_enumerated(self.deref_aliases.0 as i128);
        w.write_integer(self.size_limit as i128);
        w.write_integer(self.time_limit as i128);
        w.write_boolean(self.types_only);
        self.filter.encode(w);
        let attrs = w.begin_sequence();
        for a in &self.attributes {
            write_ldap_string(w, a);
        }
        w.end_sequence(attrs);
        w.end_sequence(h);
    }
}

impl<'a> SearchResultEntry<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<SearchResultEntry<'a>> {
        let h = r.begin_tagged(Class::Application, 4)?;
        let object_name = read_ldap_dn(r)?;
        let attrs_handle = r.begin_sequence()?;
        let mut attributes = Vec::new();
        while r.has_more_elements(&attrs_handle) {
            attributes.push(read_partial_attribute(r)?);
        }
        r.end_sequence(attrs_handle)?;
        r.end_sequence(h)?;
        Ok(SearchResultEntry {
            object_name,
            attributes,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 4, true);
        write_ldap_dn(w, &self.object_name);
        let attrs = w.begin_sequence();
        for a in &self.attributes {
            write_partial_attribute(w, a);
        }
        w.end_sequence(attrs);
        w.end_sequence(h);
    }
}

impl<'a> ModifyRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<ModifyRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 6)?;
        let object = read_ldap_dn(r)?;
        let changes_handle = r.begin_sequence()?;
        let mut changes = Vec::new();
        while r.has_more_elements(&changes_handle) {
            changes.push(decode_change(r)?);
        }
        r.end_sequence(changes_handle)?;
        r.end_sequence(h)?;
        if changes.is_empty() {
            return Err(LdapError::ProtocolViolation(
                "ModifyRequest must carry at least one change".into(),
            ));
        }
        Ok(ModifyRequest { object, changes })
    }

    pub fn encode(&self, w: &mut SliceWriter) -> Result<()> {
        if self.changes.is_empty() {
            return Err(LdapError::ProtocolViolation(
                "ModifyRequest must carry at least one change".into(),
            ));
        }
        let h = w.begin_tagged(Class::Application, 6, true);
        write_ldap_dn(w, &self.object);
        let changes = w.begin_sequence();
        for c in &self.changes {
            encode_change(w, c);
        }
        w.end_sequence(changes);
        w.end_sequence(h);
        Ok(())
    }
}

fn decode_change<'a>(r: &mut SliceReader<'a>) -> Result<Change<'a>> {
    let h = r.begin_sequence()?;
    let operation = Operation(r.read_enum_u32()?);
    let modification = read_partial_attribute(r)?;
    r.end_sequence(h)?;
    Ok(Change {
        operation,
        modification,
    })
}

fn encode_change(w: &mut SliceWriter, change: &Change) {
    let h = w.begin_sequence();
    w.write_enumerated(change.operation.0 as i128);
    write_partial_attribute(w, &change.modification);
    w.end_sequence(h);
}

impl<'a> AddRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<AddRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 8)?;
        let entry = read_ldap_dn(r)?;
        let attrs_handle = r.begin_sequence()?;
        let mut attributes = Vec::new();
        while r.has_more_elements(&attrs_handle) {
            attributes.push(read_attribute(r)?);
        }
        r.end_sequence(attrs_handle)?;
        r.end_sequence(h)?;
        Ok(AddRequest { entry, attributes })
    }

    pub fn encode(&self, w: &mut SliceWriter) -> Result<()> {
        let h = w.begin_tagged(Class::Application, 8, true);
        write_ldap_dn(w, &self.entry);
        let attrs = w.begin_sequence();
        for a in &self.attributes {
            write_attribute(w, a)?;
        }
        w.end_sequence(attrs);
        w.end_sequence(h);
        Ok(())
    }
}

fn decode_del_request<'a>(r: &mut SliceReader<'a>) -> Result<LdapDN<'a>> {
    let content = r.read_tagged_primitive(Class::Application, 10)?;
    let s = std::str::from_utf8(content)
        .map_err(|_| LdapError::ProtocolViolation("DelRequest DN must be UTF-8".into()))?;
    Ok(LdapDN(Cow::Borrowed(s)))
}

fn encode_del_request(w: &mut SliceWriter, dn: &LdapDN) {
    w.write_tagged_primitive(Class::Application, 10, dn.0.as_bytes());
}

impl<'a> ModDnRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<ModDnRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 12)?;
        let entry = read_ldap_dn(r)?;
        let newrdn_bytes = r.read_octet_string()?;
        let newrdn = RelativeLdapDN(Cow::Borrowed(
            std::str::from_utf8(newrdn_bytes)
                .map_err(|_| LdapError::ProtocolViolation("newrdn must be UTF-8".into()))?,
        ));
        let deleteoldrdn = r.read_boolean()?;
        let newsuperior = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 0)
            .map_err(LdapError::from)?
            .map(|bytes| {
                std::str::from_utf8(bytes)
                    .map(|s| LdapDN(Cow::Borrowed(s)))
                    .map_err(|_| LdapError::ProtocolViolation("newSuperior must be UTF-8".into()))
            })
            .transpose()?;
        r.end_sequence(h)?;
        Ok(ModDnRequest {
            entry,
            newrdn,
            deleteoldrdn,
            newsuperior,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 12, true);
        write_ldap_dn(w, &self.entry);
        w.write_octet_string(self.newrdn.0.as_bytes());
        w.write_boolean(self.deleteoldrdn);
        if let Some(superior) = &self.newsuperior {
            w.write_tagged_primitive(Class::ContextSpecific, 0, superior.0.as_bytes());
        }
        w.end_sequence(h);
    }
}

impl<'a> CompareRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<CompareRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 14)?;
        let entry = read_ldap_dn(r)?;
        let ava_handle = r.begin_sequence()?;
        let attribute_desc = read_ldap_string(r)?;
        let assertion_value = Cow::Borrowed(r.read_octet_string()?);
        r.end_sequence(ava_handle)?;
        r.end_sequence(h)?;
        Ok(CompareRequest {
            entry,
            ava: AttributeValueAssertion {
                attribute_desc,
                assertion_value,
            },
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 14, true);
        write_ldap_dn(w, &self.entry);
        let ava = w.begin_sequence();
        write_ldap_string(w, &self.ava.attribute_desc);
        w.write_octet_string(&self.ava.assertion_value);
        w.end_sequence(ava);
        w.end_sequence(h);
    }
}

fn decode_abandon_request(r: &mut SliceReader) -> Result<MessageID> {
    let content = r.read_tagged_primitive(Class::Application, 16)?;
    let id = crate::ber::decode_integer_bytes(content).map_err(LdapError::from)?;
    Ok(MessageID(id as i32))
}

fn encode_abandon_request(w: &mut SliceWriter, id: MessageID) {
    let content = crate::ber::encode_integer_bytes(id.0 as i128);
    w.write_tagged_primitive(Class::Application, 16, &content);
}

fn decode_search_result_reference<'a>(r: &mut SliceReader<'a>) -> Result<Vec<LdapString<'a>>> {
    let h = r.begin_tagged(Class::Application, 19)?;
    let mut uris = Vec::new();
    while r.has_more_elements(&h) {
        uris.push(read_ldap_string(r)?);
    }
    r.end_sequence(h)?;
    if uris.is_empty() {
        return Err(LdapError::ProtocolViolation(
            "SearchResultReference must carry at least one URI".into(),
        ));
    }
    Ok(uris)
}

fn encode_search_result_reference(w: &mut SliceWriter, uris: &[LdapString]) -> Result<()> {
    if uris.is_empty() {
        return Err(LdapError::ProtocolViolation(
            "SearchResultReference must carry at least one URI".into(),
        ));
    }
    let h = w.begin_tagged(Class::Application, 19, true);
    for u in uris {
        write_ldap_string(w, u);
    }
    w.end_sequence(h);
    Ok(())
}

impl<'a> ExtendedRequest<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<ExtendedRequest<'a>> {
        let h = r.begin_tagged(Class::Application, 23)?;
        let name_content = r.read_tagged_primitive(Class::ContextSpecific, 0)?;
        let request_name = LdapOID(Cow::Borrowed(
            std::str::from_utf8(name_content)
                .map_err(|_| LdapError::ProtocolViolation("requestName must be UTF-8".into()))?,
        ));
        let request_value = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 1)
            .map_err(LdapError::from)?
            .map(Cow::Borrowed);
        r.end_sequence(h)?;
        Ok(ExtendedRequest {
            request_name,
            request_value,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 23, true);
        w.write_tagged_primitive(Class::ContextSpecific, 0, self.request_name.0.as_bytes());
        if let Some(v) = &self.request_value {
            w.write_tagged_primitive(Class::ContextSpecific, 1, v);
        }
        w.end_sequence(h);
    }
}

impl<'a> ExtendedResponse<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<ExtendedResponse<'a>> {
        let h = r.begin_tagged(Class::Application, 24)?;
        let result = read_ldap_result(r)?;
        let response_name = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 10)
            .map_err(LdapError::from)?
            .map(|b| {
                std::str::from_utf8(b)
                    .map(|s| LdapOID(Cow::Borrowed(s)))
                    .map_err(|_| LdapError::ProtocolViolation("responseName must be UTF-8".into()))
            })
            .transpose()?;
        let response_value = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 11)
            .map_err(LdapError::from)?
            .map(Cow::Borrowed);
        r.end_sequence(h)?;
        Ok(ExtendedResponse {
            result,
            response_name,
            response_value,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 24, true);
        write_ldap_result(w, &self.result);
        if let Some(name) = &self.response_name {
            w.write_tagged_primitive(Class::ContextSpecific, 10, name.0.as_bytes());
        }
        if let Some(v) = &self.response_value {
            w.write_tagged_primitive(Class::ContextSpecific, 11, v);
        }
        w.end_sequence(h);
    }
}

impl<'a> IntermediateResponse<'a> {
    pub fn decode(r: &mut SliceReader<'a>) -> Result<IntermediateResponse<'a>> {
        let h = r.begin_tagged(Class::Application, 25)?;
        let response_name = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 0)
            .map_err(LdapError::from)?
            .map(|b| {
                std::str::from_utf8(b)
                    .map(|s| LdapOID(Cow::Borrowed(s)))
                    .map_err(|_| LdapError::ProtocolViolation("responseName must be UTF-8".into()))
            })
            .transpose()?;
        let response_value = r
            .read_opt_tagged_primitive(Class::ContextSpecific, 1)
            .map_err(LdapError::from)?
            .map(Cow::Borrowed);
        r.end_sequence(h)?;
        Ok(IntermediateResponse {
            response_name,
            response_value,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_tagged(Class::Application, 25, true);
        if let Some(name) = &self.response_name {
            w.write_tagged_primitive(Class::ContextSpecific, 0, name.0.as_bytes());
        }
        if let Some(v) = &self.response_value {
            w.write_tagged_primitive(Class::ContextSpecific, 1, v);
        }
        w.end_sequence(h);
    }
}

fn decode_generic_response<'a>(r: &mut SliceReader<'a>, tag: u32) -> Result<LdapResult<'a>> {
    let h = r.begin_tagged(Class::Application, tag)?;
    let result = read_ldap_result(r)?;
    r.end_sequence(h)?;
    Ok(result)
}

fn encode_generic_response(w: &mut SliceWriter, tag: u32, result: &LdapResult) {
    let h = w.begin_tagged(Class::Application, tag, true);
    write_ldap_result(w, result);
    w.end_sequence(h);
}

impl<'a> ProtocolOp<'a> {
    /// Decode a `protocolOp` CHOICE, dispatching on its APPLICATION tag.
    /// An unrecognized tag is a protocol error rather than a skip — the
    /// posture this crate inherited is to reject, not silently ignore.
    pub fn decode(r: &mut SliceReader<'a>) -> Result<ProtocolOp<'a>> {
        let tag = r.peek_tag().map_err(LdapError::from)?;
        if tag.class != Class::Application {
            return Err(LdapError::ProtocolViolation(
                "protocolOp must be an APPLICATION-tagged CHOICE".into(),
            ));
        }
        match tag.number {
            0 => Ok(ProtocolOp::BindRequest(BindRequest::decode(r)?)),
            1 => Ok(ProtocolOp::BindResponse(BindResponse::decode(r)?)),
            2 => {
                decode_unbind_request(r)?;
                Ok(ProtocolOp::UnbindRequest)
            }
            3 => Ok(ProtocolOp::SearchRequest(SearchRequest::decode(r)?)),
            4 => Ok(ProtocolOp::SearchResultEntry(SearchResultEntry::decode(
                r,
            )?)),
            5 => Ok(ProtocolOp::SearchResultDone(decode_generic_response(r, 5)?)),
            6 => Ok(ProtocolOp::ModifyRequest(ModifyRequest::decode(r)?)),
            7 => Ok(ProtocolOp::ModifyResponse(ModifyResponse {
                result: decode_generic_response(r, 7)?,
            })),
            8 => Ok(ProtocolOp::AddRequest(AddRequest::decode(r)?)),
            9 => Ok(ProtocolOp::AddResponse(decode_generic_response(r, 9)?)),
            10 => Ok(ProtocolOp::DelRequest(decode_del_request(r)?)),
            11 => Ok(ProtocolOp::DelResponse(decode_generic_response(r, 11)?)),
            12 => Ok(ProtocolOp::ModDnRequest(ModDnRequest::decode(r)?)),
            13 => Ok(ProtocolOp::ModDnResponse(decode_generic_response(r, 13)?)),
            14 => Ok(ProtocolOp::CompareRequest(CompareRequest::decode(r)?)),
            15 => Ok(ProtocolOp::CompareResponse(decode_generic_response(
                r, 15,
            )?)),
            16 => Ok(ProtocolOp::AbandonRequest(decode_abandon_request(r)?)),
            19 => Ok(ProtocolOp::SearchResultReference(
                decode_search_result_reference(r)?,
            )),
            23 => Ok(ProtocolOp::ExtendedRequest(ExtendedRequest::decode(r)?)),
            24 => Ok(ProtocolOp::ExtendedResponse(ExtendedResponse::decode(r)?)),
            25 => Ok(ProtocolOp::IntermediateResponse(
                IntermediateResponse::decode(r)?,
            )),
            other => {
                log::warn!("rejecting protocolOp with unknown APPLICATION tag {other}");
                Err(LdapError::ProtocolViolation(format!(
                    "unknown protocolOp APPLICATION tag {other}"
                )))
            }
        }
    }

    /// Encode the `protocolOp` CHOICE. Fails if the variant's payload
    /// violates an invariant `decode` would have rejected too: an empty
    /// `ModifyRequest.changes`, a value-less `Attribute`, or an empty
    /// `SearchResultReference`.
    pub fn encode(&self, w: &mut SliceWriter) -> Result<()> {
        match self {
            ProtocolOp::BindRequest(req) => {
                req.encode(w);
                Ok(())
            }
            ProtocolOp::BindResponse(resp) => {
                resp.encode(w);
                Ok(())
            }
            ProtocolOp::UnbindRequest => {
                encode_unbind_request(w);
                Ok(())
            }
            ProtocolOp::SearchRequest(req) => {
                req.encode(w);
                Ok(())
            }
            ProtocolOp::SearchResultEntry(entry) => {
                entry.encode(w);
                Ok(())
            }
            ProtocolOp::SearchResultDone(result) => {
                encode_generic_response(w, 5, result);
                Ok(())
            }
            ProtocolOp::ModifyRequest(req) => req.encode(w),
            ProtocolOp::ModifyResponse(resp) => {
                encode_generic_response(w, 7, &resp.result);
                Ok(())
            }
            ProtocolOp::AddRequest(req) => req.encode(w),
            ProtocolOp::AddResponse(result) => {
                encode_generic_response(w, 9, result);
                Ok(())
            }
            ProtocolOp::DelRequest(dn) => {
                encode_del_request(w, dn);
                Ok(())
            }
            ProtocolOp::DelResponse(result) => {
                encode_generic_response(w, 11, result);
                Ok(())
            }
            ProtocolOp::ModDnRequest(req) => {
                req.encode(w);
                Ok(())
            }
            ProtocolOp::ModDnResponse(result) => {
                encode_generic_response(w, 13, result);
                Ok(())
            }
            ProtocolOp::CompareRequest(req) => {
                req.encode(w);
                Ok(())
            }
            ProtocolOp::CompareResponse(result) => {
                encode_generic_response(w, 15, result);
                Ok(())
            }
            ProtocolOp::AbandonRequest(id) => {
                encode_abandon_request(w, *id);
                Ok(())
            }
            ProtocolOp::SearchResultReference(uris) => encode_search_result_reference(w, uris),
            ProtocolOp::ExtendedRequest(req) => {
                req.encode(w);
                Ok(())
            }
            ProtocolOp::ExtendedResponse(resp) => {
                resp.encode(w);
                Ok(())
            }
            ProtocolOp::IntermediateResponse(resp) => {
                resp.encode(w);
                Ok(())
            }
        }
    }
}

impl<'a> Control<'a> {
    fn decode(r: &mut SliceReader<'a>) -> Result<Control<'a>> {
        let h = r.begin_sequence()?;
        let control_type = read_ldap_oid(r)?;
        let criticality = if r.has_more_elements(&h) && r.peek_tag().map_err(LdapError::from)?.number
            == crate::ber::universal::BOOLEAN
        {
            r.read_boolean()?
        } else {
            false
        };
        let control_value = if r.has_more_elements(&h) {
            Some(Cow::Borrowed(r.read_octet_string()?))
        } else {
            None
        };
        r.end_sequence(h)?;
        Ok(Control {
            control_type,
            criticality,
            control_value,
        })
    }

    fn encode(&self, w: &mut SliceWriter) {
        let h = w.begin_sequence();
        write_ldap_oid(w, &self.control_type);
        if self.criticality {
            w.write_boolean(true);
        }
        if let Some(v) = &self.control_value {
            w.write_octet_string(v);
        }
        w.end_sequence(h);
    }
}

impl<'a> LdapMessage<'a> {
    /// Decode one full `LDAPMessage` SEQUENCE. `controls`, if present, is
    /// the raw opaque list as it appeared on the wire — resolving them
    /// through a [`crate::controls::ControlRegistry`] is a separate step,
    /// since only the caller knows whether this message is a response (and
    /// therefore whether an unrecognized critical control is fatal).
    pub fn decode(r: &mut SliceReader<'a>) -> Result<LdapMessage<'a>> {
        let outer = r.begin_sequence()?;
        let id = r.read_integer().map_err(LdapError::from)?;
        let id = i32::try_from(id)
            .map_err(|_| LdapError::ProtocolViolation("messageID out of i32 range".into()))?;
        if id < 0 {
            return Err(LdapError::ProtocolViolation(
                "messageID must be non-negative".into(),
            ));
        }
        let message_id = MessageID(id);
        let protocol_op = ProtocolOp::decode(r)?;
        let controls = if r.has_more_elements(&outer) {
            let h = r.begin_tagged(Class::ContextSpecific, 0)?;
            let mut controls = Vec::new();
            while r.has_more_elements(&h) {
                controls.push(Control::decode(r)?);
            }
            r.end_sequence(h)?;
            Some(controls)
        } else {
            None
        };
        r.end_sequence(outer)?;
        log::trace!(
            "decoded LDAPMessage id={} op={:?} controls={}",
            message_id.0,
            protocol_op.tag(),
            controls.as_ref().map_or(0, Vec::len)
        );
        Ok(LdapMessage {
            message_id,
            protocol_op,
            controls,
        })
    }

    pub fn encode(&self, w: &mut SliceWriter) -> Result<()> {
        let outer = w.begin_sequence();
        w.write_integer(self.message_id.0 as i128);
        self.protocol_op.encode(w)?;
        if let Some(controls) = &self.controls {
            let h = w.begin_tagged(Class::ContextSpecific, 0, true);
            for c in controls {
                c.encode(w);
            }
            w.end_sequence(h);
        }
        w.end_sequence(outer);
        Ok(())
    }

    /// Decode a whole message from a byte slice, rejecting trailing bytes.
    pub fn from_bytes(input: &'a [u8]) -> Result<LdapMessage<'a>> {
        let mut r = SliceReader::new(input);
        let msg = LdapMessage::decode(&mut r)?;
        if !r.is_empty() {
            return Err(LdapError::ProtocolViolation(
                "trailing bytes after LDAPMessage".into(),
            ));
        }
        Ok(msg)
    }

    /// Encode this message to bytes. Fails under the same conditions
    /// [`LdapMessage::encode`] does: an invalid `protocolOp` payload, such
    /// as an empty `ModifyRequest.changes`, is rejected here rather than
    /// serialized into bytes that wouldn't decode back to the same value.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = SliceWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }
}

/// Decode every complete `LDAPMessage` found in `input`, stopping cleanly at
/// the end of the buffer (no trailing-garbage rejection here, since callers
/// streaming multiple messages legitimately see nothing after the last one).
pub fn decode_messages<'a>(input: &'a [u8]) -> Result<Vec<LdapMessage<'a>>> {
    let mut r = SliceReader::new(input);
    let mut messages = Vec::new();
    while !r.is_empty() {
        messages.push(LdapMessage::decode(&mut r)?);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::{DerefAliases, SearchScope};

    #[test]
    fn modify_request_roundtrip() {
        let msg = LdapMessage {
            message_id: MessageID(7),
            protocol_op: ProtocolOp::ModifyRequest(ModifyRequest {
                object: LdapDN(Cow::Borrowed("dc=example,dc=com")),
                changes: vec![Change {
                    operation: Operation::Replace,
                    modification: PartialAttribute {
                        attr_type: LdapString(Cow::Borrowed("mail")),
                        attr_vals: vec![crate::filter::AttributeValue(Cow::Borrowed(b"a@b"))],
                    },
                }],
            }),
            controls: None,
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x30);
        let decoded = LdapMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.protocol_op.tag(), ProtocolOpTag::ModifyRequest);
    }

    #[test]
    fn search_request_roundtrip_with_filter_and_attributes() {
        let msg = LdapMessage {
            message_id: MessageID(4),
            protocol_op: ProtocolOp::SearchRequest(SearchRequest {
                base_object: LdapDN(Cow::Borrowed("dc=example,dc=com")),
                scope: SearchScope::WholeSubtree,
                deref_aliases: DerefAliases::NeverDerefAliases,
                size_limit: 0,
                time_limit: 0,
                types_only: false,
                filter: Filter::Present(LdapString(Cow::Borrowed("objectClass"))),
                attributes: vec![LdapString(Cow::Borrowed("cn"))],
            }),
            controls: None,
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = LdapMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unbind_request_roundtrip() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::UnbindRequest,
            controls: None,
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = LdapMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_application_tag_is_rejected() {
        let mut w = SliceWriter::new();
        let outer = w.begin_sequence();
        w.write_integer(1);
        let op = w.begin_tagged(Class::Application, 99, true);
        w.write_null();
        w.end_sequence(op);
        w.end_sequence(outer);
        let bytes = w.into_bytes();
        assert!(LdapMessage::from_bytes(&bytes).is_err());
    }

    #[test]
    fn message_with_controls_roundtrip() {
        let msg = LdapMessage {
            message_id: MessageID(2),
            protocol_op: ProtocolOp::UnbindRequest,
            controls: Some(vec![Control {
                control_type: LdapOID(Cow::Borrowed("1.2.3")),
                criticality: true,
                control_value: Some(Cow::Borrowed(b"x")),
            }]),
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = LdapMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn bind_response_with_referral_roundtrips() {
        let msg = LdapMessage {
            message_id: MessageID(3),
            protocol_op: ProtocolOp::BindResponse(BindResponse {
                result: LdapResult {
                    result_code: ResultCode::Referral,
                    matched_dn: LdapDN(Cow::Borrowed("")),
                    diagnostic_message: LdapString(Cow::Borrowed("")),
                    referral: vec![
                        LdapString(Cow::Borrowed("ldap://host1/dc=example,dc=com")),
                        LdapString(Cow::Borrowed("ldap://host2/dc=example,dc=com")),
                    ],
                },
                server_sasl_creds: None,
            }),
            controls: None,
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = LdapMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
        if let ProtocolOp::BindResponse(resp) = &decoded.protocol_op {
            assert_eq!(resp.result.referral.len(), 2);
        } else {
            panic!("expected BindResponse");
        }
    }

    #[test]
    fn generic_response_without_referral_omits_the_tag() {
        // No referrals means the `[3]` tag is absent entirely, not present-but-empty.
        let result = LdapResult {
            result_code: ResultCode::Success,
            matched_dn: LdapDN(Cow::Borrowed("")),
            diagnostic_message: LdapString(Cow::Borrowed("")),
            referral: Vec::new(),
        };
        let mut w = SliceWriter::new();
        write_ldap_result(&mut w, &result);
        let bytes = w.into_bytes();
        let mut r = SliceReader::new(&bytes);
        let decoded = read_ldap_result(&mut r).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn encode_rejects_empty_modify_request_changes() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::ModifyRequest(ModifyRequest {
                object: LdapDN(Cow::Borrowed("dc=example,dc=com")),
                changes: Vec::new(),
            }),
            controls: None,
        };
        assert!(msg.to_bytes().is_err());
    }

    #[test]
    fn encode_rejects_empty_search_result_reference() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::SearchResultReference(Vec::new()),
            controls: None,
        };
        assert!(msg.to_bytes().is_err());
    }

    #[test]
    fn encode_rejects_add_request_attribute_with_no_values() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::AddRequest(AddRequest {
                entry: LdapDN(Cow::Borrowed("dc=example,dc=com")),
                attributes: vec![Attribute {
                    attr_type: LdapString(Cow::Borrowed("cn")),
                    attr_vals: Vec::new(),
                }],
            }),
            controls: None,
        };
        assert!(msg.to_bytes().is_err());
    }

    #[test]
    fn negative_message_id_is_rejected() {
        let mut w = SliceWriter::new();
        let outer = w.begin_sequence();
        w.write_integer(-1);
        let op = w.begin_tagged(Class::Application, 2, true);
        w.end_sequence(op);
        w.end_sequence(outer);
        let bytes = w.into_bytes();
        assert!(LdapMessage::from_bytes(&bytes).is_err());
    }
}
