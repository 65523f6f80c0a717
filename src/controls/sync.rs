//! The content-synchronization control family (RFC 4533 §2.2-§2.5):
//! `SyncRequestControl`, `SyncStateControl`, `SyncDoneControl`, and the
//! `SyncInfoValue` CHOICE delivered as an intermediate response.
//!
//! Control values are themselves BER, independent of the outer
//! `LDAPMessage` they travel in, so each decoder below opens its own
//! [`SliceReader`] over the control's opaque value bytes.

use std::convert::TryInto;

use crate::ber::reader::SliceReader;
use crate::ber::writer::SliceWriter;
use crate::ber::Class;
use crate::error::{LdapError, Result};

pub const OID_SYNC_REQUEST: &str = "1.3.6.1.4.1.4203.1.9.1.1";
pub const OID_SYNC_STATE: &str = "1.3.6.1.4.1.4203.1.9.1.2";
pub const OID_SYNC_DONE: &str = "1.3.6.1.4.1.4203.1.9.1.3";
pub const OID_SYNC_INFO: &str = "1.3.6.1.4.1.4203.1.9.1.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequestMode {
    RefreshOnly,
    RefreshAndPersist,
}

impl SyncRequestMode {
    fn from_wire(v: u32) -> Result<SyncRequestMode> {
        match v {
            1 => Ok(SyncRequestMode::RefreshOnly),
            3 => Ok(SyncRequestMode::RefreshAndPersist),
            other => Err(LdapError::ProtocolViolation(format!(
                "unknown SyncRequestValue mode {other}"
            ))),
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            SyncRequestMode::RefreshOnly => 1,
            SyncRequestMode::RefreshAndPersist => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequestValue {
    pub mode: SyncRequestMode,
    pub cookie: Option<Vec<u8>>,
    pub reload_hint: bool,
}

impl SyncRequestValue {
    /// `SyncRequestValue ::= SEQUENCE { mode ENUMERATED, cookie syncCookie
    /// OPTIONAL, reloadHint BOOLEAN DEFAULT FALSE }`.
    pub fn decode(bytes: &[u8]) -> Result<SyncRequestValue> {
        let mut r = SliceReader::new(bytes);
        let h = r.begin_sequence().map_err(LdapError::from)?;
        let mode = SyncRequestMode::from_wire(r.read_enum_u32().map_err(LdapError::from)?)?;
        let cookie = if r.has_more_elements(&h) && is_octet_string(&r)? {
            Some(r.read_octet_string().map_err(LdapError::from)?.to_vec())
        } else {
            None
        };
        let reload_hint = if r.has_more_elements(&h) {
            r.read_boolean().map_err(LdapError::from)?
        } else {
            false
        };
        r.end_sequence(h).map_err(LdapError::from)?;
        Ok(SyncRequestValue {
            mode,
            cookie,
            reload_hint,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = SliceWriter::new();
        let h = w.begin_sequence();
        w.write_enumerated(self.mode.to_wire() as i128);
        if let Some(cookie) = &self.cookie {
            w.write_octet_string(cookie);
        }
        if self.reload_hint {
            w.write_boolean(true);
        }
        w.end_sequence(h);
        w.into_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStateKind {
    Present,
    Add,
    Modify,
    Delete,
}

impl SyncStateKind {
    fn from_wire(v: u32) -> Result<SyncStateKind> {
        match v {
            0 => Ok(SyncStateKind::Present),
            1 => Ok(SyncStateKind::Add),
            2 => Ok(SyncStateKind::Modify),
            3 => Ok(SyncStateKind::Delete),
            other => Err(LdapError::ProtocolViolation(format!(
                "unknown SyncStateValue state {other}"
            ))),
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            SyncStateKind::Present => 0,
            SyncStateKind::Add => 1,
            SyncStateKind::Modify => 2,
            SyncStateKind::Delete => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateValue {
    pub state: SyncStateKind,
    pub entry_uuid: [u8; 16],
    pub cookie: Option<Vec<u8>>,
}

impl SyncStateValue {
    /// `SyncStateValue ::= SEQUENCE { state ENUMERATED, entryUUID
    /// SyncUUID, cookie syncCookie OPTIONAL }`.
    pub fn decode(bytes: &[u8]) -> Result<SyncStateValue> {
        let mut r = SliceReader::new(bytes);
        let h = r.begin_sequence().map_err(LdapError::from)?;
        let state = SyncStateKind::from_wire(r.read_enum_u32().map_err(LdapError::from)?)?;
        let uuid_bytes = r.read_octet_string().map_err(LdapError::from)?;
        let entry_uuid: [u8; 16] = uuid_bytes
            .try_into()
            .map_err(|_| LdapError::ProtocolViolation("entryUUID must be 16 bytes".into()))?;
        let cookie = if r.has_more_elements(&h) {
            Some(r.read_octet_string().map_err(LdapError::from)?.to_vec())
        } else {
            None
        };
        r.end_sequence(h).map_err(LdapError::from)?;
        Ok(SyncStateValue {
            state,
            entry_uuid,
            cookie,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = SliceWriter::new();
        let h = w.begin_sequence();
        w.write_enumerated(self.state.to_wire() as i128);
        w.write_octet_string(&self.entry_uuid);
        if let Some(cookie) = &self.cookie {
            w.write_octet_string(cookie);
        }
        w.end_sequence(h);
        w.into_bytes()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDoneValue {
    pub cookie: Option<Vec<u8>>,
    pub refresh_deletes: bool,
}

fn is_octet_string(r: &SliceReader) -> Result<bool> {
    Ok(r.peek_tag().map_err(LdapError::from)?.number == crate::ber::universal::OCTET_STRING)
}

impl SyncDoneValue {
    /// `SyncDoneValue ::= SEQUENCE { cookie syncCookie OPTIONAL,
    /// refreshDeletes BOOLEAN DEFAULT FALSE }`. Cookie must precede the
    /// boolean; either field appearing twice, or an unexpected universal
    /// type, is a decode error.
    pub fn decode(bytes: &[u8]) -> Result<SyncDoneValue> {
        let mut r = SliceReader::new(bytes);
        let h = r.begin_sequence().map_err(LdapError::from)?;
        let cookie = if r.has_more_elements(&h) && is_octet_string(&r)? {
            Some(r.read_octet_string().map_err(LdapError::from)?.to_vec())
        } else {
            None
        };
        let refresh_deletes = if r.has_more_elements(&h) {
            let tag = r.peek_tag().map_err(LdapError::from)?;
            if tag.number != crate::ber::universal::BOOLEAN {
                return Err(LdapError::ProtocolViolation(
                    "SyncDoneValue: expected BOOLEAN after cookie".into(),
                ));
            }
            r.read_boolean().map_err(LdapError::from)?
        } else {
            false
        };
        if r.has_more_elements(&h) {
            return Err(LdapError::ProtocolViolation(
                "SyncDoneValue: unexpected trailing element".into(),
            ));
        }
        r.end_sequence(h).map_err(LdapError::from)?;
        Ok(SyncDoneValue {
            cookie,
            refresh_deletes,
        })
    }

    /// Omits the cookie when absent and the boolean when false, so an
    /// empty SEQUENCE (`30 00`) is a legal encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = SliceWriter::new();
        let h = w.begin_sequence();
        if let Some(cookie) = &self.cookie {
            w.write_octet_string(cookie);
        }
        if self.refresh_deletes {
            w.write_boolean(true);
        }
        w.end_sequence(h);
        w.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncInfoValue {
    NewCookie(Vec<u8>),
    RefreshDelete { cookie: Option<Vec<u8>>, done: bool },
    RefreshPresent { cookie: Option<Vec<u8>>, done: bool },
    SyncIdSet {
        cookie: Option<Vec<u8>>,
        refresh_deletes: bool,
        uuids: Vec<[u8; 16]>,
    },
}

fn decode_refresh_body(r: &mut SliceReader, h: &crate::ber::reader::SequenceHandle) -> Result<(Option<Vec<u8>>, bool)> {
    let cookie = if r.has_more_elements(h) && is_octet_string(r)? {
        Some(r.read_octet_string().map_err(LdapError::from)?.to_vec())
    } else {
        None
    };
    let done = if r.has_more_elements(h) {
        r.read_boolean().map_err(LdapError::from)?
    } else {
        true
    };
    Ok((cookie, done))
}

impl SyncInfoValue {
    /// `SyncInfoValue ::= CHOICE { newcookie [0] syncCookie, refreshDelete
    /// [1] SEQUENCE {...}, refreshPresent [2] SEQUENCE {...}, syncIdSet [3]
    /// SEQUENCE {...} }`.
    pub fn decode(bytes: &[u8]) -> Result<SyncInfoValue> {
        let mut r = SliceReader::new(bytes);
        let tag = r.peek_tag().map_err(LdapError::from)?;
        match tag.number {
            0 => {
                let cookie = r
                    .read_tagged_primitive(Class::ContextSpecific, 0)
                    .map_err(LdapError::from)?
                    .to_vec();
                Ok(SyncInfoValue::NewCookie(cookie))
            }
            1 => {
                let h = r
                    .begin_tagged(Class::ContextSpecific, 1)
                    .map_err(LdapError::from)?;
                let (cookie, done) = decode_refresh_body(&mut r, &h)?;
                r.end_sequence(h).map_err(LdapError::from)?;
                Ok(SyncInfoValue::RefreshDelete { cookie, done })
            }
            2 => {
                let h = r
                    .begin_tagged(Class::ContextSpecific, 2)
                    .map_err(LdapError::from)?;
                let (cookie, done) = decode_refresh_body(&mut r, &h)?;
                r.end_sequence(h).map_err(LdapError::from)?;
                Ok(SyncInfoValue::RefreshPresent { cookie, done })
            }
            3 => {
                let h = r
                    .begin_tagged(Class::ContextSpecific, 3)
                    .map_err(LdapError::from)?;
                let cookie = if r.has_more_elements(&h) && is_octet_string(&r)? {
                    Some(r.read_octet_string().map_err(LdapError::from)?.to_vec())
                } else {
                    None
                };
                let refresh_deletes = if r.has_more_elements(&h)
                    && r.peek_tag().map_err(LdapError::from)?.number
                        == crate::ber::universal::BOOLEAN
                {
                    r.read_boolean().map_err(LdapError::from)?
                } else {
                    false
                };
                let set = r.begin_sequence().map_err(LdapError::from)?;
                let mut uuids = Vec::new();
                while r.has_more_elements(&set) {
                    let bytes = r.read_octet_string().map_err(LdapError::from)?;
                    let uuid: [u8; 16] = bytes.try_into().map_err(|_| {
                        LdapError::ProtocolViolation("syncUUID must be 16 bytes".into())
                    })?;
                    uuids.push(uuid);
                }
                r.end_sequence(set).map_err(LdapError::from)?;
                r.end_sequence(h).map_err(LdapError::from)?;
                Ok(SyncInfoValue::SyncIdSet {
                    cookie,
                    refresh_deletes,
                    uuids,
                })
            }
            other => Err(LdapError::ProtocolViolation(format!(
                "unknown SyncInfoValue CHOICE tag {other}"
            ))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = SliceWriter::new();
        match self {
            SyncInfoValue::NewCookie(cookie) => {
                w.write_tagged_primitive(Class::ContextSpecific, 0, cookie);
            }
            SyncInfoValue::RefreshDelete { cookie, done } => {
                let h = w.begin_tagged(Class::ContextSpecific, 1, true);
                if let Some(c) = cookie {
                    w.write_octet_string(c);
                }
                if !done {
                    w.write_boolean(false);
                }
                w.end_sequence(h);
            }
            SyncInfoValue::RefreshPresent { cookie, done } => {
                let h = w.begin_tagged(Class::ContextSpecific, 2, true);
                if let Some(c) = cookie {
                    w.write_octet_string(c);
                }
                if !done {
                    w.write_boolean(false);
                }
                w.end_sequence(h);
            }
            SyncInfoValue::SyncIdSet {
                cookie,
                refresh_deletes,
                uuids,
            } => {
                let h = w.begin_tagged(Class::ContextSpecific, 3, true);
                if let Some(c) = cookie {
                    w.write_octet_string(c);
                }
                if *refresh_deletes {
                    w.write_boolean(true);
                }
                let set = w.begin_set();
                for u in uuids {
                    w.write_octet_string(u);
                }
                w.end_sequence(set);
                w.end_sequence(h);
            }
        }
        w.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_done_empty_value_decodes_to_defaults() {
        let bytes = [0x30, 0x00];
        let value = SyncDoneValue::decode(&bytes).unwrap();
        assert_eq!(value, SyncDoneValue::default());
        assert_eq!(value.encode(), bytes);
    }

    #[test]
    fn sync_done_with_cookie_and_refresh_deletes() {
        let bytes = [0x30, 0x08, 0x04, 0x03, 0x61, 0x62, 0x63, 0x01, 0x01, 0xff];
        let value = SyncDoneValue::decode(&bytes).unwrap();
        assert_eq!(
            value,
            SyncDoneValue {
                cookie: Some(b"abc".to_vec()),
                refresh_deletes: true,
            }
        );
        assert_eq!(value.encode(), bytes);
    }

    #[test]
    fn sync_done_rejects_trailing_element() {
        // SEQUENCE { BOOLEAN true, BOOLEAN false } — a second boolean after
        // refreshDeletes has nowhere to go in the grammar.
        let bytes = [0x30, 0x06, 0x01, 0x01, 0xff, 0x01, 0x01, 0x00];
        assert!(SyncDoneValue::decode(&bytes).is_err());
    }

    #[test]
    fn sync_request_value_roundtrip() {
        let value = SyncRequestValue {
            mode: SyncRequestMode::RefreshAndPersist,
            cookie: Some(b"xyz".to_vec()),
            reload_hint: true,
        };
        let bytes = value.encode();
        assert_eq!(SyncRequestValue::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn sync_state_value_roundtrip() {
        let value = SyncStateValue {
            state: SyncStateKind::Modify,
            entry_uuid: [7u8; 16],
            cookie: None,
        };
        let bytes = value.encode();
        assert_eq!(SyncStateValue::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn sync_info_value_variants_roundtrip() {
        for value in [
            SyncInfoValue::NewCookie(b"cookie".to_vec()),
            SyncInfoValue::RefreshDelete {
                cookie: Some(b"c".to_vec()),
                done: false,
            },
            SyncInfoValue::RefreshPresent {
                cookie: None,
                done: true,
            },
            SyncInfoValue::SyncIdSet {
                cookie: Some(b"c".to_vec()),
                refresh_deletes: true,
                uuids: vec![[1u8; 16], [2u8; 16]],
            },
        ] {
            let bytes = value.encode();
            assert_eq!(SyncInfoValue::decode(&bytes).unwrap(), value);
        }
    }
}
