//! Control registry: a process-wide mapping from control OID to decoder,
//! plus the content-synchronization control family built on top of it.
//!
//! The registry mirrors the matching-rule table's shape — a `RwLock`-guarded
//! map, cheap concurrent reads, rare writes — but is exposed as an owned
//! value rather than only a lazy singleton, so a caller that wants isolated
//! registries (tests, multiple directory backends with different extension
//! sets) can construct one explicitly.

pub mod sync;

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{LdapError, Result};
use crate::ldap::Control;
use sync::{SyncDoneValue, SyncInfoValue, SyncRequestValue, SyncStateValue};

/// A control decoded into a concrete Rust value, or left opaque when no
/// decoder was registered for its OID and it wasn't critical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedControl {
    SyncRequest(SyncRequestValue),
    SyncState(SyncStateValue),
    SyncDone(SyncDoneValue),
    SyncInfo(SyncInfoValue),
    Opaque {
        oid: String,
        criticality: bool,
        value: Option<Vec<u8>>,
    },
}

/// `(criticality, value) -> decoded`. Decoders never see the OID that
/// dispatched them — the registry already used it for lookup.
pub type DecodeFn = fn(bool, Option<&[u8]>) -> Result<DecodedControl>;

pub struct ControlRegistry {
    decoders: RwLock<HashMap<String, DecodeFn>>,
}

impl std::fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.decoders.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("ControlRegistry")
            .field("registered", &count)
            .finish()
    }
}

impl Default for ControlRegistry {
    fn default() -> ControlRegistry {
        ControlRegistry::new()
    }
}

impl ControlRegistry {
    pub fn new() -> ControlRegistry {
        ControlRegistry {
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry pre-populated with the content-sync decoders this
    /// crate ships (§4.3's four OIDs).
    pub fn with_sync_controls() -> ControlRegistry {
        let registry = ControlRegistry::new();
        registry.register(sync::OID_SYNC_REQUEST, decode_sync_request);
        registry.register(sync::OID_SYNC_STATE, decode_sync_state);
        registry.register(sync::OID_SYNC_DONE, decode_sync_done);
        registry.register(sync::OID_SYNC_INFO, decode_sync_info);
        registry
    }

    pub fn register(&self, oid: impl Into<String>, decoder: DecodeFn) {
        let oid = oid.into();
        log::debug!("registering control decoder for {oid}");
        let mut decoders = self.decoders.write().expect("control registry poisoned");
        decoders.insert(oid, decoder);
    }

    pub fn deregister(&self, oid: &str) {
        log::debug!("deregistering control decoder for {oid}");
        let mut decoders = self.decoders.write().expect("control registry poisoned");
        decoders.remove(oid);
    }

    pub fn resolve(&self, oid: &str) -> Option<DecodeFn> {
        let decoders = self.decoders.read().expect("control registry poisoned");
        decoders.get(oid).copied()
    }

    /// Resolve a message's raw control list per the dispatch rules in
    /// §4.3: a registered decoder that fails is always an error; an
    /// unregistered critical control on a response is an error; an
    /// unregistered non-critical control decodes opaque.
    pub fn decode_controls(
        &self,
        controls: &[Control],
        is_response: bool,
    ) -> Result<Vec<DecodedControl>> {
        controls
            .iter()
            .map(|c| {
                let oid = c.control_type.0.as_ref();
                let value = c.control_value.as_deref();
                match self.resolve(oid) {
                    Some(decoder) => decoder(c.criticality, value),
                    None if is_response && c.criticality => {
                        log::warn!("unknown critical control {oid} on response");
                        Err(LdapError::UnknownCriticalControl { oid: oid.to_string() })
                    }
                    None => Ok(DecodedControl::Opaque {
                        oid: oid.to_string(),
                        criticality: c.criticality,
                        value: value.map(|v| v.to_vec()),
                    }),
                }
            })
            .collect()
    }
}

fn decode_sync_request(criticality: bool, value: Option<&[u8]>) -> Result<DecodedControl> {
    let value = require_value(value)?;
    let _ = criticality;
    Ok(DecodedControl::SyncRequest(SyncRequestValue::decode(
        value,
    )?))
}

fn decode_sync_state(criticality: bool, value: Option<&[u8]>) -> Result<DecodedControl> {
    let value = require_value(value)?;
    let _ = criticality;
    Ok(DecodedControl::SyncState(SyncStateValue::decode(value)?))
}

fn decode_sync_done(criticality: bool, value: Option<&[u8]>) -> Result<DecodedControl> {
    let _ = criticality;
    Ok(DecodedControl::SyncDone(SyncDoneValue::decode(
        value.unwrap_or(&[0x30, 0x00]),
    )?))
}

fn decode_sync_info(criticality: bool, value: Option<&[u8]>) -> Result<DecodedControl> {
    let value = require_value(value)?;
    let _ = criticality;
    Ok(DecodedControl::SyncInfo(SyncInfoValue::decode(value)?))
}

fn require_value(value: Option<&[u8]>) -> Result<&[u8]> {
    value.ok_or_else(|| {
        LdapError::ProtocolViolation("control requires a value but none was present".into())
    })
}

/// The process-wide default registry, pre-populated with the sync control
/// family. Tests and callers needing isolation should construct their own
/// [`ControlRegistry`] instead.
pub fn default_registry() -> &'static ControlRegistry {
    static DEFAULT: Lazy<ControlRegistry> = Lazy::new(ControlRegistry::with_sync_controls);
    &DEFAULT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::LdapOID;
    use std::borrow::Cow;

    fn control<'a>(oid: &'a str, criticality: bool, value: Option<&'a [u8]>) -> Control<'a> {
        Control {
            control_type: LdapOID(Cow::Borrowed(oid)),
            criticality,
            control_value: value.map(Cow::Borrowed),
        }
    }

    #[test]
    fn resolves_registered_sync_done_control() {
        let registry = ControlRegistry::with_sync_controls();
        let controls = [control(sync::OID_SYNC_DONE, false, Some(&[0x30, 0x00]))];
        let decoded = registry.decode_controls(&controls, true).unwrap();
        assert_eq!(
            decoded,
            vec![DecodedControl::SyncDone(SyncDoneValue::default())]
        );
    }

    #[test]
    fn unknown_critical_control_on_response_is_an_error() {
        let registry = ControlRegistry::new();
        let controls = [control("1.2.3", true, None)];
        let err = registry.decode_controls(&controls, true).unwrap_err();
        assert!(matches!(err, LdapError::UnknownCriticalControl { .. }));
    }

    #[test]
    fn unknown_non_critical_control_decodes_opaque() {
        let registry = ControlRegistry::new();
        let controls = [control("1.2.3", false, Some(b"x"))];
        let decoded = registry.decode_controls(&controls, true).unwrap();
        assert_eq!(
            decoded,
            vec![DecodedControl::Opaque {
                oid: "1.2.3".into(),
                criticality: false,
                value: Some(b"x".to_vec()),
            }]
        );
    }

    #[test]
    fn unknown_critical_control_on_request_is_not_special_cased() {
        // §4.3 rule 3 only fires for responses; a request carrying an
        // unrecognized critical control is the server's problem to reject,
        // not this codec's.
        let registry = ControlRegistry::new();
        let controls = [control("1.2.3", true, None)];
        let decoded = registry.decode_controls(&controls, false).unwrap();
        assert_eq!(
            decoded,
            vec![DecodedControl::Opaque {
                oid: "1.2.3".into(),
                criticality: true,
                value: None,
            }]
        );
    }

    #[test]
    fn register_and_deregister_round_trip() {
        let registry = ControlRegistry::new();
        assert!(registry.resolve(sync::OID_SYNC_DONE).is_none());
        registry.register(sync::OID_SYNC_DONE, decode_sync_done);
        assert!(registry.resolve(sync::OID_SYNC_DONE).is_some());
        registry.deregister(sync::OID_SYNC_DONE);
        assert!(registry.resolve(sync::OID_SYNC_DONE).is_none());
    }

    #[test]
    fn default_registry_has_sync_controls_preregistered() {
        assert!(default_registry().resolve(sync::OID_SYNC_STATE).is_some());
    }
}
