use std::borrow::Cow;

use ldap_protocol::codec;
use ldap_protocol::filter::Filter;
use ldap_protocol::ldap::{
    DerefAliases, LdapDN, LdapMessage, LdapString, MessageID, ProtocolOp, SearchRequest,
    SearchScope,
};

#[test]
fn malformed_empty_input_is_rejected() {
    let _ = env_logger::try_init();
    assert!(LdapMessage::from_bytes(&[]).is_err());
}

#[test]
fn malformed_truncated_sequence_is_rejected() {
    let _ = env_logger::try_init();
    // SEQUENCE header claims 10 bytes of content but none follow.
    const DATA: &[u8] = &[0x30, 0x0a];
    assert!(LdapMessage::from_bytes(DATA).is_err());
}

#[test]
fn search_request_roundtrips_through_bytes() {
    let _ = env_logger::try_init();
    let msg = LdapMessage {
        message_id: MessageID(1),
        protocol_op: ProtocolOp::SearchRequest(SearchRequest {
            base_object: LdapDN(Cow::Borrowed("dc=rccad,dc=net")),
            scope: SearchScope::WholeSubtree,
            deref_aliases: DerefAliases::NeverDerefAliases,
            size_limit: 10,
            time_limit: 0,
            types_only: false,
            filter: Filter::Present(LdapString(Cow::Borrowed("objectClass"))),
            attributes: (0..22)
                .map(|i| LdapString(Cow::Owned(format!("attr{i}"))))
                .collect(),
        }),
        controls: None,
    };

    let bytes = msg.to_bytes().expect("encoding failed");
    let decoded = LdapMessage::from_bytes(&bytes).expect("parsing failed");
    assert_eq!(decoded, msg);

    if let ProtocolOp::SearchRequest(req) = &decoded.protocol_op {
        assert_eq!(&req.base_object.0, "dc=rccad,dc=net");
        assert_eq!(req.scope, SearchScope::WholeSubtree);
        assert_eq!(req.size_limit, 10);
        assert_eq!(req.attributes.len(), 22);
    } else {
        panic!("expected SearchRequest");
    }
}

#[test]
fn decode_messages_reads_back_to_back_messages() {
    let a = LdapMessage {
        message_id: MessageID(1),
        protocol_op: ProtocolOp::UnbindRequest,
        controls: None,
    };
    let b = LdapMessage {
        message_id: MessageID(2),
        protocol_op: ProtocolOp::UnbindRequest,
        controls: None,
    };
    let mut bytes = a.to_bytes().unwrap();
    bytes.extend(b.to_bytes().unwrap());

    let messages = codec::decode_messages(&bytes).unwrap();
    assert_eq!(messages, vec![a, b]);
}
