#![no_main]
use ldap_protocol::ldap::LdapMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = LdapMessage::from_bytes(data);
});
