//! # LDAP Client Core
//!
//! A Lightweight Directory Access Protocol (LDAP) ([RFC4511]) protocol
//! library: BER/ASN.1 codec, protocol-op model, message envelope, the
//! content-synchronization control family ([RFC4533]), and matching-rule
//! normalization.
//!
//! It is written in pure Rust, fast, and makes extensive use of zero-copy. A
//! lot of care is taken to ensure security and safety of this crate,
//! including design (recursion limit, defensive programming), tests, and
//! fuzzing. It also aims to be panic-free.
//!
//! [RFC4511]: https://www.rfc-editor.org/rfc/rfc4511
//! [RFC4533]: https://www.rfc-editor.org/rfc/rfc4533

#![deny(/*missing_docs,*/
        unstable_features,
        unused_import_braces, unused_qualifications)]
#![warn(
    missing_debug_implementations,
    /* missing_docs,
    rust_2018_idioms,*/
    unreachable_pub
)]
#![forbid(unsafe_code)]
#![deny(broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ber;
pub mod codec;
pub mod controls;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod matching_rules;
