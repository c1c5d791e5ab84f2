//! WP Message Fixup
//!
//! Repairs "WP Message Backup" Android XML exports before they are
//! re-imported or archived.
//!
//! This library provides:
//! - `substitute`: Scoped, ordered number substitution rules
//! - `mms`: MMS participant/sender resolution and SMIL part repair
//! - `sms`: SMS address rewriting and empty-message pruning
//! - `sniff`: Payload content-type detection
//! - `tree`: In-memory XML tree with parent-aware traversal
//! - `pipeline`: The complete load/fix/save run
//!
//! Binaries:
//! - `wp-fixup`: Command-line front end for `pipeline::run_fixup`

pub mod mms;
pub mod pipeline;
pub mod sms;
pub mod sniff;
pub mod substitute;
pub mod tree;

pub use pipeline::{fix_document, run_fixup, FixupConfig, FixupOptions, FixupReport};
pub use substitute::SubstitutionTable;
