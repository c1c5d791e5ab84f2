//! Fixup pipeline for programmatic use by the CLI and tests.
//!
//! [`run_fixup`] is the whole tool: build the substitution table, load the
//! document, run the passes from [`fix_document`], write the result.

use crate::mms::{repair_smil_parts, resolve_participants, MMS_TAG};
use crate::sms::{fix_sms_address, prune_empty_sms, SMS_TAG};
use crate::sniff::{ImageSniffer, MediaSniffer};
use crate::substitute::SubstitutionTable;
use crate::tree::{Document, Element};
use anyhow::{Context, Result};
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Path value that means stdin (input) or stdout (output).
pub const STDIO_PATH: &str = "-";

/// Switches for the individual passes.
#[derive(Debug, Clone, Default)]
pub struct FixupOptions {
    /// The operator's own number, used to recognise sent MMS
    pub current_number: Option<String>,
    /// Delete SMS messages with an empty or missing body
    pub delete_empty_sms: bool,
    /// Repair SMIL parts that actually hold images
    pub fix_smil: bool,
}

/// Configuration for a complete fixup run.
#[derive(Debug, Clone)]
pub struct FixupConfig {
    /// Input XML path (`-` for stdin)
    pub input: PathBuf,
    /// Output XML path (`-` for stdout)
    pub output: PathBuf,
    /// Substitution directives in command-line order
    pub substitutions: Vec<Vec<String>>,
    pub options: FixupOptions,
}

/// Counts of what a run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixupReport {
    pub mms_processed: usize,
    pub sms_processed: usize,
    /// MMS participant and SMS addresses changed by a substitution rule
    pub addresses_rewritten: usize,
    /// MMS whose `msg_box` was set to sent
    pub mms_marked_sent: usize,
    pub parts_repaired: usize,
    pub sms_deleted: usize,
}

impl fmt::Display for FixupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} MMS and {} SMS: {} addresses rewritten, {} MMS marked sent, \
             {} SMIL parts repaired, {} empty SMS deleted",
            self.mms_processed,
            self.sms_processed,
            self.addresses_rewritten,
            self.mms_marked_sent,
            self.parts_repaired,
            self.sms_deleted
        )
    }
}

/// Run every pass over a loaded document, in place.
///
/// All MMS are handled first (participants, then SMIL parts), then all SMS
/// addresses, then, if enabled, empty SMS are pruned in a separate walk.
pub fn fix_document(
    root: &mut Element,
    table: &SubstitutionTable,
    options: &FixupOptions,
    sniffer: &dyn MediaSniffer,
) -> FixupReport {
    let mut report = FixupReport::default();
    let current_number = options.current_number.as_deref();

    root.for_each_tagged_mut(MMS_TAG, &mut |mms: &mut Element| {
        report.mms_processed += 1;
        let outcome = resolve_participants(mms, table, current_number);
        report.addresses_rewritten += outcome.rewritten;
        if outcome.sent {
            report.mms_marked_sent += 1;
        }
        if options.fix_smil {
            report.parts_repaired += repair_smil_parts(mms, sniffer);
        }
    });

    root.for_each_tagged_mut(SMS_TAG, &mut |sms: &mut Element| {
        report.sms_processed += 1;
        if fix_sms_address(sms, table) {
            report.addresses_rewritten += 1;
        }
    });

    if options.delete_empty_sms {
        report.sms_deleted = prune_empty_sms(root);
    }

    log::info!("{}", report);
    report
}

/// Build the table, load, fix and save according to `config`.
///
/// Substitution directives are validated before the input is read, so a
/// malformed rule never leaves a partial or truncated output behind.
pub fn run_fixup(config: &FixupConfig) -> Result<FixupReport> {
    let table = SubstitutionTable::from_directives(&config.substitutions)
        .context("Invalid --substitute arguments")?;
    log::info!("Loaded {} substitution rules", table.len());

    let xml = read_input(&config.input)?;
    let mut document = Document::parse(&xml)
        .with_context(|| format!("Failed to parse XML: {}", config.input.display()))?;

    let report = fix_document(&mut document.root, &table, &config.options, &ImageSniffer);

    let mut out = Vec::with_capacity(xml.len());
    document.write_to(&mut out)?;
    write_output(&config.output, &out)?;
    Ok(report)
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

fn read_input(path: &Path) -> Result<String> {
    if is_stdio(path) {
        let mut xml = String::new();
        std::io::stdin()
            .read_to_string(&mut xml)
            .context("Failed to read XML from stdin")?;
        return Ok(xml);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if is_stdio(path) {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(data).context("Failed to write XML to stdout")?;
        return stdout.flush().context("Failed to write XML to stdout");
    }
    std::fs::write(path, data)
        .with_context(|| format!("Failed to create output: {}", path.display()))
}

/// Whether the fixed document goes to stdout instead of a file.
pub fn writes_to_stdout(config: &FixupConfig) -> bool {
    is_stdio(&config.output)
}
