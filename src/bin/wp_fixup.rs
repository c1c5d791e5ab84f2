//! Fix "WP Message Backup" Android XML exports: substitute phone numbers,
//! mark MMS sent from this phone, repair SMIL parts holding images, and
//! delete empty SMS.
//!
//! Usage:
//!   wp-fixup backup.xml fixed.xml -n +15551234567 -d -f \
//!     -s 5551234567,+15551234567 -s 1234567890 5550000,+15550000
//!
//! Positional paths go before `-s`, since `-s` takes every value up to the
//! next flag. Each `-s` is one rule group: `FROM,TO` pairs for all messages,
//! or an MMS `m_id` followed by pairs that only apply to that message.

use anyhow::Result;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use wp_message_fixup::pipeline::{run_fixup, writes_to_stdout, FixupConfig, FixupOptions};

#[derive(Parser)]
#[command(name = "wp-fixup", about = "Fix 'WP Message Backup' Android XML exports")]
struct Cli {
    /// Input XML file ("-" for stdin)
    xml_in: PathBuf,

    /// Output XML file ("-" for stdout)
    xml_out: PathBuf,

    /// Comma-separated number substitution pair(s). Applies to all messages
    /// unless the first value is an MMS message ID. Substitution order is
    /// preserved and substitutions are not chained.
    #[arg(
        short,
        long,
        num_args = 1..,
        action = ArgAction::Append,
        value_name = "[MESSAGE_ID] FROM,TO"
    )]
    substitute: Vec<String>,

    /// Current number (the phone that made the backup)
    #[arg(short = 'n', long, env = "WP_FIXUP_CURRENT_NUMBER")]
    current_number: Option<String>,

    /// Delete empty SMS messages
    #[arg(short, long)]
    delete_empty_sms: bool,

    /// Fix MMS SMIL data
    #[arg(short, long)]
    fix_smil: bool,
}

/// Parse the command line into a run configuration.
///
/// The derive flattens every `-s` value into one list, so the rule groups
/// are rebuilt from the per-occurrence view of the matches.
fn parse_config<I, T>(args: I) -> Result<FixupConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let substitutions: Vec<Vec<String>> = matches
        .get_occurrences::<String>("substitute")
        .map(|occurrences| {
            occurrences
                .map(|values| values.cloned().collect::<Vec<String>>())
                .collect()
        })
        .unwrap_or_default();

    Ok(FixupConfig {
        input: cli.xml_in,
        output: cli.xml_out,
        substitutions,
        options: FixupOptions {
            current_number: cli.current_number,
            delete_empty_sms: cli.delete_empty_sms,
            fix_smil: cli.fix_smil,
        },
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let config = parse_config(std::env::args_os()).unwrap_or_else(|e| e.exit());

    let report = run_fixup(&config)?;

    // Keep stdout clean when it carries the document
    if writes_to_stdout(&config) {
        eprintln!("{}", report);
    } else {
        println!("{}", report);
        println!("Saved to: {}", config.output.display());
    }
    Ok(())
}
