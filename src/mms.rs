//! Multimedia (`<mms>`) message repairs.
//!
//! - Participant resolution: rewrite every `addrs/addr` number, detect the
//!   local sender and rebuild the `~`-joined `address` summary.
//! - SMIL repair: parts that claim to be `application/smil` but carry image
//!   data and no charset get their real content type and a synthetic name.

use crate::sniff::MediaSniffer;
use crate::substitute::SubstitutionTable;
use crate::tree::Element;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const MMS_TAG: &str = "mms";

/// Address the device writes for "this phone" before the number is known.
pub const SENDER_PLACEHOLDER: &str = "insert-address-token";

/// PDU address type code for the `From` participant.
pub const ADDR_TYPE_FROM: &str = "137";

/// `msg_box` value for sent messages.
pub const MSG_BOX_SENT: &str = "2";

pub const SMIL_CONTENT_TYPE: &str = "application/smil";

const NULL_MARKER: &str = "null";
const SUMMARY_DELIMITER: &str = "~";

/// What [`resolve_participants`] did to one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParticipantOutcome {
    /// The local number was found as the `From` participant.
    pub sent: bool,
    /// Addresses that went into the `address` summary, in entry order.
    pub summary: Vec<String>,
    /// Number of participant addresses changed by a substitution rule.
    pub rewritten: usize,
}

/// Rewrite participant addresses of one `<mms>` and classify the sender.
///
/// `current_number` is the operator's own number; it and
/// [`SENDER_PLACEHOLDER`] both identify the local device. A local address is
/// left out of the `~` summary only when its type is the `From` code (137);
/// with any other type it is listed like every other participant.
pub fn resolve_participants(
    mms: &mut Element,
    table: &SubstitutionTable,
    current_number: Option<&str>,
) -> ParticipantOutcome {
    if mms.attr("sub") == Some("0") {
        mms.set_attr("sub", NULL_MARKER);
    }

    let message_id = mms.attr("m_id").map(str::to_string);
    let mut outcome = ParticipantOutcome::default();

    for addr in mms.find_all_mut(&["addrs", "addr"]) {
        let (Some(address), Some(addr_type)) = (addr.attr("address"), addr.attr("type")) else {
            continue;
        };

        let rewritten = table.rewrite(message_id.as_deref(), address).to_string();
        if rewritten != address {
            log::debug!(
                "mms {}: participant {} -> {}",
                message_id.as_deref().unwrap_or("-"),
                address,
                rewritten
            );
            outcome.rewritten += 1;
        }

        let is_local =
            rewritten == SENDER_PLACEHOLDER || Some(rewritten.as_str()) == current_number;
        if is_local && addr_type == ADDR_TYPE_FROM {
            outcome.sent = true;
        } else {
            outcome.summary.push(rewritten.clone());
        }

        addr.set_attr("address", rewritten);
    }

    if outcome.sent {
        mms.set_attr("msg_box", MSG_BOX_SENT);
    }
    mms.set_attr("address", outcome.summary.join(SUMMARY_DELIMITER));

    outcome
}

/// Repair SMIL-typed image parts of one `<mms>`.
///
/// Returns the number of parts repaired. Synthetic names are numbered per
/// message, starting at `image000000`.
pub fn repair_smil_parts(mms: &mut Element, sniffer: &dyn MediaSniffer) -> usize {
    let mut index = 0usize;
    for part in mms.find_all_mut(&["parts", "part"]) {
        if let Some(name) = repair_part(part, index, sniffer) {
            log::debug!(
                "repaired SMIL part as {} ({})",
                name,
                part.attr("ct").unwrap_or("")
            );
            index += 1;
        }
    }
    index
}

fn repair_part(part: &mut Element, index: usize, sniffer: &dyn MediaSniffer) -> Option<String> {
    if part.attr("ct") != Some(SMIL_CONTENT_TYPE) {
        return None;
    }
    // A correctly stored SMIL part always has a charset
    if !matches!(part.attr("chset"), None | Some("") | Some(NULL_MARKER)) {
        return None;
    }
    let data = part.attr("data").filter(|d| !d.is_empty())?;

    let bytes = match decode_payload(data) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("skipping SMIL part with undecodable payload: {}", e);
            return None;
        }
    };

    let mime = sniffer
        .sniff_mime(&bytes)
        .filter(|mime| mime.starts_with("image/"))?;
    let extension = sniffer.extension_for(&mime)?;
    let name = format!("image{:06}.{}", index, extension);

    part.set_attr("ct", mime);
    part.set_attr("chset", NULL_MARKER);
    part.set_attr("cl", name.as_str());
    part.set_attr("cid", format!("<{}>", name));
    Some(name)
}

/// Decode a base64 part payload, ignoring line breaks and other whitespace.
fn decode_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
