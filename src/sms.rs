//! Text (`<sms>`) message repairs.

use crate::substitute::SubstitutionTable;
use crate::tree::Element;

pub const SMS_TAG: &str = "sms";

/// Rewrite the `address` of one `<sms>` with the universal rules.
///
/// Text messages have no message ID, so scoped rules never apply. Returns
/// `true` when the address changed.
pub fn fix_sms_address(sms: &mut Element, table: &SubstitutionTable) -> bool {
    let Some(address) = sms.attr("address") else {
        return false;
    };
    let rewritten = table.rewrite(None, address).to_string();
    let changed = rewritten != address;
    if changed {
        log::debug!("sms: address {} -> {}", address, rewritten);
    }
    sms.set_attr("address", rewritten);
    changed
}

/// Delete every `<sms>` without a body, wherever it sits in the tree.
///
/// Matches are collected in one walk and removed from their recorded
/// parents afterwards. Returns the number of messages removed.
pub fn prune_empty_sms(root: &mut Element) -> usize {
    let empty: Vec<(bool, Vec<usize>)> = root
        .iter_with_parent(Some(SMS_TAG))
        .filter(|visit| visit.element.attr("body").map_or(true, str::is_empty))
        .map(|visit| (visit.parent.is_some(), visit.path))
        .collect();

    let mut removed = 0;
    // Reverse pre-order keeps the remaining paths valid while removing
    for (has_parent, path) in empty.into_iter().rev() {
        let Some((index, parent_path)) = path.split_last().filter(|_| has_parent) else {
            log::warn!("empty <sms> is the document root; leaving it in place");
            continue;
        };
        if let Some(parent) = root.element_at_mut(parent_path) {
            if parent.remove_child(*index).is_some() {
                removed += 1;
            }
        }
    }
    removed
}
