// Duplicate collapsing across sources.
// Groups fetched messages by identity key and picks one winner per group
// with a tie-break that never depends on fork enumeration order.

use std::collections::{HashMap, HashSet};

use crate::message::{IdentityKey, Message, content_digest};

/// Collapse the concatenated per-source results into one message per
/// identity key, then assign collision-free storage filenames.
///
/// The output is sorted ascending by date (filename as the stable tail),
/// matching the order the cache serves.
pub fn merge_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut groups: HashMap<IdentityKey, Message> = HashMap::new();
    for message in messages {
        let key = message.identity_key();
        match groups.entry(key) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(message);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if prefer(&message, slot.get()) {
                    slot.insert(message);
                }
            }
        }
    }

    let mut merged: Vec<Message> = groups.into_values().collect();
    merged.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.content.cmp(&b.content))
    });
    assign_unique_filenames(&mut merged);
    merged
}

/// Whether `candidate` beats `incumbent` for the same identity key.
///
/// Tie-break, in order: a commit hash beats none; earlier date; primary
/// origin beats fork; then origin label, commit hash, and filename purely
/// to make the relation a total order.
fn prefer(candidate: &Message, incumbent: &Message) -> bool {
    rank(candidate) < rank(incumbent)
}

fn rank(m: &Message) -> (u8, i64, u8, &str, &str, &str) {
    (
        if m.commit_hash.is_some() { 0 } else { 1 },
        m.date.timestamp_millis(),
        if m.origin.primary { 0 } else { 1 },
        m.origin.label.as_str(),
        m.commit_hash.as_deref().unwrap_or(""),
        m.filename.as_str(),
    )
}

/// Give messages that share a filename but carry different identity keys
/// distinct storage names, so neither blob overwrites the other.
fn assign_unique_filenames(messages: &mut [Message]) {
    let mut seen: HashSet<String> = HashSet::new();
    for message in messages.iter_mut() {
        if !seen.insert(message.filename.clone()) {
            let disambiguated = disambiguate(&message.filename, &content_digest(&message.content));
            tracing::debug!(
                original = %message.filename,
                renamed = %disambiguated,
                "filename collision across identity keys"
            );
            message.filename = disambiguated;
            seen.insert(message.filename.clone());
        }
    }
}

fn disambiguate(filename: &str, digest: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{}__{}.{}", stem, digest, ext),
        None => format!("{}__{}", filename, digest),
    }
}
