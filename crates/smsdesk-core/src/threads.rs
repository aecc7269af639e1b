use std::collections::HashMap;

use smsdesk_types::models::{ChatThread, SmsRecord};

/// Groups one user's records into conversation threads.
///
/// Records are grouped by exact `recipient`. Messages within a thread are
/// ordered newest first, and threads are ordered by their newest message,
/// newest first. Both sorts are stable and groups are formed in order of
/// first appearance, so records or threads with equal send times keep the
/// order in which they appear in `records`.
///
/// The input is not modified; call again whenever the log changes.
pub fn aggregate_threads(records: &[SmsRecord]) -> Vec<ChatThread> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut threads: Vec<ChatThread> = Vec::new();

    for record in records {
        let slot = *slots.entry(record.recipient.as_str()).or_insert_with(|| {
            threads.push(ChatThread {
                recipient: record.recipient.clone(),
                messages: Vec::new(),
            });
            threads.len() - 1
        });
        threads[slot].messages.push(record.clone());
    }

    for thread in &mut threads {
        thread.messages.sort_by(|a, b| b.send_time.cmp(&a.send_time));
    }
    threads.sort_by(|a, b| {
        let a_latest = a.latest().map(|m| m.send_time);
        let b_latest = b.latest().map(|m| m.send_time);
        b_latest.cmp(&a_latest)
    });

    threads
}

/// Threads whose recipient or any message contains `term`, ignoring case.
/// A blank term keeps every thread.
pub fn filter_threads(threads: &[ChatThread], term: &str) -> Vec<ChatThread> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return threads.to_vec();
    }

    threads
        .iter()
        .filter(|thread| {
            thread.recipient.to_lowercase().contains(&needle)
                || thread
                    .messages
                    .iter()
                    .any(|m| m.message.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}
