use k8s_openapi::chrono::{DateTime, FixedOffset};

/// Splits the RFC 3339 timestamp the API server prefixes log lines with.
pub(crate) fn split_timestamp(line: &str) -> (Option<DateTime<FixedOffset>>, &str) {
    match line.split_once(' ') {
        Some((prefix, message)) => match DateTime::parse_from_rfc3339(prefix) {
            Ok(timestamp) => (Some(timestamp), message),
            Err(_) => (None, line),
        },
        None => match DateTime::parse_from_rfc3339(line) {
            Ok(timestamp) => (Some(timestamp), ""),
            Err(_) => (None, line),
        },
    }
}

pub(crate) fn timestamp(line: &str) -> Option<DateTime<FixedOffset>> {
    split_timestamp(line).0
}

pub(crate) fn strip_timestamp(line: &str) -> &str {
    split_timestamp(line).1
}

pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Appends the fetched lines that are newer than everything held. Returns how many were added.
pub(crate) fn append_newer(held: &mut Vec<String>, fetched: Vec<String>) -> usize {
    let Some(newest) = held.last() else {
        let added = fetched.len();
        *held = fetched;
        return added;
    };

    let newer: Vec<String> = match fetched.iter().rposition(|line| line == newest) {
        Some(boundary) => fetched[boundary + 1..].to_vec(),
        None => match timestamp(newest) {
            Some(cutoff) => fetched
                .into_iter()
                .filter(|line| timestamp(line).is_some_and(|at| at > cutoff))
                .collect(),
            None => Vec::new(),
        },
    };
    let added = newer.len();
    held.extend(newer);
    added
}

/// Prepends the fetched lines that are older than everything held. Returns how many were added.
pub(crate) fn prepend_older(held: &mut Vec<String>, fetched: Vec<String>) -> usize {
    let Some(oldest) = held.first() else {
        return 0;
    };

    let mut older: Vec<String> = match fetched.iter().position(|line| line == oldest) {
        Some(boundary) => fetched[..boundary].to_vec(),
        None => match timestamp(oldest) {
            Some(cursor) => fetched
                .into_iter()
                .filter(|line| timestamp(line).is_some_and(|at| at < cursor))
                .collect(),
            None => Vec::new(),
        },
    };
    let added = older.len();
    older.append(held);
    *held = older;
    added
}
