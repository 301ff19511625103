use regex::Regex;
use std::sync::LazyLock;

use super::entry::{EntryKind, ListingEntry};

/// One `ls -l` line in either toolbox form
/// (`perm owner group [size] date time name`) or toybox form
/// (`perm links owner group size date time name`). Device nodes print
/// `major, minor` where the size would be.
static LS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<perm>[bcdlsp-][rwxsStT-]{9})[.+@]?\s+",
        r"(?:\d+\s+)?",
        r"(?P<owner>\S+)\s+(?P<group>\S+)\s+",
        r"(?:(?:\d+,\s*\d+|(?P<size>\d+))\s+)?",
        r"(?P<date>\d{4}-\d{2}-\d{2})\s+(?P<time>\d{2}:\d{2})\s",
        r"(?P<name>.+)$",
    ))
    .expect("valid regex")
});

const LINK_SEPARATOR: &str = " -> ";
const PACKAGE_PREFIX: &str = "package:";

/// Path of `name` inside `parent`.
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{name}")
}

/// Argument given to `ls` to list the content of `path` rather than the
/// link or directory entry itself.
pub fn directory_argument(path: &str) -> String {
    if path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}

/// Removes the backslashes an escaping `ls` puts before special characters.
pub fn unescape_name(name: &str) -> String {
    let mut unescaped = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
                continue;
            }
        }
        unescaped.push(c);
    }
    unescaped
}

/// Parses one listing line of a child of `parent`. Lines that match no
/// known shape, such as `total 24` or `lstat '//init' failed`, give `None`.
pub fn parse_line(parent: &str, line: &str, escaping_ls: bool) -> Option<ListingEntry> {
    let captures = LS_LINE.captures(line)?;

    let permissions = captures["perm"].to_owned();
    let kind = EntryKind::from_type_char(permissions.chars().next()?);

    let mut name = &captures["name"];
    let mut extra_info = None;
    if kind == EntryKind::FileLink {
        if let Some((link, target)) = name.split_once(LINK_SEPARATOR) {
            name = link;
            extra_info = Some(target.to_owned());
        }
    }

    let name = if escaping_ls {
        unescape_name(name)
    } else {
        name.to_owned()
    };

    Some(ListingEntry {
        full_path: join_path(parent, &name),
        kind,
        permissions: Some(permissions),
        owner: Some(captures["owner"].to_owned()),
        group: Some(captures["group"].to_owned()),
        date: Some(captures["date"].to_owned()),
        time: Some(captures["time"].to_owned()),
        size: captures.name("size").and_then(|m| m.as_str().parse().ok()),
        extra_info,
    })
}

/// Parses the output of `ls -al <parent>/`, dropping malformed lines and
/// the `.` and `..` entries.
pub fn parse_listing<S: AsRef<str>>(
    parent: &str,
    lines: &[S],
    escaping_ls: bool,
) -> Vec<ListingEntry> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let entry = parse_line(parent, line, escaping_ls);
            if entry.is_none() {
                trace!("skipping listing line {:?}", line);
            }
            entry
        })
        .filter(|entry| !matches!(entry.name(), "." | ".."))
        .collect()
}

/// Package ids printed by `pm list packages`.
pub fn parse_packages<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.as_ref().trim().strip_prefix(PACKAGE_PREFIX))
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}
