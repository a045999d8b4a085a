//! Client identification string parsing.

use super::types::{OsInfo, ParsedVersion, RuntimeInfo, Version};

/// Marker of an embedded node address, never part of a real client name
const NODE_URL_MARKER: &str = "enode://";

/// Marker preceding a version component
const VERSION_MARKER: &str = "/v";

/// Parse a client identification string.
///
/// The result has `error` set when the input is not a structured
/// identification string or its version resolves to `0.0.0`.
pub fn parse_version_string(input: &str) -> ParsedVersion {
    if input.contains(NODE_URL_MARKER) || input.matches(VERSION_MARKER).count() > 1 {
        return ParsedVersion::unparseable();
    }

    let lowered = input.to_lowercase();
    let parts: Vec<&str> = lowered.split('/').collect();
    if parts[0].is_empty() {
        return ParsedVersion::unparseable();
    }

    let mut parsed = ParsedVersion {
        name: parts[0].to_string(),
        ..ParsedVersion::default()
    };

    match parts.len() {
        4 => {
            parsed.version = parse_version(parts[1]);
            parsed.os = parse_os(parts[2]);
            parsed.runtime = parse_runtime(parts[3]);
        }
        // Parts beyond the fifth carry no known meaning and are ignored.
        5 | 7 => {
            parsed.label = parts[1].to_string();
            parsed.version = parse_version(parts[2]);
            parsed.os = parse_os(parts[3]);
            parsed.runtime = parse_runtime(parts[4]);
        }
        _ => {
            parsed.name = input.to_string();
            return parsed;
        }
    }

    if parsed.version.is_zero() {
        return ParsedVersion::unparseable();
    }
    parsed
}

/// Split `number-tag...-build-date`, assigning suffixes from the end.
fn parse_version(input: &str) -> Version {
    let segments: Vec<&str> = input.split('-').collect();
    let (major, minor, patch) = parse_version_number(segments[0]);
    let mut version = Version {
        major,
        minor,
        patch,
        ..Version::default()
    };

    let n = segments.len();
    match n {
        1 => {}
        2 => version.tag = segments[1].to_string(),
        3 => {
            version.tag = segments[1].to_string();
            version.build = segments[2].to_string();
        }
        4 => {
            version.tag = segments[1].to_string();
            version.build = segments[2].to_string();
            version.date = segments[3].to_string();
        }
        _ => {
            version.tag = segments[1..n - 2].join("-");
            version.build = segments[n - 2].to_string();
            version.date = segments[n - 1].to_string();
        }
    }
    version
}

/// `v1.2.3` style numbers; missing or non-numeric segments are zero and
/// more than four segments are not treated as a version at all.
fn parse_version_number(input: &str) -> (u32, u32, u32) {
    let trimmed = input.trim_start_matches('v');
    let segments: Vec<&str> = trimmed.split('.').collect();
    if segments.len() > 4 {
        return (0, 0, 0);
    }
    let number = |i: usize| {
        segments
            .get(i)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
    };
    (number(0), number(1), number(2))
}

/// `os-arch`; anything with more than two segments is left empty.
fn parse_os(input: &str) -> OsInfo {
    let segments: Vec<&str> = input.split('-').collect();
    match segments.as_slice() {
        [os] => OsInfo {
            os: os.to_string(),
            architecture: String::new(),
        },
        [os, arch] => OsInfo {
            os: os.to_string(),
            architecture: arch.to_string(),
        },
        _ => OsInfo::default(),
    }
}

/// Leftmost match of an optional alphabetic name, an optional `-`, and a
/// run of version characters (`go1.20.4`, `rustc1.52.1`, `go-1.21`).
fn parse_runtime(input: &str) -> RuntimeInfo {
    let bytes = input.as_bytes();
    let is_version_char = |b: u8| b.is_ascii_digit() || matches!(b, b'+' | b'.' | b'?');

    for start in 0..bytes.len() {
        let name_end = start
            + bytes[start..]
                .iter()
                .take_while(|b| b.is_ascii_alphabetic())
                .count();

        let mut version_start = name_end;
        if bytes.get(version_start) == Some(&b'-')
            && bytes.get(version_start + 1).copied().is_some_and(is_version_char)
        {
            version_start += 1;
        }
        if !bytes.get(version_start).copied().is_some_and(is_version_char) {
            continue;
        }

        let version_end = version_start
            + bytes[version_start..]
                .iter()
                .take_while(|b| is_version_char(**b))
                .count();
        return RuntimeInfo {
            name: input[start..name_end].to_string(),
            version: input[version_start..version_end].to_string(),
        };
    }
    RuntimeInfo::default()
}
