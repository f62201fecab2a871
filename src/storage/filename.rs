//! Output file naming.
//!
//! Templates understand `{suburb}`, `{state}`, `{timestamp}` and
//! `{timestamp:<format>}`, matched case-insensitively. Formats use .NET-style
//! tokens (`yyyyMMddHHmmss`) unless they contain `%`, in which case they are
//! passed to chrono as strftime. Unknown placeholders are kept verbatim.

use crate::models::CrawlRequest;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use tracing::warn;

const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Characters rejected by at least one mainstream filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Render `template` for `request` at instant `now` and sanitize the result.
pub fn render_file_name(template: &str, request: &CrawlRequest, now: DateTime<Utc>) -> String {
    let mut rendered = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            rendered.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let token = &after_open[..close];
        match expand(token, request, now) {
            Some(value) => rendered.push_str(&value),
            None => {
                rendered.push('{');
                rendered.push_str(token);
                rendered.push('}');
            }
        }
        rest = &after_open[close + 1..];
    }
    rendered.push_str(rest);

    sanitize_file_name(&rendered)
}

fn expand(token: &str, request: &CrawlRequest, now: DateTime<Utc>) -> Option<String> {
    let (name, format) = match token.split_once(':') {
        Some((name, format)) => (name, Some(format)),
        None => (token, None),
    };

    match (name.to_ascii_lowercase().as_str(), format) {
        ("suburb", None) => Some(sanitize_file_name(&request.suburb_query.replace(' ', "_"))),
        ("state", None) => Some(request.state.clone().unwrap_or_default()),
        ("timestamp", None) => Some(format_timestamp(now, DEFAULT_TIMESTAMP_FORMAT)),
        ("timestamp", Some(format)) => {
            let strftime = if format.contains('%') {
                format.to_string()
            } else {
                dotnet_to_strftime(format)
            };
            Some(format_timestamp(now, &strftime))
        }
        _ => None,
    }
}

fn format_timestamp(now: DateTime<Utc>, strftime: &str) -> String {
    let mut out = String::new();
    // chrono reports a bad format as a fmt::Error instead of panicking here.
    if write!(out, "{}", now.format(strftime)).is_err() {
        warn!(format = %strftime, "Invalid timestamp format, using the default");
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_TIMESTAMP_FORMAT));
    }
    out
}

/// Translate a .NET custom date format (`yyyyMMdd-HHmmss`) to strftime.
pub fn dotnet_to_strftime(format: &str) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        let spec = match (c, run) {
            ('y', 1 | 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1) => Some("%-m"),
            ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1) => Some("%-d"),
            ('d', 2) => Some("%d"),
            ('d', 3) => Some("%a"),
            ('d', _) => Some("%A"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('h', 1) => Some("%-I"),
            ('h', _) => Some("%I"),
            ('m', 1) => Some("%-M"),
            ('m', _) => Some("%M"),
            ('s', 1) => Some("%-S"),
            ('s', _) => Some("%S"),
            ('f', 1..=3) => Some("%3f"),
            ('f', 4..=6) => Some("%6f"),
            ('f', _) => Some("%9f"),
            ('t', _) => Some("%p"),
            _ => None,
        };

        if let Some(spec) = spec {
            out.push_str(spec);
            i += run;
            continue;
        }

        match c {
            '\'' | '"' => {
                // Quoted literal
                let mut j = i + 1;
                while j < chars.len() && chars[j] != c {
                    push_literal(&mut out, chars[j]);
                    j += 1;
                }
                i = j + 1;
            }
            '\\' if i + 1 < chars.len() => {
                push_literal(&mut out, chars[i + 1]);
                i += 2;
            }
            _ => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Replace characters that are not allowed in file names with `_`.
pub fn sanitize_file_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}
