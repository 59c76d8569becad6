//! Line protocol between the sidecar and its host.
//!
//! The sidecar writes one UTF-8 line `FOUND:<port>` to stdout per port change.
//! Any other line is diagnostic output and carries no meaning for the host.

/// Prefix of the only contractual stdout line.
pub const FOUND_PREFIX: &str = "FOUND:";

/// Formats a port change line (without the trailing newline).
pub fn format_found(port: u16) -> String {
    format!("{}{}", FOUND_PREFIX, port)
}

/// Classification of one line read from the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// A well-formed `FOUND:<port>` line
    Found(u16),
    /// A line with the `FOUND:` prefix whose port does not parse
    Malformed(&'a str),
    /// Anything else
    Diagnostic(&'a str),
}

/// Classifies a single line of sidecar output.
///
/// Surrounding whitespace (including `\r`) is ignored. Port 0 is not a valid
/// announcement and is reported as malformed.
pub fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    match trimmed.strip_prefix(FOUND_PREFIX) {
        Some(rest) => match rest.trim().parse::<u16>() {
            Ok(port) if port != 0 => Line::Found(port),
            _ => Line::Malformed(trimmed),
        },
        None => Line::Diagnostic(trimmed),
    }
}
