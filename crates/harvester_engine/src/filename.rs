use sha2::{Digest, Sha256};

/// Windows-safe, deterministic output name: `{sanitized_source}--{short_hash(endpoint)}.{ext}`.
///
/// Two sources sharing a name but not an endpoint never overwrite each other.
pub fn deterministic_filename(source: &str, endpoint: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    format!("{}.{extension}", file_stem(source, endpoint))
}

/// `{sanitized_source}--{short_hash(key)}`, shared by exports and page archives.
pub(crate) fn file_stem(source: &str, key: &str) -> String {
    format!("{}--{}", sanitize_source(source), short_hash(key))
}

fn sanitize_source(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }

    let mut name = compacted.trim_matches(['_', '.']).to_string();
    if name.is_empty() {
        name = "harvest".to_string();
    }
    if name.chars().count() > 80 {
        name = name.chars().take(80).collect();
    }
    if is_reserved_windows_name(&name) {
        name.push('_');
    }
    name
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).fold(String::with_capacity(8), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}
