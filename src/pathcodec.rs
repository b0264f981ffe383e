//! Filesystem-safe encoding of arbitrary host paths.
//!
//! Work-copy directories are keyed by the host path they mirror. The
//! encoding is bijective over Unicode strings and emits only characters
//! from the unreserved set `[A-Za-z0-9_\-`{}]`, so any path round-trips
//! through a single directory name.
//!
//! Codepoints outside the unreserved set become caret escapes of minimal
//! length: `^HH` up to U+00FF, then `^gHHH`, `^hHHHH`, `^iHHHHH`, and
//! `^jHHHHHH` for the astral planes.

use anyhow::{Result, bail};

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '`' | '{' | '}')
}

/// Encode any string into an unreserved-only directory name.
pub fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if is_unreserved(c) {
            out.push(c);
            continue;
        }
        let cp = c as u32;
        if cp <= 0xFF {
            out.push_str(&format!("^{cp:02x}"));
        } else if cp <= 0xFFF {
            out.push_str(&format!("^g{cp:03x}"));
        } else if cp <= 0xFFFF {
            out.push_str(&format!("^h{cp:04x}"));
        } else if cp <= 0xF_FFFF {
            out.push_str(&format!("^i{cp:05x}"));
        } else {
            out.push_str(&format!("^j{cp:06x}"));
        }
    }
    out
}

/// Invert [`encode`]. Rejects truncated escapes and invalid codepoints.
pub fn decode(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '^' {
            if !is_unreserved(c) {
                bail!("invalid character {c:?} at position {i} in encoded path");
            }
            out.push(c);
            i += 1;
            continue;
        }

        // Escape sequence: optional length modifier, then fixed-width hex.
        let (digits, skip) = match chars.get(i + 1).map(|m| m.to_ascii_lowercase()) {
            Some('g') => (3, 2),
            Some('h') => (4, 2),
            Some('i') => (5, 2),
            Some('j') => (6, 2),
            Some(_) => (2, 1),
            None => bail!("truncated escape at position {i}"),
        };

        let start = i + skip;
        let end = start + digits;
        if end > chars.len() {
            bail!("truncated escape at position {i}");
        }
        let hex: String = chars[start..end].iter().collect();
        let cp = u32::from_str_radix(&hex, 16)
            .map_err(|_| anyhow::anyhow!("invalid hex {hex:?} at position {i}"))?;
        let decoded = char::from_u32(cp)
            .ok_or_else(|| anyhow::anyhow!("invalid codepoint U+{cp:04X} at position {i}"))?;
        out.push(decoded);
        i = end;
    }

    Ok(out)
}
