//! Logging helpers for wire-level diagnostics: hex dumps of frames and
//! single-line escaping of text that arrived over the radio.

/// Render bytes as space-separated uppercase hex, truncated with an ellipsis
/// past `MAX_DUMP` bytes so one corrupt frame cannot flood the log.
pub fn hex_dump(data: &[u8]) -> String {
    const MAX_DUMP: usize = 64;
    use std::fmt::Write;
    let mut out = String::with_capacity(data.len().min(MAX_DUMP) * 3 + 4);
    for (i, byte) in data.iter().enumerate() {
        if i >= MAX_DUMP {
            out.push('…');
            break;
        }
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02X}", byte);
    }
    out
}

/// Escape a radio-supplied string for single-line logging: control
/// characters become escapes so a hostile node identifier cannot break
/// log lines.
pub fn escape_log(s: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_hex_with_spaces() {
        assert_eq!(hex_dump(&[0x7E, 0x00, 0x04]), "7E 00 04");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn long_dump_is_truncated() {
        let out = hex_dump(&[0xAA; 100]);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("a\nb\tc"), "a\\nb\\tc");
        assert_eq!(escape_log("\x07"), "\\x07");
    }
}
