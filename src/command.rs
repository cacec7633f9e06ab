//! Colour command extraction from raw server-pushed event payloads.
//!
//! The realtime database pushes chunks that may contain a JSON-like
//! fragment with a quoted `0x......` hex token, a keep-alive heartbeat,
//! or the literal `null` marker. The parser works on raw bytes from a
//! fixed-size receive buffer: payloads may carry embedded NULs and are
//! not guaranteed to be terminated, so nothing here assumes valid UTF-8
//! beyond the token itself, and nothing allocates.

use log::warn;

const HEX_PREFIX: &[u8] = b"0x";
const NULL_MARKER: &[u8] = b"null";

/// A transient 24-bit colour command. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorCommand {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorCommand {
    /// Split a packed 24-bit value into channels.
    pub fn from_packed(value: u32) -> Self {
        Self {
            red: ((value >> 16) & 0xFF) as u8,
            green: ((value >> 8) & 0xFF) as u8,
            blue: (value & 0xFF) as u8,
        }
    }

    /// Recompose the packed 24-bit value.
    pub fn packed(self) -> u32 {
        (u32::from(self.red) << 16) | (u32::from(self.green) << 8) | u32::from(self.blue)
    }
}

/// Extract a colour command from a raw event payload.
///
/// Returns `None` for the `null` keep-alive marker (expected and silent),
/// and for any malformed payload (diagnostics logged): no `0x` token, no
/// closing quote after the token, non-hex digits, or a value above
/// 0xFFFFFF. The lamp is never driven from invalid input.
pub fn parse(raw: &[u8]) -> Option<ColorCommand> {
    // Keep-alive events carry the null marker; frequent and expected.
    if find(raw, NULL_MARKER).is_some() {
        return None;
    }

    let Some(start) = find(raw, HEX_PREFIX) else {
        warn!("command: no hex token in event payload ({} bytes)", raw.len());
        return None;
    };

    let rest = &raw[start..];
    let Some(end) = rest.iter().position(|&b| b == b'"') else {
        warn!("command: hex token missing closing quote");
        return None;
    };

    let value = parse_hex24(&rest[..end])?;
    Some(ColorCommand::from_packed(value))
}

/// Parse a `0x`-prefixed hex literal, valid only up to 0xFFFFFF.
fn parse_hex24(token: &[u8]) -> Option<u32> {
    let digits = token.strip_prefix(HEX_PREFIX)?;
    if digits.is_empty() {
        warn!("command: empty hex token");
        return None;
    }
    let digits = core::str::from_utf8(digits).ok()?;
    match u32::from_str_radix(digits, 16) {
        Ok(value) if value <= 0xFF_FFFF => Some(value),
        Ok(value) => {
            warn!("command: colour 0x{value:X} out of 24-bit range");
            None
        }
        Err(_) => {
            warn!("command: unparsable hex token {digits:?}");
            None
        }
    }
}

/// First occurrence of `needle` in `haystack`, byte-wise.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_token_splits_channels() {
        let cmd = parse(b"data: {\"path\":\"/\",\"data\":\"0xFF8001\"}").unwrap();
        assert_eq!(cmd, ColorCommand { red: 0xFF, green: 0x80, blue: 0x01 });
    }

    #[test]
    fn packed_roundtrip() {
        let cmd = ColorCommand::from_packed(0x123456);
        assert_eq!(cmd.packed(), 0x123456);
    }

    #[test]
    fn null_marker_is_silent_none() {
        assert_eq!(parse(b"data: {\"path\":\"/\",\"data\":null}"), None);
        // The marker wins even if a token follows it.
        assert_eq!(parse(b"null \"0x112233\""), None);
    }

    #[test]
    fn missing_prefix_yields_none() {
        assert_eq!(parse(b"data: {\"data\":\"FF8001\"}"), None);
        assert_eq!(parse(b""), None);
    }

    #[test]
    fn missing_closing_quote_yields_none() {
        assert_eq!(parse(b"data: \"0xFF8001"), None);
    }

    #[test]
    fn out_of_range_yields_none() {
        assert_eq!(parse(b"\"0x1000000\""), None);
        assert_eq!(parse(b"\"0xFFFFFFFF\""), None);
    }

    #[test]
    fn boundary_values_accepted() {
        assert_eq!(parse(b"\"0x000000\"").unwrap().packed(), 0x000000);
        assert_eq!(parse(b"\"0xFFFFFF\"").unwrap().packed(), 0xFFFFFF);
        // Short literals are still valid hex.
        assert_eq!(parse(b"\"0xF\"").unwrap().packed(), 0xF);
    }

    #[test]
    fn garbage_digits_yield_none() {
        assert_eq!(parse(b"\"0xZZZZZZ\""), None);
        assert_eq!(parse(b"\"0x\""), None);
    }

    #[test]
    fn embedded_nul_bytes_tolerated() {
        let mut buf = [0u8; 32];
        let payload = b"\"0x0A0B0C\"";
        buf[..payload.len()].copy_from_slice(payload);
        // Trailing NULs from the fixed-size receive buffer.
        assert_eq!(parse(&buf).unwrap().packed(), 0x0A0B0C);
    }

    #[test]
    fn nul_inside_token_rejected() {
        assert_eq!(parse(b"\"0x0A\x000C\""), None);
    }
}
