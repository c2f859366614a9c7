//! JVM "modified UTF-8" as stored in `CONSTANT_Utf8_info`.
//!
//! Differs from standard UTF-8 in two places: NUL is written as `C0 80`,
//! and supplementary characters are written as a surrogate pair, each half
//! encoded as its own three-byte sequence.

/// Decode constant bytes to text. Malformed sequences become U+FFFD.
pub fn decode(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 && continuation(bytes, i + 1) {
            let b1 = bytes[i + 1];
            units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 && continuation(bytes, i + 1) && continuation(bytes, i + 2) {
            let b1 = bytes[i + 1];
            let b2 = bytes[i + 2];
            units.push(
                (((b0 & 0x0F) as u16) << 12) | (((b1 & 0x3F) as u16) << 6) | (b2 & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }

    String::from_utf16_lossy(&units)
}

fn continuation(bytes: &[u8], at: usize) -> bool {
    bytes.get(at).map_or(false, |b| b & 0xC0 == 0x80)
}

/// Encode text for a constant.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
