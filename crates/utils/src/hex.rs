/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// Fixed-width hexadecimal id codec used by X.500 DN synthesis: eight
/// uppercase nibbles, most significant first.
pub fn encode_hex_int(value: u32) -> String {
    format!("{value:08X}")
}

pub fn decode_hex_int(text: &str) -> Option<u32> {
    let digits = text.as_bytes().get(..8)?;
    let mut value = 0u32;
    for &ch in digits {
        value = (value << 4) | (ch as char).to_digit(16)?;
    }
    Some(value)
}

pub fn encode_hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02X}");
    }
    out
}

pub fn decode_hex_bytes(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some(((hi << 4) | lo) as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_int_roundtrip() {
        assert_eq!(encode_hex_int(17), "00000011");
        assert_eq!(encode_hex_int(42), "0000002A");
        assert_eq!(decode_hex_int("0000002A"), Some(42));
        assert_eq!(decode_hex_int("0000002Axyz"), Some(42));
        assert_eq!(decode_hex_int("zz"), None);
    }

    #[test]
    fn hex_bytes_roundtrip() {
        let bytes = [0x04, 0x00, 0xe0, 0x8f];
        assert_eq!(encode_hex_bytes(&bytes), "0400E08F");
        assert_eq!(decode_hex_bytes("0400e08f").unwrap(), bytes);
    }
}
