/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::cmp::Ordering;

pub const CP_UTF8: u32 = 65001;
pub const CP_WESTERN: u32 = 1252;
pub const CP_ASCII: u32 = 20127;

/// Windows codepage id to MIME charset name. Only the pages the wire
/// contract actually produces are mapped; everything else falls back to
/// UTF-8.
pub fn cpid_to_charset(cpid: u32) -> &'static str {
    match cpid {
        437 => "ibm437",
        850 => "ibm850",
        874 => "windows-874",
        932 => "shift_jis",
        936 => "gb2312",
        949 => "euc-kr",
        950 => "big5",
        1250 => "windows-1250",
        1251 => "windows-1251",
        1252 => "windows-1252",
        1253 => "windows-1253",
        1254 => "windows-1254",
        1255 => "windows-1255",
        1256 => "windows-1256",
        1257 => "windows-1257",
        1258 => "windows-1258",
        20127 => "us-ascii",
        20866 => "koi8-r",
        28591 => "iso-8859-1",
        28592 => "iso-8859-2",
        28595 => "iso-8859-5",
        28597 => "iso-8859-7",
        28599 => "iso-8859-9",
        28605 => "iso-8859-15",
        50220 | 50221 | 50222 => "iso-2022-jp",
        51932 => "euc-jp",
        54936 => "gb18030",
        _ => "utf-8",
    }
}

pub fn charset_to_cpid(charset: &str) -> Option<u32> {
    Some(match charset.to_ascii_lowercase().as_str() {
        "ibm437" => 437,
        "ibm850" => 850,
        "windows-874" => 874,
        "shift_jis" => 932,
        "gb2312" | "gbk" => 936,
        "euc-kr" | "ks_c_5601-1987" => 949,
        "big5" => 950,
        "windows-1250" => 1250,
        "windows-1251" => 1251,
        "windows-1252" => 1252,
        "windows-1253" => 1253,
        "windows-1254" => 1254,
        "windows-1255" => 1255,
        "windows-1256" => 1256,
        "windows-1257" => 1257,
        "windows-1258" => 1258,
        "us-ascii" => 20127,
        "koi8-r" => 20866,
        "iso-8859-1" | "latin1" => 28591,
        "iso-8859-2" => 28592,
        "iso-8859-5" => 28595,
        "iso-8859-7" => 28597,
        "iso-8859-9" => 28599,
        "iso-8859-15" => 28605,
        "iso-2022-jp" => 50221,
        "euc-jp" => 51932,
        "gb18030" => 54936,
        "utf-8" | "utf8" => 65001,
        _ => return None,
    })
}

/// ASCII-folded ordering used for GAL and sibling display-name sorts.
pub fn casefold_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.bytes().map(|c| c.to_ascii_lowercase());
    let mut bi = b.bytes().map(|c| c.to_ascii_lowercase());
    loop {
        match (ai.next(), bi.next()) {
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_mapping_roundtrip() {
        assert_eq!(cpid_to_charset(1252), "windows-1252");
        assert_eq!(charset_to_cpid("WINDOWS-1252"), Some(1252));
        assert_eq!(charset_to_cpid(cpid_to_charset(65001)), Some(65001));
        assert_eq!(cpid_to_charset(99999), "utf-8");
    }

    #[test]
    fn casefold_ordering() {
        assert_eq!(casefold_cmp("Alice", "alice"), Ordering::Equal);
        assert_eq!(casefold_cmp("alice", "Bob"), Ordering::Less);
        assert_eq!(casefold_cmp("bob", "Alice"), Ordering::Greater);
    }
}
