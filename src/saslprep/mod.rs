//! RFC 4013 SASLprep password preparation.
//!
//! SCRAM-SHA-256 feeds the password to key derivation as-is, so it must be
//! prepared with the SASLprep stringprep profile first. With the `unicode`
//! feature the full pipeline runs: map, NFKC-normalize, prohibit, bidi
//! check, re-encode. Without it, only printable ASCII passwords are
//! accepted and pass through verbatim.

#[cfg(feature = "unicode")]
mod utf8;

#[cfg(feature = "unicode")]
pub(crate) use unicode::sasl_prep;

/// Whether `s` contains anything outside printable ASCII.
///
/// Control characters sit below 0x20, multibyte UTF-8 and DEL sit at 0x7F
/// and above; everything in between needs no preparation.
pub(crate) fn sasl_prep_required(s: &str) -> bool {
    s.bytes().any(|b| !(0x20..0x7f).contains(&b))
}

#[cfg(not(feature = "unicode"))]
pub(crate) fn sasl_prep(password: &str) -> crate::error::Result<String> {
    if sasl_prep_required(password) {
        return Err(crate::error::Error::protocol(
            "unicode support required to SASLprep password",
        ));
    }
    Ok(password.to_owned())
}

#[cfg(feature = "unicode")]
mod unicode {
    use stringprep::tables;
    use unicode_normalization::UnicodeNormalization;

    use super::{sasl_prep_required, utf8};
    use crate::error::{Error, Result};

    pub(crate) fn sasl_prep(password: &str) -> Result<String> {
        if !sasl_prep_required(password) {
            return Ok(password.to_owned());
        }
        prepare(password)
    }

    fn in_table(code: u32, table: fn(char) -> bool) -> bool {
        char::from_u32(code).is_some_and(table)
    }

    fn to_char(code: u32) -> Result<char> {
        char::from_u32(code).ok_or_else(|| Error::protocol("invalid code point in password"))
    }

    /// Prohibited output per RFC 4013 section 2.3: control characters,
    /// private use, non-characters, surrogates, text inappropriate for
    /// plain text or canonical representation, display-property changers,
    /// tagging characters, and non-ASCII spaces (already mapped away).
    fn is_prohibited(code: u32) -> bool {
        in_table(code, tables::ascii_control_character)
            || in_table(code, tables::non_ascii_control_character)
            || in_table(code, tables::private_use)
            || in_table(code, tables::non_character_code_point)
            || in_table(code, tables::surrogate_code)
            || in_table(code, tables::inappropriate_for_plain_text)
            || in_table(code, tables::inappropriate_for_canonical_representation)
            || in_table(code, tables::change_display_properties_or_deprecated)
            || in_table(code, tables::tagging_character)
            || in_table(code, tables::non_ascii_space_character)
    }

    fn prepare(password: &str) -> Result<String> {
        let mut codes = utf8::decode_string(password.as_bytes())
            .ok_or_else(|| Error::protocol("could not calculate UTF-8 length of password"))?;

        // RFC 3454 step 1: map. Read and write cursors walk the buffer in
        // place; mapping a character to nothing skips the write.
        let mut write = 0;
        let mut read = 0;
        while read < codes.len() {
            let code = codes[read];
            read += 1;
            if in_table(code, tables::non_ascii_space_character) {
                codes[write] = 0x20;
                write += 1;
            } else if in_table(code, tables::commonly_mapped_to_nothing) {
                // dropped
            } else {
                codes[write] = code;
                write += 1;
            }
        }
        codes.truncate(write);

        // RFC 3454 step 2: Unicode normalization form KC.
        let mapped = codes
            .iter()
            .map(|&code| to_char(code))
            .collect::<Result<String>>()?;
        let codes: Vec<u32> = mapped.nfkc().map(u32::from).collect();

        // RFC 3454 step 3: prohibited output, including unassigned code
        // points (table A.1).
        for &code in &codes {
            if is_prohibited(code) || in_table(code, tables::unassigned_code_point) {
                return Err(Error::protocol("prohibited character in password"));
            }
        }

        // RFC 3454 step 6: bidi. A string containing RandALCat characters
        // may not also contain LCat characters, and must both start and end
        // with a RandALCat character.
        let contains_r_and_al = codes.iter().any(|&c| in_table(c, tables::bidi_r_or_al));
        if contains_r_and_al {
            if codes.iter().any(|&c| in_table(c, tables::bidi_l)) {
                return Err(Error::protocol(
                    "prohibited bidirectional string in password",
                ));
            }
            let edges_ok = match (codes.first(), codes.last()) {
                (Some(&first), Some(&last)) => {
                    in_table(first, tables::bidi_r_or_al) && in_table(last, tables::bidi_r_or_al)
                }
                _ => false,
            };
            if !edges_ok {
                return Err(Error::protocol(
                    "prohibited bidirectional string in password",
                ));
            }
        }

        // Convert back to UTF-8, preflighting the output length.
        let mut out_len = 0;
        for &code in &codes {
            out_len += utf8::codepoint_len(code)
                .ok_or_else(|| Error::protocol("invalid code point in password"))?;
        }
        let mut bytes = Vec::with_capacity(out_len);
        for &code in &codes {
            if !utf8::push_codepoint(code, &mut bytes) {
                return Err(Error::protocol("invalid code point in password"));
            }
        }
        String::from_utf8(bytes).map_err(|_| Error::protocol("invalid code point in password"))
    }
}
