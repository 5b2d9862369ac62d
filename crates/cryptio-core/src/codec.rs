//! Lossless text <-> UTF-8 byte conversion.
//!
//! Text is processed as UTF-16 code units so surrogate pairs are handled
//! explicitly: a high surrogate must be followed by a low surrogate, and code
//! points above `0xFFFF` are re-split into a pair on the way back.

use thiserror::Error;

const HIGH_SURROGATES: std::ops::RangeInclusive<u16> = 0xD800..=0xDBFF;
const LOW_SURROGATES: std::ops::RangeInclusive<u16> = 0xDC00..=0xDFFF;
const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Failures while turning text into bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A high surrogate was the final code unit.
    #[error("incomplete surrogate pair at index {index}")]
    IncompleteSurrogatePair { index: usize },
    /// A high surrogate was followed by something other than a low surrogate.
    #[error("code unit 0x{unit:04x} at index {index} is not a low surrogate")]
    InvalidLowSurrogate { unit: u16, index: usize },
}

/// Failures while turning bytes back into text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("incomplete {expected}-byte sequence at index {index}")]
    Truncated { expected: usize, index: usize },
    #[error("unknown multibyte start 0x{byte:02x} at index {index}")]
    UnknownLeadByte { byte: u8, index: usize },
    #[error("invalid continuation byte 0x{byte:02x} at index {index}")]
    InvalidContinuation { byte: u8, index: usize },
    #[error("code point 0x{code_point:x} exceeds UTF-16 reach")]
    CodePointOutOfRange { code_point: u32 },
    /// The decoded units contain a surrogate that has no partner.
    #[error("decoded text contains an unpaired surrogate")]
    UnpairedSurrogate,
}

/// Encode a string as UTF-8 bytes by walking its UTF-16 code units.
pub fn encode(text: &str) -> Result<Vec<u8>, EncodeError> {
    let units: Vec<u16> = text.encode_utf16().collect();
    encode_units(&units)
}

/// Encode raw UTF-16 code units as UTF-8 bytes.
pub fn encode_units(units: &[u16]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(units.len() * 3);
    let mut index = 0;

    while index < units.len() {
        let unit = units[index];
        let code = u32::from(unit);

        if code < 0x80 {
            out.push(code as u8);
        } else if code < 0x800 {
            out.push(0xC0 | (code >> 6) as u8);
            out.push(0x80 | (code & 0x3F) as u8);
        } else if HIGH_SURROGATES.contains(&unit) {
            let Some(&low) = units.get(index + 1) else {
                return Err(EncodeError::IncompleteSurrogatePair { index });
            };
            if !LOW_SURROGATES.contains(&low) {
                return Err(EncodeError::InvalidLowSurrogate {
                    unit: low,
                    index: index + 1,
                });
            }

            let code_point = 0x10000 + ((code & 0x3FF) << 10) + (u32::from(low) & 0x3FF);
            out.push(0xF0 | (code_point >> 18) as u8);
            out.push(0x80 | ((code_point >> 12) & 0x3F) as u8);
            out.push(0x80 | ((code_point >> 6) & 0x3F) as u8);
            out.push(0x80 | (code_point & 0x3F) as u8);
            index += 1;
        } else {
            out.push(0xE0 | (code >> 12) as u8);
            out.push(0x80 | ((code >> 6) & 0x3F) as u8);
            out.push(0x80 | (code & 0x3F) as u8);
        }

        index += 1;
    }

    Ok(out)
}

/// Decode UTF-8 bytes into a string.
pub fn decode(bytes: &[u8]) -> Result<String, DecodeError> {
    let units = decode_units(bytes)?;
    String::from_utf16(&units).map_err(|_| DecodeError::UnpairedSurrogate)
}

/// Decode UTF-8 bytes into UTF-16 code units.
pub fn decode_units(bytes: &[u8]) -> Result<Vec<u16>, DecodeError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        let lead = bytes[index];
        let (len, initial) = match lead {
            0x00..=0x7F => (1, u32::from(lead)),
            0xC0..=0xDF => (2, u32::from(lead & 0x1F)),
            0xE0..=0xEF => (3, u32::from(lead & 0x0F)),
            0xF0..=0xF7 => (4, u32::from(lead & 0x07)),
            _ => return Err(DecodeError::UnknownLeadByte { byte: lead, index }),
        };

        if index + len > bytes.len() {
            return Err(DecodeError::Truncated {
                expected: len,
                index,
            });
        }

        let mut code_point = initial;
        for (offset, &byte) in bytes[index + 1..index + len].iter().enumerate() {
            if byte & 0xC0 != 0x80 {
                return Err(DecodeError::InvalidContinuation {
                    byte,
                    index: index + 1 + offset,
                });
            }
            code_point = (code_point << 6) | u32::from(byte & 0x3F);
        }

        push_code_point(&mut units, code_point)?;
        index += len;
    }

    Ok(units)
}

fn push_code_point(units: &mut Vec<u16>, code_point: u32) -> Result<(), DecodeError> {
    if code_point <= 0xFFFF {
        units.push(code_point as u16);
    } else if code_point <= MAX_CODE_POINT {
        let offset = code_point - 0x10000;
        units.push(0xD800 | (offset >> 10) as u16);
        units.push(0xDC00 | (offset & 0x3FF) as u16);
    } else {
        return Err(DecodeError::CodePointOutOfRange { code_point });
    }
    Ok(())
}
