//! Byte encodings for split values
//!
//! Plaintext scalars are encoded into a tagged byte string with a CRC32
//! trailer before they are split, so a recombined value can be checked
//! for integrity:
//!
//! ```text
//! [tag (1)][payload (n)][crc32 of tag+payload, big endian (4)]
//! ```
//!
//! | tag    | payload                 |
//! |--------|-------------------------|
//! | `0x01` | UTF-8 text              |
//! | `0x02` | `i64`, big endian       |
//! | `0x03` | `f64` bits, big endian  |
//! | `0x04` | `u64`, big endian       |
//!
//! Shares themselves are carried as standard base64 text.
//!
//! # Examples
//!
//! ```rust
//! use sharevault::codec::{decode_plaintext, encode_plaintext};
//! use sharevault::value::Scalar;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = encode_plaintext(&Scalar::Text("Alice".into()))?;
//! assert_eq!(decode_plaintext(&bytes)?, Scalar::Text("Alice".into()));
//! # Ok(())
//! # }
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use crc::{CRC_32_ISO_HDLC, Crc};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::value::Scalar;

/// CRC32 algorithm for plaintext integrity checking
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const TAG_TEXT: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_UINT: u8 = 0x04;

const CHECKSUM_LEN: usize = 4;

/// Encodes a scalar into tagged, checksummed bytes
///
/// # Errors
/// Returns [`CryptoError::UnsupportedValue`] for null and boolean scalars
pub fn encode_plaintext(scalar: &Scalar) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut out = Zeroizing::new(Vec::new());
    match scalar {
        Scalar::Text(s) => {
            out.push(TAG_TEXT);
            out.extend_from_slice(s.as_bytes());
        }
        Scalar::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Scalar::UInt(u) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&u.to_be_bytes());
        }
        Scalar::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Scalar::Null | Scalar::Bool(_) => {
            return Err(CryptoError::UnsupportedValue(format!(
                "{scalar:?} has no splitting scheme"
            )));
        }
    }
    let checksum = CRC32.checksum(&out);
    out.extend_from_slice(&checksum.to_be_bytes());
    Ok(out)
}

/// Decodes bytes produced by [`encode_plaintext`]
///
/// # Errors
/// Returns [`CryptoError::InvalidShareSet`] if the checksum does not match or the
/// payload is malformed, which is what recombining the wrong shares looks like
pub fn decode_plaintext(bytes: &[u8]) -> Result<Scalar, CryptoError> {
    if bytes.len() < 1 + CHECKSUM_LEN {
        return Err(invalid("recombined value is too short"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = u32::from_be_bytes(
        trailer
            .try_into()
            .map_err(|_| invalid("checksum trailer is malformed"))?,
    );
    if CRC32.checksum(body) != expected {
        return Err(invalid("checksum mismatch, shares are tampered or mismatched"));
    }

    let (tag, payload) = (body[0], &body[1..]);
    match tag {
        TAG_TEXT => String::from_utf8(payload.to_vec())
            .map(Scalar::Text)
            .map_err(|_| invalid("text payload is not UTF-8")),
        TAG_INT => fixed8(payload).map(|b| Scalar::Int(i64::from_be_bytes(b))),
        TAG_UINT => fixed8(payload).map(|b| Scalar::UInt(u64::from_be_bytes(b))),
        TAG_FLOAT => fixed8(payload).map(|b| Scalar::Float(f64::from_bits(u64::from_be_bytes(b)))),
        other => Err(invalid(&format!("unknown value tag {other:#04x}"))),
    }
}

/// Encodes raw share bytes as text
#[must_use]
pub fn encode_share(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes share text back into raw bytes
///
/// # Errors
/// Returns [`CryptoError::InvalidShareSet`] if the text is not valid base64
pub fn decode_share(text: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    STANDARD
        .decode(text)
        .map(Zeroizing::new)
        .map_err(|e| invalid(&format!("share is not valid base64: {e}")))
}

fn fixed8(payload: &[u8]) -> Result<[u8; 8], CryptoError> {
    payload
        .try_into()
        .map_err(|_| invalid("numeric payload must be 8 bytes"))
}

fn invalid(reason: &str) -> CryptoError {
    CryptoError::InvalidShareSet(reason.to_string())
}
