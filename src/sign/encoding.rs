//! Text-safe encoding, checksum, and identifier helpers for signature envelopes.
//!
//! The platform expects envelope JSON to be base64-encoded with a private
//! alphabet, and the secondary envelope carries an `mrc` checksum that is a
//! truncated CRC-32 variant. Both are reproduced bit-for-bit here.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::alphabet::Alphabet;
use base64::engine::{GeneralPurpose, general_purpose};
use rand::Rng;

/// Private base64 alphabet used by the web client's envelope encoder.
pub const ENVELOPE_ALPHABET: &str =
    "ZmserbBoHQtNP+wOcza/LpngG8yJq42KWYj0DSfdikx3VT16IlUAFM97hECvuRX5";

const ENVELOPE_BASE64: Alphabet = match Alphabet::new(ENVELOPE_ALPHABET) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("envelope alphabet must be 64 unique printable ASCII characters"),
};

const ENVELOPE_ENGINE: GeneralPurpose =
    GeneralPurpose::new(&ENVELOPE_BASE64, general_purpose::PAD);

/// Number of leading input bytes the `mrc` checksum consumes.
const MRC_WINDOW: usize = 57;

/// Reflected CRC-32 polynomial; also folded into the final `mrc` value.
const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_crc32_table();

const TRACE_ID_ALPHABET: &[u8; 16] = b"abcdef0123456789";
const TRACE_ID_LEN: usize = 16;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0_u32; 256];
    let mut n = 0;
    while n < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 == 1 {
                CRC32_POLY ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Encodes UTF-8 text with the envelope alphabet (standard padding).
#[must_use]
pub fn envelope_encode(text: &str) -> String {
    ENVELOPE_ENGINE.encode(text.as_bytes())
}

/// Computes the `mrc` checksum carried in the `x-s-common` envelope.
///
/// CRC-32 register seeded with all ones, fed the first 57 bytes of `input`.
/// The result is `(!register ^ 0xEDB88320) - 2^32`, which is how the
/// reference client's arbitrary-precision integer arithmetic comes out; it is
/// always negative and may fall below `i32::MIN`.
#[must_use]
pub fn mrc(input: &str) -> i64 {
    let mut register = u32::MAX;
    for &byte in input.as_bytes().iter().take(MRC_WINDOW) {
        let index = ((register & 0xff) ^ u32::from(byte)) as usize;
        register = CRC32_TABLE[index] ^ (register >> 8);
    }
    i64::from(!register ^ CRC32_POLY) - (1_i64 << 32)
}

/// Generates a fresh 16-character lowercase hex trace id.
#[must_use]
pub fn trace_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TRACE_ID_LEN)
        .map(|_| char::from(TRACE_ID_ALPHABET[rng.gen_range(0..TRACE_ID_ALPHABET.len())]))
        .collect()
}

/// Generates a search session id: base36 of `(now_ms << 64) + random`.
#[must_use]
pub fn search_id() -> String {
    let entropy: u32 = rand::thread_rng().gen_range(0..2_147_483_646);
    search_id_from(now_millis(), entropy)
}

pub(crate) fn search_id_from(now_ms: u64, entropy: u32) -> String {
    base36((u128::from(now_ms) << 64) + u128::from(entropy))
}

fn base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        #[allow(clippy::cast_possible_truncation)]
        let digit = (value % 36) as usize;
        digits.push(BASE36_ALPHABET[digit]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
