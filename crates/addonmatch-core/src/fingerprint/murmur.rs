//! 32-bit MurmurHash2 (seed 1) as used by CurseForge-compatible catalogs.
//!
//! With whitespace normalization the bytes 9, 10, 13 and 32 are skipped
//! entirely, including from the length that seeds the hash.

const M: u32 = 0x5bd1_e995;
const SEED: u32 = 1;

pub fn is_whitespace_byte(b: u8) -> bool {
    matches!(b, 9 | 10 | 13 | 32)
}

pub fn murmur2(input: &[u8], normalize_whitespace: bool) -> u32 {
    let length = if normalize_whitespace {
        input.iter().filter(|b| !is_whitespace_byte(**b)).count()
    } else {
        input.len()
    };

    // The seed mixes in the length truncated to 32 bits.
    let mut hash = SEED ^ (length as u32);
    let mut word: u32 = 0;
    let mut shift = 0;

    for &b in input {
        if normalize_whitespace && is_whitespace_byte(b) {
            continue;
        }
        word |= u32::from(b) << shift;
        shift += 8;
        if shift == 32 {
            let mut k = word.wrapping_mul(M);
            k = (k ^ (k >> 24)).wrapping_mul(M);
            hash = hash.wrapping_mul(M) ^ k;
            word = 0;
            shift = 0;
        }
    }

    if shift > 0 {
        hash = (hash ^ word).wrapping_mul(M);
    }

    hash = (hash ^ (hash >> 13)).wrapping_mul(M);
    hash ^ (hash >> 15)
}
