//! Key → hash slot mapping.

/// Number of hash slots in a cluster.
pub const HASH_SLOTS: usize = 16384;

/// Slot owning `key`.
///
/// When the key contains a `{...}` hash tag with at least one byte between
/// the first `{` and the next `}`, only the tag is hashed, so related keys
/// such as `{user:42}:name` and `{user:42}:email` land on the same slot.
pub fn key_slot(key: &[u8]) -> u16 {
    let hashed = hash_tag(key).unwrap_or(key);
    // HASH_SLOTS is a power of two, so the remainder always fits in u16.
    (crc16(hashed) as usize % HASH_SLOTS) as u16
}

fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let start = key.iter().position(|&b| b == b'{')? + 1;
    let len = key[start..].iter().position(|&b| b == b'}')?;
    (len > 0).then(|| &key[start..start + len])
}

/// CRC16-XMODEM (polynomial 0x1021, zero initial value).
pub(crate) fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
