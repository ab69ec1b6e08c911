//! Advertisement parsing.
//!
//! Advertising data is a sequence of AD structures: one length byte
//! (covering the type byte and the payload), one type byte, payload.

/// 128-bit UUID of the Constant Tone Extension GATT service, as it appears
/// on air (least-significant byte first).
pub const CTE_SERVICE_UUID: [u8; 16] = [
    0x50, 0x69, 0x96, 0x81, 0xb7, 0xa8, 0xad, 0x07, 0x96, 0xf2, 0x3f, 0x07, 0x64, 0x36, 0xd0, 0x0e,
];

/// 128-bit UUID of the characteristic that switches CTE on in a tag.
pub const CTE_ENABLE_CHAR_UUID: [u8; 16] = [
    0xdd, 0xc4, 0xfb, 0xc9, 0xa0, 0x14, 0xd6, 0xcd, 0x1c, 0x10, 0xd6, 0x57, 0x72, 0x0b, 0x6a, 0x0d,
];

const AD_INCOMPLETE_UUID128: u8 = 0x06;
const AD_COMPLETE_UUID128: u8 = 0x07;

/// Scan report packet-type bits.
const PACKET_NON_CONNECTABLE: u8 = 0x06;
const PACKET_EXTENDED: u8 = 0x80;

/// Legacy connectable advertisement.
pub fn is_connectable(packet_type: u8) -> bool {
    packet_type & PACKET_NON_CONNECTABLE == 0
}

/// Extended advertisement (may point at a periodic train).
pub fn is_extended(packet_type: u8) -> bool {
    packet_type & PACKET_EXTENDED != 0
}

/// True if `data` lists `uuid` in a complete or incomplete 128-bit service
/// UUID list. Truncated structures end the walk.
pub fn find_service_in_advertisement(data: &[u8], uuid: &[u8; 16]) -> bool {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        let ad_type = data[i + 1];
        if ad_type == AD_INCOMPLETE_UUID128 || ad_type == AD_COMPLETE_UUID128 {
            let uuids = &data[i + 2..i + 1 + len];
            if uuids.chunks_exact(16).any(|chunk| chunk == uuid) {
                return true;
            }
        }
        i += len + 1;
    }
    false
}
