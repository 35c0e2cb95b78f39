//! Stat string codec
//!
//! Game announcements carry their map settings in a null-free encoding:
//! the payload is split into blocks of up to seven bytes, each prefixed by
//! a mask byte. Even bytes are stored incremented (so no byte is ever
//! zero) with their mask bit cleared; odd bytes are stored as-is with the
//! mask bit set. Bit 0 of the mask keeps the mask byte itself odd.

use bytes::Buf;

use crate::{Error, Result};

const BLOCK_DATA_LEN: usize = 7;

/// Encode a payload into the null-free wire form.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / BLOCK_DATA_LEN + 1);

    for chunk in data.chunks(BLOCK_DATA_LEN) {
        let mut mask = 1u8;
        for (i, &b) in chunk.iter().enumerate() {
            if b % 2 != 0 {
                mask |= 1 << (i + 1);
            }
        }

        out.push(mask);
        for &b in chunk {
            if b % 2 == 0 {
                out.push(b + 1);
            } else {
                out.push(b);
            }
        }
    }

    out
}

/// Decode the null-free wire form back into the original payload.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());

    for chunk in data.chunks(BLOCK_DATA_LEN + 1) {
        let mask = chunk[0];
        for (i, &b) in chunk[1..].iter().enumerate() {
            if mask & (1 << (i + 1)) == 0 {
                out.push(b.wrapping_sub(1));
            } else {
                out.push(b);
            }
        }
    }

    out
}

/// Map and host details carried inside the stat string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub settings_flags: u32,
    pub map_width: u16,
    pub map_height: u16,
    pub map_crc: u32,
    pub map_path: String,
    pub host_name: String,
}

impl MapInfo {
    /// Parse from a decoded stat string payload.
    pub fn parse(mut data: &[u8]) -> Result<MapInfo> {
        if data.remaining() < 12 {
            return Err(Error::Truncated {
                need: 12,
                have: data.remaining(),
            });
        }

        let settings_flags = data.get_u32_le();
        let map_width = data.get_u16_le();
        let map_height = data.get_u16_le();
        let map_crc = data.get_u32_le();
        let map_path = read_cstring(&mut data)?;
        let host_name = read_cstring(&mut data)?;
        // A checksum trailer may follow; it is not needed here.

        Ok(MapInfo {
            settings_flags,
            map_width,
            map_height,
            map_crc,
            map_path,
            host_name,
        })
    }

    /// Serialize to the decoded payload form (the inverse of [`parse`]).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.map_path.len() + self.host_name.len() + 2);
        out.extend_from_slice(&self.settings_flags.to_le_bytes());
        out.extend_from_slice(&self.map_width.to_le_bytes());
        out.extend_from_slice(&self.map_height.to_le_bytes());
        out.extend_from_slice(&self.map_crc.to_le_bytes());
        out.extend_from_slice(self.map_path.as_bytes());
        out.push(0);
        out.extend_from_slice(self.host_name.as_bytes());
        out.push(0);
        out
    }
}

fn read_cstring(data: &mut &[u8]) -> Result<String> {
    let pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Protocol("unterminated string in stat string".into()))?;
    let s = String::from_utf8_lossy(&data[..pos]).into_owned();
    data.advance(pos + 1);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cases: &[&[u8]] = &[
            b"",
            b"\x00",
            b"\x01",
            b"\xff",
            b"\x00\x01\x02\x03\x04\x05\x06",       // exactly one block
            b"\x00\x01\x02\x03\x04\x05\x06\x07",   // spills into a second block
            b"Maps\\(8)Sanctuary.w3x\x00arthas\x00",
        ];

        for case in cases {
            assert_eq!(decode(&encode(case)), *case, "case {:02x?}", case);
        }
    }

    #[test]
    fn test_encoded_form_is_null_free() {
        let encoded = encode(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(encoded.iter().all(|&b| b != 0));
    }

    #[test]
    fn test_mask_tracks_parity() {
        // One even byte: stored incremented, mask bit clear.
        assert_eq!(encode(&[2]), vec![0x01, 3]);
        // One odd byte: stored as-is, mask bit set.
        assert_eq!(encode(&[3]), vec![0x03, 3]);
    }

    #[test]
    fn test_map_info_round_trip() {
        let info = MapInfo {
            settings_flags: 0x4000,
            map_width: 128,
            map_height: 96,
            map_crc: 0xCAFEBABE,
            map_path: "Maps\\FrozenThrone\\(4)TwistedMeadows.w3x".to_string(),
            host_name: "jaina".to_string(),
        };

        assert_eq!(MapInfo::parse(&info.to_bytes()).unwrap(), info);
    }

    #[test]
    fn test_map_info_rejects_truncation() {
        assert!(MapInfo::parse(&[0u8; 8]).is_err());

        let info = MapInfo {
            settings_flags: 0,
            map_width: 1,
            map_height: 1,
            map_crc: 0,
            map_path: "m".to_string(),
            host_name: "h".to_string(),
        };
        let mut bytes = info.to_bytes();
        bytes.pop(); // drop the host name terminator
        assert!(MapInfo::parse(&bytes).is_err());
    }
}
