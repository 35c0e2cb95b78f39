//! W3GS wire protocol
//!
//! The subset of the classic Warcraft III LAN protocol the bridge speaks:
//! `SearchGame` queries, `GameInfo` announcements, `RefreshGame` /
//! `DecreateGame` broadcast updates, and the TCP `Join` request.
//!
//! Every packet starts with a four byte header: the `0xF7` signature, a
//! packet id, and the total packet length (header included) as a
//! little-endian u16. Announcements are re-emitted from their raw received
//! bytes, never re-encoded, so the decoder only has to be faithful enough
//! for display and routing.

pub mod stat_string;

use bytes::{Buf, BufMut};

use crate::{Error, Result};

/// First byte of every W3GS packet.
pub const SIGNATURE: u8 = 0xF7;

/// Packet header length (signature, id, u16 length).
pub const HEADER_LEN: usize = 4;

/// The canonical game LAN port.
pub const LAN_PORT: u16 = 6112;

/// Packet ids.
pub mod id {
    pub const JOIN: u8 = 0x1E;
    pub const SEARCH_GAME: u8 = 0x2F;
    pub const GAME_INFO: u8 = 0x30;
    pub const REFRESH_GAME: u8 = 0x32;
    pub const DECREATE_GAME: u8 = 0x33;
}

/// Four-character product code.
///
/// Stored in reading order; the wire carries it reversed (the code is a
/// little-endian dword of the ASCII characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product(pub [u8; 4]);

impl Product {
    /// The Frozen Throne expansion.
    pub const TFT: Product = Product(*b"W3XP");

    /// Reign of Chaos.
    pub const ROC: Product = Product(*b"WAR3");

    /// Parse a product code from its string form (aliases accepted).
    pub fn parse(s: &str) -> Result<Product> {
        match s {
            "W3XP" | "TFT" => Ok(Product::TFT),
            "WAR3" | "ROC" => Ok(Product::ROC),
            other => Err(Error::UnknownProduct(other.to_string())),
        }
    }

    fn put(self, buf: &mut Vec<u8>) {
        let mut bytes = self.0;
        bytes.reverse();
        buf.put_slice(&bytes);
    }

    fn get(buf: &mut &[u8]) -> Result<Product> {
        let mut bytes = [0u8; 4];
        take(buf, &mut bytes)?;
        bytes.reverse();
        Ok(Product(bytes))
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Product plus protocol version, as carried in queries and announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameVersion {
    pub product: Product,
    pub version: u32,
}

impl Default for Product {
    fn default() -> Self {
        Product::TFT
    }
}

impl std::fmt::Display for GameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} 1.{}", self.product, self.version)
    }
}

/// A game discovery query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGame {
    pub game_version: GameVersion,
    pub host_counter: u32,
}

impl SearchGame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        put_header(&mut buf, id::SEARCH_GAME);
        self.game_version.product.put(&mut buf);
        buf.put_u32_le(self.game_version.version);
        buf.put_u32_le(self.host_counter);
        finish(&mut buf);
        buf
    }

    fn decode(mut body: &[u8]) -> Result<SearchGame> {
        let product = Product::get(&mut body)?;
        let version = get_u32(&mut body)?;
        let host_counter = get_u32(&mut body)?;

        Ok(SearchGame {
            game_version: GameVersion { product, version },
            host_counter,
        })
    }
}

/// A game announcement.
///
/// Map path and host name live inside the encoded stat string; decode them
/// on demand via [`GameInfo::map_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub game_version: GameVersion,
    pub host_counter: u32,
    pub entry_key: u32,
    pub name: String,
    pub stat_string: Vec<u8>,
    pub slots_total: u32,
    pub flags: u32,
    pub slots_used: u32,
    pub slots_available: u32,
    pub uptime_sec: u32,
    pub game_port: u16,
}

impl GameInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 64 + self.stat_string.len());
        put_header(&mut buf, id::GAME_INFO);
        self.game_version.product.put(&mut buf);
        buf.put_u32_le(self.game_version.version);
        buf.put_u32_le(self.host_counter);
        buf.put_u32_le(self.entry_key);
        put_cstring(&mut buf, &self.name);
        buf.put_u8(0); // unused password field
        buf.put_slice(&self.stat_string);
        buf.put_u8(0);
        buf.put_u32_le(self.slots_total);
        buf.put_u32_le(self.flags);
        buf.put_u32_le(self.slots_used);
        buf.put_u32_le(self.slots_available);
        buf.put_u32_le(self.uptime_sec);
        buf.put_u16_le(self.game_port);
        finish(&mut buf);
        buf
    }

    fn decode(mut body: &[u8]) -> Result<GameInfo> {
        let product = Product::get(&mut body)?;
        let version = get_u32(&mut body)?;
        let host_counter = get_u32(&mut body)?;
        let entry_key = get_u32(&mut body)?;
        let name = get_cstring(&mut body)?;
        let _password = get_cstring(&mut body)?;
        let stat_string = get_cstring_bytes(&mut body)?;
        let slots_total = get_u32(&mut body)?;
        let flags = get_u32(&mut body)?;
        let slots_used = get_u32(&mut body)?;
        let slots_available = get_u32(&mut body)?;
        let uptime_sec = get_u32(&mut body)?;
        let game_port = get_u16(&mut body)?;

        Ok(GameInfo {
            game_version: GameVersion { product, version },
            host_counter,
            entry_key,
            name,
            stat_string,
            slots_total,
            flags,
            slots_used,
            slots_available,
            uptime_sec,
            game_port,
        })
    }

    /// Decode the stat string into map and host details.
    pub fn map_info(&self) -> Result<stat_string::MapInfo> {
        stat_string::MapInfo::parse(&stat_string::decode(&self.stat_string))
    }
}

/// The first packet a joining client sends over TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub host_counter: u32,
    pub entry_key: u32,
    pub listen_port: u16,
    pub join_counter: u32,
    pub player_name: String,
}

impl Join {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 32 + self.player_name.len());
        put_header(&mut buf, id::JOIN);
        buf.put_u32_le(self.host_counter);
        buf.put_u32_le(self.entry_key);
        buf.put_u8(0);
        buf.put_u16_le(self.listen_port);
        buf.put_u32_le(self.join_counter);
        put_cstring(&mut buf, &self.player_name);
        // Internal socket address: family, port, ip, zero padding.
        buf.put_slice(&[0u8; 16]);
        finish(&mut buf);
        buf
    }

    fn decode(mut body: &[u8]) -> Result<Join> {
        let host_counter = get_u32(&mut body)?;
        let entry_key = get_u32(&mut body)?;
        let _unknown = get_u8(&mut body)?;
        let listen_port = get_u16(&mut body)?;
        let join_counter = get_u32(&mut body)?;
        let player_name = get_cstring(&mut body)?;
        // Internal address trailer is opaque to the bridge.

        Ok(Join {
            host_counter,
            entry_key,
            listen_port,
            join_counter,
            player_name,
        })
    }
}

/// Build a `RefreshGame` broadcast updating player counts.
pub fn refresh_game(host_counter: u32, slots_used: u32, slots_available: u32) -> [u8; 16] {
    let mut packet = [0u8; 16];
    packet[0] = SIGNATURE;
    packet[1] = id::REFRESH_GAME;
    packet[2] = 16;
    packet[4..8].copy_from_slice(&host_counter.to_le_bytes());
    packet[8..12].copy_from_slice(&slots_used.to_le_bytes());
    packet[12..16].copy_from_slice(&slots_available.to_le_bytes());
    packet
}

/// Build a `DecreateGame` broadcast cancelling an announced game.
pub fn decreate_game(host_counter: u32) -> [u8; 8] {
    let mut packet = [0u8; 8];
    packet[0] = SIGNATURE;
    packet[1] = id::DECREATE_GAME;
    packet[2] = 8;
    packet[4..8].copy_from_slice(&host_counter.to_le_bytes());
    packet
}

/// A decoded W3GS packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SearchGame(SearchGame),
    GameInfo(GameInfo),
    Join(Join),
}

impl Packet {
    pub fn id(&self) -> u8 {
        match self {
            Packet::SearchGame(_) => id::SEARCH_GAME,
            Packet::GameInfo(_) => id::GAME_INFO,
            Packet::Join(_) => id::JOIN,
        }
    }
}

/// Validate the header of a buffer and return `(packet id, packet length)`.
///
/// The buffer may carry trailing bytes beyond the packet; the declared
/// length must fit inside it.
pub fn peek_header(data: &[u8]) -> Result<(u8, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::Truncated {
            need: HEADER_LEN,
            have: data.len(),
        });
    }

    if data[0] != SIGNATURE {
        return Err(Error::Protocol(format!("bad signature 0x{:02X}", data[0])));
    }

    let len = u16::from_le_bytes([data[2], data[3]]) as usize;
    if len < HEADER_LEN {
        return Err(Error::Protocol(format!("declared length {} too short", len)));
    }

    if len > data.len() {
        return Err(Error::Truncated {
            need: len,
            have: data.len(),
        });
    }

    Ok((data[1], len))
}

/// Decode the first packet in a buffer.
pub fn decode(data: &[u8]) -> Result<Packet> {
    let (packet_id, len) = peek_header(data)?;
    let body = &data[HEADER_LEN..len];

    match packet_id {
        id::SEARCH_GAME => Ok(Packet::SearchGame(SearchGame::decode(body)?)),
        id::GAME_INFO => Ok(Packet::GameInfo(GameInfo::decode(body)?)),
        id::JOIN => Ok(Packet::Join(Join::decode(body)?)),
        other => Err(Error::Protocol(format!("unsupported packet 0x{:02X}", other))),
    }
}

fn put_header(buf: &mut Vec<u8>, packet_id: u8) {
    buf.put_u8(SIGNATURE);
    buf.put_u8(packet_id);
    buf.put_u16_le(0); // patched by finish()
}

fn finish(buf: &mut [u8]) {
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_le_bytes());
}

fn put_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16_le())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn take(buf: &mut &[u8], out: &mut [u8]) -> Result<()> {
    ensure(buf, out.len())?;
    buf.copy_to_slice(out);
    Ok(())
}

fn get_cstring_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Protocol("unterminated string".into()))?;
    let bytes = buf[..pos].to_vec();
    buf.advance(pos + 1);
    Ok(bytes)
}

fn get_cstring(buf: &mut &[u8]) -> Result<String> {
    let bytes = get_cstring_bytes(buf)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn ensure(buf: &[u8], need: usize) -> Result<()> {
    if buf.remaining() < need {
        return Err(Error::Truncated {
            need,
            have: buf.remaining(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game_info() -> GameInfo {
        GameInfo {
            game_version: GameVersion {
                product: Product::TFT,
                version: 26,
            },
            host_counter: 7,
            entry_key: 0,
            name: "g1".to_string(),
            stat_string: stat_string::encode(&stat_string::MapInfo {
                settings_flags: 0x4000,
                map_width: 116,
                map_height: 116,
                map_crc: 0xDEADBEEF,
                map_path: "Maps\\(8)Sanctuary.w3x".to_string(),
                host_name: "arthas".to_string(),
            }
            .to_bytes()),
            slots_total: 8,
            flags: 0x09,
            slots_used: 1,
            slots_available: 8,
            uptime_sec: 42,
            game_port: 6112,
        }
    }

    #[test]
    fn test_search_game_wire_layout() {
        let pkt = SearchGame {
            game_version: GameVersion {
                product: Product::TFT,
                version: 26,
            },
            host_counter: 0,
        };

        let bytes = pkt.encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &[0xF7, 0x2F, 0x10, 0x00]);
        // Product codes appear reversed on the wire.
        assert_eq!(&bytes[4..8], b"PX3W");
        assert_eq!(&bytes[8..12], &26u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
    }

    #[test]
    fn test_search_game_round_trip() {
        let pkt = SearchGame {
            game_version: GameVersion {
                product: Product::ROC,
                version: 28,
            },
            host_counter: 1,
        };

        match decode(&pkt.encode()).unwrap() {
            Packet::SearchGame(decoded) => assert_eq!(decoded, pkt),
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_game_info_round_trip() {
        let info = sample_game_info();
        let bytes = info.encode();

        // The announcement must end with the game port.
        assert_eq!(&bytes[bytes.len() - 2..], &6112u16.to_le_bytes());

        match decode(&bytes).unwrap() {
            Packet::GameInfo(decoded) => {
                assert_eq!(decoded, info);
                let map = decoded.map_info().unwrap();
                assert_eq!(map.map_path, "Maps\\(8)Sanctuary.w3x");
                assert_eq!(map.host_name, "arthas");
            }
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_join_round_trip() {
        let join = Join {
            host_counter: 7,
            entry_key: 0,
            listen_port: 6112,
            join_counter: 2,
            player_name: "uther".to_string(),
        };

        match decode(&join.encode()).unwrap() {
            Packet::Join(decoded) => {
                assert_eq!(decoded.host_counter, 7);
                assert_eq!(decoded.player_name, "uther");
            }
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_refresh_game_layout() {
        let pkt = refresh_game(7, 2, 6);
        assert_eq!(&pkt[..4], &[0xF7, 0x32, 0x10, 0x00]);
        assert_eq!(&pkt[4..8], &7u32.to_le_bytes());
        assert_eq!(&pkt[8..12], &2u32.to_le_bytes());
        assert_eq!(&pkt[12..16], &6u32.to_le_bytes());
    }

    #[test]
    fn test_decreate_game_layout() {
        let pkt = decreate_game(0x0102_0304);
        assert_eq!(&pkt[..4], &[0xF7, 0x33, 0x08, 0x00]);
        assert_eq!(&pkt[4..8], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_rejects_bad_signature() {
        assert!(decode(&[0x00, 0x2F, 0x04, 0x00]).is_err());
    }

    #[test]
    fn test_rejects_short_buffer() {
        assert!(decode(&[0xF7, 0x30, 0x10]).is_err());
    }

    #[test]
    fn test_rejects_truncated_packet() {
        let mut bytes = sample_game_info().encode();
        bytes.truncate(bytes.len() - 3);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_unsupported_id() {
        // A well-formed header with a packet id the bridge does not speak.
        assert!(decode(&[0xF7, 0x01, 0x04, 0x00]).is_err());
    }

    #[test]
    fn test_header_with_trailing_bytes() {
        let mut bytes = SearchGame {
            game_version: GameVersion::default(),
            host_counter: 0,
        }
        .encode();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (packet_id, len) = peek_header(&bytes).unwrap();
        assert_eq!(packet_id, id::SEARCH_GAME);
        assert_eq!(len, 16);
    }

    #[test]
    fn test_product_parse() {
        assert_eq!(Product::parse("W3XP").unwrap(), Product::TFT);
        assert_eq!(Product::parse("TFT").unwrap(), Product::TFT);
        assert_eq!(Product::parse("WAR3").unwrap(), Product::ROC);
        assert!(Product::parse("w3xp").is_err());
    }
}
