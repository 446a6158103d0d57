//! # Packet wire format
//!
//! DSP0236 v1.3.1 Table 1: a 4-byte MCTP transport header followed by a
//! 64-byte baseline transmission unit (BTU). 68 bytes on the wire, always.

use std::time::Instant;

/// Length in bytes of the MCTP transport header.
pub const HDR_LEN: usize = 4;
/// Length in bytes of the baseline transmission unit.
pub const BTU_LEN: usize = 64;
/// Length in bytes of a full packet on the wire.
pub const PKT_LEN: usize = HDR_LEN + BTU_LEN;
/// MCTP header version this transport speaks; packets with any other
/// version are dropped by the reassembler.
pub const MCTP_VERSION: u8 = 1;

/// The 4-byte MCTP transport header, unpacked into its bitfields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub ver: u8,
    pub dest: u8,
    pub src: u8,
    pub tag: u8,
    pub owner: bool,
    pub seq: u8,
    pub eom: bool,
    pub som: bool,
}

impl PacketHeader {
    pub fn to_bytes(self) -> [u8; HDR_LEN] {
        let byte0 = (self.ver & 0x0F) << 4;
        let byte3 = ((self.tag & 0x07) << 5)
            | ((self.owner as u8) << 4)
            | ((self.seq & 0x03) << 2)
            | ((self.eom as u8) << 1)
            | (self.som as u8);
        [byte0, self.dest, self.src, byte3]
    }

    pub fn from_bytes(bytes: [u8; HDR_LEN]) -> Self {
        let byte0 = bytes[0];
        let byte3 = bytes[3];
        Self {
            ver: (byte0 >> 4) & 0x0F,
            dest: bytes[1],
            src: bytes[2],
            tag: (byte3 >> 5) & 0x07,
            owner: (byte3 >> 4) & 0x01 != 0,
            seq: (byte3 >> 2) & 0x03,
            eom: (byte3 >> 1) & 0x01 != 0,
            som: byte3 & 0x01 != 0,
        }
    }
}

/// A complete on-wire packet: header plus BTU payload.
#[derive(Debug, Clone, Copy)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: [u8; BTU_LEN],
}

impl Packet {
    pub fn to_bytes(&self) -> [u8; PKT_LEN] {
        let mut out = [0u8; PKT_LEN];
        out[..HDR_LEN].copy_from_slice(&self.header.to_bytes());
        out[HDR_LEN..].copy_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(bytes: [u8; PKT_LEN]) -> Self {
        let mut hdr = [0u8; HDR_LEN];
        hdr.copy_from_slice(&bytes[..HDR_LEN]);
        let mut payload = [0u8; BTU_LEN];
        payload.copy_from_slice(&bytes[HDR_LEN..]);
        Self {
            header: PacketHeader::from_bytes(hdr),
            payload,
        }
    }
}

/// A packet plus the metadata needed while it sits in the pipeline: when it
/// was received, for workers that care about staleness.
///
/// The original C source chains these with an embedded `next` pointer to
/// build the outbound packet list for an action. Here that chain is instead
/// an owned `Vec<PacketWrapper>` held directly by the [`crate::action::Action`]
/// (see Design Notes): a `PacketWrapper` itself carries no link.
#[derive(Debug, Clone, Copy)]
pub struct PacketWrapper {
    pub packet: Packet,
    pub received_at: Instant,
}

impl PacketWrapper {
    pub fn empty() -> Self {
        Self {
            packet: Packet {
                header: PacketHeader {
                    ver: MCTP_VERSION,
                    dest: 0,
                    src: 0,
                    tag: 0,
                    owner: false,
                    seq: 0,
                    eom: false,
                    som: false,
                },
                payload: [0u8; BTU_LEN],
            },
            received_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let hdr = PacketHeader {
            ver: 1,
            dest: 0x0A,
            src: 0x0B,
            tag: 5,
            owner: true,
            seq: 2,
            eom: true,
            som: false,
        };
        let bytes = hdr.to_bytes();
        let back = PacketHeader::from_bytes(bytes);
        assert_eq!(hdr, back);
    }

    #[test]
    fn packet_is_exactly_68_bytes() {
        let pkt = Packet {
            header: PacketHeader {
                ver: 1,
                dest: 1,
                src: 2,
                tag: 0,
                owner: false,
                seq: 0,
                eom: false,
                som: false,
            },
            payload: [0xAB; BTU_LEN],
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), PKT_LEN);
        assert_eq!(PKT_LEN, 68);
        let back = Packet::from_bytes(bytes);
        assert_eq!(back.payload, pkt.payload);
    }

    #[test]
    fn all_header_bit_combinations_survive_round_trip() {
        for tag in 0..8u8 {
            for seq in 0..4u8 {
                for &owner in &[true, false] {
                    for &eom in &[true, false] {
                        for &som in &[true, false] {
                            let hdr = PacketHeader {
                                ver: 1,
                                dest: 0xAA,
                                src: 0x55,
                                tag,
                                owner,
                                seq,
                                eom,
                                som,
                            };
                            assert_eq!(hdr, PacketHeader::from_bytes(hdr.to_bytes()));
                        }
                    }
                }
            }
        }
    }
}
