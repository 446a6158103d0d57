//! # PacketCodec: fragmentation and reassembly
//!
//! Turns a [`Message`] into an ordered sequence of on-wire [`Packet`]s
//! (PacketWriter's job, via [`fragment`]) and the reverse — accumulating
//! packets per tag into a Message, enforcing the sequence/SOM/EOM/owner
//! discipline (PacketReader's job, via [`Reassembler::accept`]).

use crate::message::{Message, MAX_MESSAGE_PAYLOAD};
use crate::packet::{Packet, PacketHeader, BTU_LEN, MCTP_VERSION};
use crate::pool::ObjectPool;
use crate::tagtable::TagTable;
use std::time::Instant;

/// Number of packets a message of `len` bytes and type `msg_type` fragments
/// into. MCTP Control messages are always one packet; every other type is
/// `ceil(len / BTU_LEN)` (`mctp_pkt_count` in the original source).
pub fn packet_count(msg_type: u8, len: usize) -> usize {
    if msg_type == crate::MSG_TYPE_CONTROL {
        1
    } else {
        let whole = len / BTU_LEN;
        if len % BTU_LEN > 0 {
            whole + 1
        } else {
            whole
        }
    }
}

/// Fragment `msg` into wire packets, assigning `seq` starting from
/// `*next_seq` (mod 4) and leaving `*next_seq` pointing past the last
/// packet emitted — the PacketWriter's single running sequence counter.
pub fn fragment(msg: &Message, next_seq: &mut u8) -> Vec<Packet> {
    let num_pkts = packet_count(msg.msg_type, msg.len).max(1);
    let mut out = Vec::with_capacity(num_pkts);

    for i in 0..num_pkts {
        let seq = *next_seq;
        *next_seq = (*next_seq + 1) % 4;

        let mut payload = [0u8; BTU_LEN];
        if i == 0 {
            payload[0] = msg.msg_type;
            let start = 0;
            let end = (start + BTU_LEN - 1).min(MAX_MESSAGE_PAYLOAD);
            let n = end - start;
            payload[1..1 + n].copy_from_slice(&msg.payload[start..end]);
        } else {
            let start = (i * BTU_LEN - 1).min(MAX_MESSAGE_PAYLOAD);
            let end = (start + BTU_LEN).min(MAX_MESSAGE_PAYLOAD);
            let n = end - start;
            payload[..n].copy_from_slice(&msg.payload[start..end]);
        }

        out.push(Packet {
            header: PacketHeader {
                ver: MCTP_VERSION,
                dest: msg.dst,
                src: msg.src,
                tag: msg.tag,
                owner: msg.owner,
                seq,
                eom: i == num_pkts - 1,
                som: i == 0,
            },
            payload,
        });
    }
    out
}

/// Drop counters maintained by a [`Reassembler`], one per rejection reason
/// in Design §4.4.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReassemblyCounters {
    pub dropped_version: u64,
    pub dropped_seqnum: u64,
    pub dropped_noeom: u64,
    pub dropped_nosom: u64,
    pub dropped_wrongto: u64,
    /// Packets that would have grown a partial message past
    /// `MAX_MESSAGE_PAYLOAD`; not named as a separate counter in the
    /// original, added here since the overflow case itself is explicit
    /// (Design §4.4 edge cases) and needs somewhere to be recorded.
    pub dropped_overflow: u64,
}

/// Per-connection reassembly state: one scalar `expected_seq` shared across
/// all tags (not per-tag — confirmed against the original's
/// `struct packet_reader.pkt_seq`), plus the per-tag partial-message table.
pub struct Reassembler {
    expected_seq: u8,
    partial: TagTable<Box<Message>>,
    pub counters: ReassemblyCounters,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            expected_seq: 0,
            partial: TagTable::new(),
            counters: ReassemblyCounters::default(),
        }
    }

    /// Feed one received packet through the reassembler. Returns a
    /// completed Message when this packet carries EOM, `None` otherwise
    /// (including every drop path). The caller owns the packet's wrapper
    /// independently of this call and is responsible for returning it to
    /// the packet pool regardless of outcome.
    pub fn accept(
        &mut self,
        pkt: &Packet,
        received_at: Instant,
        msg_pool: &ObjectPool<Box<Message>>,
    ) -> Option<Box<Message>> {
        let result = self.accept_inner(pkt, received_at, msg_pool);
        self.expected_seq = (self.expected_seq + 1) % 4;
        result
    }

    fn accept_inner(
        &mut self,
        pkt: &Packet,
        received_at: Instant,
        msg_pool: &ObjectPool<Box<Message>>,
    ) -> Option<Box<Message>> {
        let hdr = pkt.header;

        if hdr.ver != MCTP_VERSION {
            self.counters.dropped_version += 1;
            return None;
        }

        let tag = hdr.tag;

        if self.expected_seq != hdr.seq {
            if let Some(partial) = self.partial.take(tag) {
                msg_pool.release(partial);
            }
            self.counters.dropped_seqnum += 1;
            if !hdr.som {
                return None;
            }
            self.expected_seq = hdr.seq;
        }

        if hdr.som && self.partial.is_occupied(tag) {
            if let Some(partial) = self.partial.take(tag) {
                msg_pool.release(partial);
            }
            self.counters.dropped_noeom += 1;
        }

        if let Some(partial) = self.partial.get(tag) {
            if partial.owner != hdr.owner {
                if let Some(p) = self.partial.take(tag) {
                    msg_pool.release(p);
                }
                self.counters.dropped_wrongto += 1;
            }
        }

        if !hdr.som && !self.partial.is_occupied(tag) {
            self.counters.dropped_nosom += 1;
            return None;
        }

        if hdr.som {
            let mut msg = msg_pool.try_acquire_sync()?;
            msg.reset();
            msg.dst = hdr.dest;
            msg.src = hdr.src;
            msg.owner = hdr.owner;
            msg.tag = hdr.tag;
            msg.msg_type = pkt.payload[0];
            msg.ts = received_at;
            msg.len = BTU_LEN - 1;
            msg.payload[..BTU_LEN - 1].copy_from_slice(&pkt.payload[1..]);
            self.partial.install(tag, msg);
        } else {
            let overflow = {
                let partial = self.partial.get(tag).expect("checked occupied above");
                partial.len + BTU_LEN > MAX_MESSAGE_PAYLOAD
            };
            if overflow {
                if let Some(partial) = self.partial.take(tag) {
                    msg_pool.release(partial);
                }
                self.counters.dropped_overflow += 1;
                return None;
            }
            let partial = self.partial.get(tag).expect("checked occupied above");
            let start = partial.len;
            let mut msg = self.partial.take(tag).expect("checked occupied above");
            msg.payload[start..start + BTU_LEN].copy_from_slice(&pkt.payload);
            msg.len += BTU_LEN;
            self.partial.install(tag, msg);
        }

        if hdr.eom {
            self.partial.take(tag)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn fresh_pool() -> ObjectPool<Box<Message>> {
        ObjectPool::new(4, || Box::new(Message::empty()))
    }

    fn make_message(msg_type: u8, len: usize, fill: u8) -> Message {
        let mut m = Message::empty();
        m.msg_type = msg_type;
        m.src = 0x10;
        m.dst = 0x20;
        m.owner = true;
        m.tag = 3;
        m.len = len;
        for b in m.payload[..len].iter_mut() {
            *b = fill;
        }
        m
    }

    #[test]
    fn packet_count_matches_formula() {
        assert_eq!(packet_count(crate::MSG_TYPE_CONTROL, 1000), 1);
        assert_eq!(packet_count(crate::MSG_TYPE_CXL_FM_API, 1), 1);
        assert_eq!(packet_count(crate::MSG_TYPE_CXL_FM_API, 64), 1);
        assert_eq!(packet_count(crate::MSG_TYPE_CXL_FM_API, 65), 2);
        assert_eq!(packet_count(crate::MSG_TYPE_CXL_FM_API, 130), 3);
    }

    #[tokio::test]
    async fn s4_130_byte_message_fragments_into_three_packets_and_reassembles() {
        let msg = make_message(crate::MSG_TYPE_CXL_FM_API, 130, 0xAB);
        let mut seq = 1u8;
        let packets = fragment(&msg, &mut seq);
        assert_eq!(packets.len(), 3);
        assert!(packets[0].header.som && !packets[0].header.eom);
        assert!(!packets[1].header.som && !packets[1].header.eom);
        assert!(!packets[2].header.som && packets[2].header.eom);
        assert_eq!(packets[0].header.seq, 1);
        assert_eq!(packets[1].header.seq, 2);
        assert_eq!(packets[2].header.seq, 3);

        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        reassembler.expected_seq = 1;
        let mut reassembled = None;
        for p in &packets {
            reassembled = reassembler.accept(p, Instant::now(), &pool);
        }
        let reassembled = reassembled.expect("eom packet yields a completed message");
        assert_eq!(reassembled.msg_type, crate::MSG_TYPE_CXL_FM_API);
        assert_eq!(&reassembled.payload[..130], &msg.payload[..130]);
    }

    #[tokio::test]
    async fn single_packet_message_round_trips() {
        let msg = make_message(crate::MSG_TYPE_CONTROL, 10, 0x42);
        let mut seq = 0u8;
        let packets = fragment(&msg, &mut seq);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].header.som && packets[0].header.eom);

        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        let reassembled = reassembler.accept(&packets[0], Instant::now(), &pool).unwrap();
        assert_eq!(reassembled.msg_type, crate::MSG_TYPE_CONTROL);
        assert_eq!(&reassembled.payload[..10], &msg.payload[..10]);
    }

    #[tokio::test]
    async fn dropped_version_counts_and_does_not_complete() {
        let msg = make_message(crate::MSG_TYPE_CXL_FM_API, 5, 0x01);
        let mut seq = 0u8;
        let mut packets = fragment(&msg, &mut seq);
        packets[0].header.ver = 2;

        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        let result = reassembler.accept(&packets[0], Instant::now(), &pool);
        assert!(result.is_none());
        assert_eq!(reassembler.counters.dropped_version, 1);
    }

    #[tokio::test]
    async fn seqnum_gap_without_som_is_dropped() {
        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        let mut pkt = Packet {
            header: PacketHeader {
                ver: MCTP_VERSION,
                dest: 1,
                src: 2,
                tag: 0,
                owner: true,
                seq: 2,
                eom: false,
                som: false,
            },
            payload: [0u8; BTU_LEN],
        };
        let result = reassembler.accept(&pkt, Instant::now(), &pool);
        assert!(result.is_none());
        assert_eq!(reassembler.counters.dropped_seqnum, 1);

        pkt.header.som = true;
        pkt.header.seq = 0;
        reassembler.expected_seq = 1;
        let result = reassembler.accept(&pkt, Instant::now(), &pool);
        assert!(result.is_none());
        assert_eq!(reassembler.counters.dropped_seqnum, 2);
    }

    #[tokio::test]
    async fn new_som_with_partial_outstanding_counts_noeom() {
        let msg = make_message(crate::MSG_TYPE_CXL_FM_API, 130, 0x7);
        let mut seq = 0u8;
        let packets = fragment(&msg, &mut seq);

        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        reassembler.accept(&packets[0], Instant::now(), &pool);
        assert_eq!(reassembler.counters.dropped_noeom, 0);

        // A fresh SOM on the same tag before EOM arrived.
        let mut fresh_seq = 0u8;
        let fresh = make_message(crate::MSG_TYPE_CXL_FM_API, 10, 0x9);
        let fresh_packets = fragment(&fresh, &mut fresh_seq);
        reassembler.expected_seq = 1;
        let result = reassembler.accept(&fresh_packets[0], Instant::now(), &pool);
        assert!(result.is_none());
        assert_eq!(reassembler.counters.dropped_noeom, 1);
    }

    #[tokio::test]
    async fn continuation_with_no_som_is_dropped() {
        let pool = fresh_pool();
        let mut reassembler = Reassembler::new();
        let pkt = Packet {
            header: PacketHeader {
                ver: MCTP_VERSION,
                dest: 1,
                src: 2,
                tag: 4,
                owner: true,
                seq: 0,
                eom: false,
                som: false,
            },
            payload: [0u8; BTU_LEN],
        };
        let result = reassembler.accept(&pkt, Instant::now(), &pool);
        assert!(result.is_none());
        assert_eq!(reassembler.counters.dropped_nosom, 1);
    }
}
