//! Rolling-buffer frame parser.
//!
//! [`ParseBuffer`] accumulates raw transport bytes and drains them into
//! decoded [`Event`]s. It owns the pending-ack queue: while a host command
//! is awaiting its acknowledgement, the ack is resolved before any event
//! frame behind it, which is the ordering the request engine depends on.
//!
//! Invariant after every [`ParseBuffer::push`]: the buffer is empty, starts
//! with a partial frame, or starts with a partial command echo.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};

use super::constants::{NAK, START};
use super::event::{decode_frame, frame_length, Ack, Event};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// A host command awaiting its echoed acknowledgement.
#[derive(Debug)]
struct PendingAck {
    /// The exact bytes written to the modem.
    cmd: Vec<u8>,
    /// Total length of the echoed command plus the trailing ack byte.
    expected_len: usize,
}

/// Accumulates inbound bytes and extracts acknowledgements and event frames.
#[derive(Debug, Default)]
pub(crate) struct ParseBuffer {
    buf: BytesMut,
    pending: VecDeque<PendingAck>,
}

impl ParseBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending: VecDeque::new(),
        }
    }

    /// Register an outbound command before it is written: the next `cmd`
    /// echo seen in the stream, padded to `expected_len` bytes, resolves it.
    pub fn expect_ack(&mut self, cmd: Vec<u8>, expected_len: usize) {
        self.pending.push_back(PendingAck { cmd, expected_len });
    }

    /// Drop the oldest pending entry for `cmd`, if any.
    ///
    /// Called when a waiter gives up so a late acknowledgement cannot be
    /// matched against a subsequent unrelated command.
    pub fn cancel_ack(&mut self, cmd: &[u8]) {
        if let Some(idx) = self.pending.iter().position(|p| p.cmd == cmd) {
            self.pending.remove(idx);
        }
    }

    /// Append raw bytes and drain every acknowledgement and complete frame
    /// now available, in wire order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(data);

        let mut events = Vec::new();
        loop {
            // Acks first: while a command is in flight its echo blocks the
            // event scan, so the waiting requestor always sees its ack
            // before any frame the modem produced after it.
            if !self.pending.is_empty() {
                match self.try_take_ack() {
                    Some(ack) => {
                        events.push(Event::Ack(ack));
                        continue;
                    }
                    None => break,
                }
            }

            match self.try_take_event() {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    /// Resolve the oldest pending ack if its echo (or a bare NAK) is fully
    /// buffered.
    fn try_take_ack(&mut self) -> Option<Ack> {
        // NAKs don't always echo the command: a buffer leading with a bare
        // NAK resolves the oldest pending command immediately.
        if self.buf.first() == Some(&NAK) {
            self.pending.pop_front();
            self.buf.advance(1);
            return Some(Ack::bare_nak());
        }

        let expected = self.pending.front()?;
        let idx = find_subslice(&self.buf, &expected.cmd)?;
        if idx + expected.expected_len > self.buf.len() {
            return None;
        }

        let expected = self.pending.pop_front().expect("front checked above");
        let mut prefix = self.buf.split_to(idx);
        let frame = self.buf.split_to(expected.expected_len).freeze();
        if !prefix.is_empty() {
            // Bytes ahead of the echo may hold an unsolicited frame that
            // arrived between the write and the ack. Keep them for the
            // event scan instead of discarding them with the echo.
            let rest = std::mem::take(&mut self.buf);
            prefix.unsplit(rest);
            self.buf = prefix;
        }
        Some(Ack::from_bytes(frame))
    }

    /// Extract the next complete event frame, resynchronizing past noise.
    fn try_take_event(&mut self) -> Option<Event> {
        loop {
            let Some(idx) = self.buf.iter().position(|&b| b == START) else {
                // No start byte anywhere: everything buffered is noise.
                self.buf.clear();
                return None;
            };
            if idx > 0 {
                self.buf.advance(idx);
            }
            if self.buf.len() < 2 {
                return None;
            }

            let opcode = self.buf[1];
            let Some(len) = frame_length(opcode) else {
                // Not a frame start. Drop the start byte, and the offending
                // byte with it unless that byte could itself open a frame.
                let skip = if opcode == START { 1 } else { 2 };
                self.buf.advance(skip);
                continue;
            };
            if self.buf.len() < len {
                return None;
            }

            let frame = self.buf.split_to(len);
            return Some(decode_frame(opcode, &frame));
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> &[u8] {
        &self.buf
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::event::AllLinkRecord;
    use crate::protocol::Address;

    #[test]
    fn partial_frame_leaves_parser_idle() {
        let mut parser = ParseBuffer::new();
        let events = parser.push(&[0x02, 0x50, 0x01, 0x02]);
        assert!(events.is_empty());
        assert_eq!(parser.buffered(), &[0x02, 0x50, 0x01, 0x02]);
    }

    #[test]
    fn complete_frame_decodes_and_drains() {
        let mut parser = ParseBuffer::new();
        let events = parser.push(&[
            0x02, 0x50, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C, 0x2B, 0x19, 0xFF,
        ]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::StdResponse(_)));
        assert!(parser.buffered().is_empty());
    }

    #[test]
    fn frame_split_across_pushes() {
        let mut parser = ParseBuffer::new();
        assert!(parser.push(&[0x02, 0x54]).is_empty());
        let events = parser.push(&[0x03]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ButtonEvent(_)));
    }

    #[test]
    fn resynchronizes_past_noise() {
        let mut parser = ParseBuffer::new();
        // Noise, a false start (0x02 followed by a non-opcode), then a
        // valid button event.
        let events = parser.push(&[0xDE, 0xAD, 0x02, 0x99, 0x02, 0x54, 0x03]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ButtonEvent(_)));
        assert!(parser.buffered().is_empty());
    }

    #[test]
    fn resync_keeps_start_byte_following_false_start() {
        let mut parser = ParseBuffer::new();
        // 0x02 0x02 0x54: the second start byte opens the real frame.
        let events = parser.push(&[0x02, 0x02, 0x54, 0x03]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ButtonEvent(_)));
    }

    #[test]
    fn pure_noise_is_discarded() {
        let mut parser = ParseBuffer::new();
        assert!(parser.push(&[0xDE, 0xAD, 0xBE, 0xEF]).is_empty());
        assert!(parser.buffered().is_empty());
    }

    #[test]
    fn ack_matches_echoed_command() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x77], 3);

        let events = parser.push(&[0x02, 0x77, 0x06]);
        assert_eq!(events.len(), 1);
        let Event::Ack(ack) = &events[0] else {
            panic!("expected ack");
        };
        assert!(ack.is_ack());
        assert_eq!(ack.response.as_ref(), &[0x02, 0x77, 0x06]);
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn ack_waits_for_terminator_byte() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x77], 3);

        assert!(parser.push(&[0x02, 0x77]).is_empty());
        assert_eq!(parser.pending_len(), 1);

        let events = parser.push(&[0x06]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn bare_nak_resolves_pending_without_consuming_rest() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x73], 6);

        let events = parser.push(&[0x15, 0x02, 0x54, 0x03]);
        assert_eq!(events.len(), 2);
        let Event::Ack(ack) = &events[0] else {
            panic!("expected ack first");
        };
        assert!(!ack.is_ack());
        assert_eq!(ack.response.as_ref(), &[0x15]);
        assert!(matches!(events[1], Event::ButtonEvent(_)));
    }

    #[test]
    fn ack_without_pending_request_is_resynced_not_panicked() {
        let mut parser = ParseBuffer::new();
        // 0x60 is a host opcode, not an IM opcode: the echo of an
        // unexpected ack is treated as noise.
        let events = parser.push(&[0x02, 0x60, 0x06]);
        assert!(events.is_empty());
    }

    #[test]
    fn ack_then_trailing_event_in_one_push() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x69], 3);

        let events = parser.push(&[
            0x02, 0x69, 0x06, // ack
            0x02, 0x57, 0xC0, 0x00, 0x01, 0x02, 0x03, 0x02, 0x08, 0x42, // record
        ]);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Ack(_)));
        let Event::AllLinkRecord(record) = &events[1] else {
            panic!("expected record");
        };
        assert_eq!(
            *record,
            AllLinkRecord {
                flags: crate::protocol::AllLinkRecordFlags(0xC0),
                group: 0,
                address: Address::new(0x01, 0x02, 0x03),
                data: [0x02, 0x08, 0x42],
            }
        );
    }

    #[test]
    fn event_scan_deferred_while_ack_pending() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x62, 0x01, 0x02, 0x03, 0x0F, 0x19, 0x00], 9);

        // A full event frame is buffered, but the echo has not arrived yet:
        // nothing is delivered until the ack resolves.
        let events = parser.push(&[0x02, 0x54, 0x03]);
        assert!(events.is_empty());

        let mut wire = vec![0x02, 0x62, 0x01, 0x02, 0x03, 0x0F, 0x19, 0x00, 0x06];
        wire.extend_from_slice(&[0x02, 0x50, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C, 0x2B, 0x19, 0xFF]);
        let events = parser.push(&wire);

        // The ack comes out first, then the deferred button event, then the
        // response that followed the echo.
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::Ack(_)));
        assert!(matches!(events[1], Event::ButtonEvent(_)));
        assert!(matches!(events[2], Event::StdResponse(_)));
    }

    #[test]
    fn cancel_ack_removes_stale_entry() {
        let mut parser = ParseBuffer::new();
        parser.expect_ack(vec![0x02, 0x77], 3);
        parser.cancel_ack(&[0x02, 0x77]);
        assert_eq!(parser.pending_len(), 0);

        // The late echo is now treated as noise instead of resolving a
        // request that no longer exists.
        assert!(parser.push(&[0x02, 0x77, 0x06]).is_empty());
    }

    #[test]
    fn find_subslice_basics() {
        assert_eq!(find_subslice(b"abcdef", b"cde"), Some(2));
        assert_eq!(find_subslice(b"abcdef", b"xyz"), None);
        assert_eq!(find_subslice(b"ab", b"abc"), None);
    }
}
