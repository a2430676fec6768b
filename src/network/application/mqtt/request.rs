//! Bounded pool of in-flight requests keyed by packet identifier.

use super::error::Error;
use super::packet::QoS;
use heapless::Vec;

/// What an in-flight request is waiting for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    /// SUBSCRIBE awaiting SUBACK.
    Subscribe,
    /// UNSUBSCRIBE awaiting UNSUBACK.
    Unsubscribe,
    /// PUBLISH awaiting PUBACK (QoS 1) or PUBREC/PUBCOMP (QoS 2).
    Publish(QoS),
}

/// Transmission progress of a request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Frame is (partly) still in the TX buffer.
    Pending,
    /// Frame fully handed to the transport; the ack timer is running.
    AwaitingAck,
}

/// How many times a request has been put on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetryState {
    /// Never fully sent.
    Unsent,
    /// Sent once.
    Sent,
    /// Retransmitted this many times.
    Retried(u8),
}

/// One slot of the request table.
///
/// `F` bounds the stored frame, which is kept so the request can be
/// retransmitted after a timeout.
#[derive(Debug)]
pub struct Request<const F: usize> {
    /// Acknowledgement the request waits for.
    pub kind: RequestKind,
    /// Identifier unique among allocated requests.
    pub packet_id: u16,
    /// Caller's argument, handed back in the completion event.
    pub arg: usize,
    /// Transmission progress.
    pub status: Status,
    /// Retransmission count.
    pub retry: RetryState,
    /// Bytes of the TX buffer, up to and including this frame, that the
    /// transport has not accepted yet.
    pub expected_sent_len: usize,
    /// Time the frame left the TX buffer completely.
    pub timeout_start: u32,
    /// QoS 2 only: PUBREC seen, the stored frame is now the PUBREL.
    pub released: bool,
    frame: Vec<u8, F>,
}

impl<const F: usize> Request<F> {
    fn new(kind: RequestKind, packet_id: u16, arg: usize) -> Self {
        Self {
            kind,
            packet_id,
            arg,
            status: Status::Pending,
            retry: RetryState::Unsent,
            expected_sent_len: 0,
            timeout_start: 0,
            released: false,
            frame: Vec::new(),
        }
    }

    /// Encoded frame as last queued.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Mutable access to the stored frame buffer.
    pub fn frame_mut(&mut self) -> &mut Vec<u8, F> {
        &mut self.frame
    }

    /// Record that the frame was pushed into a TX buffer now holding
    /// `tx_len` bytes.
    pub fn queued(&mut self, tx_len: usize) {
        self.status = Status::Pending;
        self.expected_sent_len = tx_len;
    }

    /// Mark the frame as waiting for room in the TX buffer.
    pub fn defer(&mut self) {
        self.status = Status::Pending;
        self.expected_sent_len = 0;
    }

    /// Returns `true` if the frame still has to be pushed into TX.
    pub fn is_deferred(&self) -> bool {
        self.status == Status::Pending && self.expected_sent_len == 0
    }
}

/// Next packet identifier after `prev` that `in_use` does not claim.
///
/// Identifiers run 1..=65535 and wrap, skipping 0. Returns `None` only when
/// every identifier is taken.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::next_packet_id;
///
/// assert_eq!(next_packet_id(1, |_| false), Some(2));
/// assert_eq!(next_packet_id(u16::MAX, |_| false), Some(1));
/// assert_eq!(next_packet_id(1, |id| id == 2), Some(3));
/// ```
pub fn next_packet_id(prev: u16, in_use: impl Fn(u16) -> bool) -> Option<u16> {
    let mut candidate = prev;
    for _ in 0..u16::MAX {
        candidate = candidate.wrapping_add(1);
        if candidate == 0 {
            candidate = 1;
        }
        if !in_use(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Fixed-size table of `N` requests, each storing up to `F` frame bytes.
#[derive(Debug)]
pub struct RequestTable<const N: usize, const F: usize> {
    slots: [Option<Request<F>>; N],
    last_id: u16,
}

impl<const N: usize, const F: usize> Default for RequestTable<N, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const F: usize> RequestTable<N, F> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            last_id: 0,
        }
    }

    /// Number of allocated requests.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns `true` if no request is allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is allocated.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn in_use(&self, packet_id: u16) -> bool {
        self.find(packet_id).is_some()
    }

    /// Claim a slot and a fresh packet identifier.
    ///
    /// Fails with [`Error::Busy`] when all slots are taken.
    pub fn allocate(&mut self, kind: RequestKind, arg: usize) -> Result<u16, Error> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::Busy)?;
        let packet_id = next_packet_id(self.last_id, |id| self.in_use(id)).ok_or(Error::Busy)?;
        self.last_id = packet_id;
        self.slots[index] = Some(Request::new(kind, packet_id, arg));
        Ok(packet_id)
    }

    /// Look up a request by packet identifier.
    pub fn find(&self, packet_id: u16) -> Option<&Request<F>> {
        self.slots
            .iter()
            .flatten()
            .find(|req| req.packet_id == packet_id)
    }

    /// Mutable lookup by packet identifier.
    pub fn find_mut(&mut self, packet_id: u16) -> Option<&mut Request<F>> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|req| req.packet_id == packet_id)
    }

    /// Free the slot holding `packet_id`, returning its request.
    pub fn release(&mut self, packet_id: u16) -> Option<Request<F>> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(req) if req.packet_id == packet_id))
            .and_then(Option::take)
    }

    /// Free every slot, yielding the released requests.
    pub fn drain(&mut self) -> impl Iterator<Item = Request<F>> + '_ {
        self.slots.iter_mut().filter_map(Option::take)
    }

    /// Account for `n` bytes the transport accepted from the TX buffer.
    ///
    /// Requests whose frame has now completely left the buffer start their
    /// acknowledgement timer at `now`.
    pub fn on_flushed(&mut self, n: usize, now: u32) {
        for req in self.slots.iter_mut().flatten() {
            if req.status != Status::Pending || req.is_deferred() {
                continue;
            }
            req.expected_sent_len = req.expected_sent_len.saturating_sub(n);
            if req.expected_sent_len == 0 {
                req.status = Status::AwaitingAck;
                req.timeout_start = now;
                if req.retry == RetryState::Unsent {
                    req.retry = RetryState::Sent;
                }
            }
        }
    }

    /// Identifiers of deferred requests, in slot order.
    pub fn deferred(&self) -> Vec<u16, N> {
        self.slots
            .iter()
            .flatten()
            .filter(|req| req.is_deferred())
            .map(|req| req.packet_id)
            .collect()
    }

    /// Identifiers of requests whose acknowledgement is overdue, oldest first.
    pub fn expired(&self, now: u32, timeout_ms: u32) -> Vec<u16, N> {
        let mut overdue: Vec<(u32, u16), N> = Vec::new();
        for req in self.slots.iter().flatten() {
            let elapsed = now.wrapping_sub(req.timeout_start);
            if req.status == Status::AwaitingAck && elapsed >= timeout_ms {
                // At most N entries, one per slot.
                let _ = overdue.push((elapsed, req.packet_id));
            }
        }
        overdue.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        overdue.iter().map(|&(_, id)| id).collect()
    }
}
