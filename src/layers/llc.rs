//! LLC sublayer: sequencing, acknowledgement, and the rx/tx queues.
//!
//! The richest of the five state machines. Grounded on
//! `pdsns_llc_send_blocking[_noack]`, `pdsns_llc_wait_for_ack`,
//! `pdsns_llc_send_nonblocking_ack`, `pdsns_llc_send_blocking_ack`,
//! `pdsns_llc_recv_data`, `pdsns_llc_send_ack`, `pdsns_llc_recv`, and
//! `pdsns_llc_pass` in the original (`libpdsns.c`, LLC section).

use std::collections::VecDeque;

use embassy_futures::select::{select, Either};

use crate::clock::Clock;
use crate::control::{ctrl_accept, event_accept, store_rc, Slot};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::link::LinkEvent;
use crate::layers::mac::MacEvent;
use crate::payload::Frame;
use crate::rng::SeqGen;

/// Ack-wait budget, in ticks, matching the original's `LLC_ACK_TOUT`.
pub const LLC_ACK_TIMEOUT_TICKS: u64 = 100;

/// Cap on the rx queue; past this, the oldest unmatched frame is dropped
/// (§9 resolution of the original's unbounded rx queue).
pub const LLC_RX_QUEUE_CAPACITY: usize = 64;

/// Deposited into an LLC's event slot, by the link layer above (the four
/// send variants, and `Pass`) or by the MAC layer below (`Recv`).
pub enum LlcEvent {
    SendNonblockingNoAck { frame: Frame },
    SendBlockingNoAck { frame: Frame },
    SendNonblockingAck { frame: Frame },
    SendBlockingAck { frame: Frame },
    Recv { frame: Frame },
    Pass,
}

pub struct Llc {
    pub node_id: u64,

    /// Own: link deposits send/pass requests, MAC deposits received frames.
    pub event_slot: &'static Slot<LlcEvent>,

    /// Down: commands MAC to send a frame.
    pub mac_event_slot: &'static Slot<MacEvent>,
    /// Own: MAC writes its send outcome here (`mac_rc` in the original).
    pub mac_rc: &'static Slot<PResult<()>>,

    /// Up: delivers one popped rx frame to the link layer.
    pub link_event_slot: &'static Slot<LinkEvent>,
    /// Up: this LLC writes its outcome here (`llc_rc` in the link sublayer).
    pub link_llc_rc: &'static Slot<PResult<()>>,

    /// Frames received and not yet claimed by a `Pass`.
    rx: VecDeque<Frame>,

    /// This node's fixed neighbor table, frozen at startup.
    pub neighbor_powers: &'static [(u64, f64)],

    pub seq_gen: SeqGen,

    /// Reusable wake for the ack-wait timeout, leaked once at construction.
    pub timeout_wake: &'static Slot<()>,

    pub clock: &'static Clock,
}

impl Llc {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: u64,
        event_slot: &'static Slot<LlcEvent>,
        mac_event_slot: &'static Slot<MacEvent>,
        mac_rc: &'static Slot<PResult<()>>,
        link_event_slot: &'static Slot<LinkEvent>,
        link_llc_rc: &'static Slot<PResult<()>>,
        neighbor_powers: &'static [(u64, f64)],
        seq_gen: SeqGen,
        timeout_wake: &'static Slot<()>,
        clock: &'static Clock,
    ) -> Self {
        Self {
            node_id,
            event_slot,
            mac_event_slot,
            mac_rc,
            link_event_slot,
            link_llc_rc,
            rx: VecDeque::new(),
            neighbor_powers,
            seq_gen,
            timeout_wake,
            clock,
        }
    }

    pub async fn run(&mut self) {
        loop {
            let event = ctrl_accept(self.event_slot).await;
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: LlcEvent) {
        match event {
            LlcEvent::SendNonblockingNoAck { frame } => {
                let rc = self.send_once(frame).await;
                store_rc(self.link_llc_rc, rc);
            }
            LlcEvent::SendBlockingNoAck { frame } => {
                let rc = self.send_blocking(frame).await;
                store_rc(self.link_llc_rc, rc);
            }
            LlcEvent::SendNonblockingAck { mut frame } => {
                frame.seq = self.seq_gen.next_seq();
                frame.ack = 0;
                let seq = frame.seq;
                let rc = match self.send_once(frame).await {
                    Ok(()) => self.wait_for_ack(seq).await,
                    Err(e) => Err(e),
                };
                store_rc(self.link_llc_rc, rc);
            }
            LlcEvent::SendBlockingAck { mut frame } => {
                frame.seq = self.seq_gen.next_seq();
                frame.ack = 0;
                let seq = frame.seq;
                let rc = match self.send_blocking(frame).await {
                    Ok(()) => self.wait_for_ack(seq).await,
                    Err(e) => Err(e),
                };
                store_rc(self.link_llc_rc, rc);
            }
            LlcEvent::Recv { frame } => self.on_recv(frame).await,
            LlcEvent::Pass => self.on_pass().await,
        }
    }

    async fn send_once(&mut self, frame: Frame) -> PResult<()> {
        let pwr = frame.pwr;
        event_accept(self.mac_event_slot, MacEvent::Send { frame, pwr });
        ctrl_accept(self.mac_rc).await
    }

    /// Retry a send until it succeeds, processing any inbound frames that
    /// arrive while waiting (mirrors `pdsns_llc_send_blocking`'s interleaved
    /// drain of its own event slot between attempts).
    async fn send_blocking(&mut self, frame: Frame) -> PResult<()> {
        loop {
            match self.send_once(frame.clone()).await {
                Ok(()) => return Ok(()),
                Err(_) => match ctrl_accept(self.event_slot).await {
                    LlcEvent::Recv { frame } => self.store_incoming(frame).await,
                    _ => panic!("llc {}: unexpected event while retrying a blocking send", self.node_id),
                },
            }
        }
    }

    async fn wait_for_ack(&mut self, seq: u16) -> PResult<()> {
        let expiry = self.clock.now() + LLC_ACK_TIMEOUT_TICKS;
        let timer = self.clock.register_timer(expiry, self.timeout_wake);
        loop {
            match select(ctrl_accept(self.event_slot), ctrl_accept(self.timeout_wake)).await {
                Either::First(LlcEvent::Recv { frame }) => {
                    if frame.is_ack() && frame.ack == seq {
                        self.clock.cancel_timer(timer);
                        return Ok(());
                    }
                    self.store_incoming(frame).await;
                }
                Either::First(_) => {
                    panic!("llc {}: unexpected event while awaiting an ack", self.node_id)
                }
                Either::Second(()) => {
                    return Err(PdsnsError::new(ErrorKind::Timeout, "ack wait expired"))
                }
            }
        }
    }

    /// Common handling for a frame arriving from MAC: drop if misaddressed,
    /// otherwise enqueue and ack if it demands one.
    async fn store_incoming(&mut self, frame: Frame) {
        if frame.dstid != self.node_id {
            return;
        }
        let needs_ack = !frame.is_ack();
        self.enqueue_rx(frame.clone());
        if needs_ack {
            if let Err(e) = self.send_ack(&frame).await {
                log::warn!("llc {}: failed to ack seq {}: {e}", self.node_id, frame.seq);
            }
        }
    }

    async fn on_recv(&mut self, frame: Frame) {
        self.store_incoming(frame).await;
    }

    /// Block until the rx queue holds a frame, then hand one to the link
    /// layer. If a send request arrives on this LLC's own slot instead of a
    /// receive while waiting, the pass is abandoned — the link caller will
    /// simply see no data and may send instead, matching the original.
    async fn on_pass(&mut self) {
        loop {
            if let Some(frame) = self.rx.pop_front() {
                event_accept(self.link_event_slot, LinkEvent::Deliver { frame });
                return;
            }
            match ctrl_accept(self.event_slot).await {
                LlcEvent::Recv { frame } => self.store_incoming(frame).await,
                _ => return,
            }
        }
    }

    async fn send_ack(&mut self, original: &Frame) -> PResult<()> {
        let pwr = self.neighbor_power(original.srcid).ok_or_else(|| {
            PdsnsError::new(
                ErrorKind::NotFound,
                format!("node {} is not a neighbor, cannot ack seq {}", original.srcid, original.seq),
            )
        })?;
        let mut ack = Frame::new(Vec::new());
        ack.srcid = self.node_id;
        ack.dstid = original.srcid;
        ack.seq = 0;
        ack.ack = original.seq;
        ack.pwr = pwr;
        self.send_once(ack).await
    }

    fn neighbor_power(&self, id: u64) -> Option<f64> {
        self.neighbor_powers.iter().find(|(nid, _)| *nid == id).map(|(_, p)| *p)
    }

    fn enqueue_rx(&mut self, frame: Frame) {
        if self.rx.len() >= LLC_RX_QUEUE_CAPACITY {
            self.rx.pop_front();
            log::warn!("llc {}: rx queue full, dropping oldest unmatched frame", self.node_id);
        }
        self.rx.push_back(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::signal::Signal;

    #[test]
    fn seq_zero_frames_need_no_further_ack() {
        let mut ack = Frame::new(Vec::new());
        ack.seq = 0;
        ack.ack = 7;
        assert!(ack.is_ack());
    }

    fn llc_for_test(neighbor_powers: &'static [(u64, f64)]) -> Llc {
        let event_slot: &'static Slot<LlcEvent> = Box::leak(Box::new(Signal::new()));
        let mac_event_slot = Box::leak(Box::new(Signal::new()));
        let mac_rc: &'static Slot<PResult<()>> = Box::leak(Box::new(Signal::new()));
        let link_event_slot = Box::leak(Box::new(Signal::new()));
        let link_llc_rc: &'static Slot<PResult<()>> = Box::leak(Box::new(Signal::new()));
        let timeout_wake: &'static Slot<()> = Box::leak(Box::new(Signal::new()));
        let clock: &'static Clock = Box::leak(Box::new(Clock::new()));
        Llc::new(
            1,
            event_slot,
            mac_event_slot,
            mac_rc,
            link_event_slot,
            link_llc_rc,
            neighbor_powers,
            SeqGen::for_node(1, 1),
            timeout_wake,
            clock,
        )
    }

    #[test]
    fn rx_queue_drops_oldest_when_full() {
        let mut llc = llc_for_test(&[]);
        for i in 0..(LLC_RX_QUEUE_CAPACITY + 1) as u16 {
            let mut frame = Frame::new(Vec::new());
            frame.seq = i + 1; // non-zero so these aren't mistaken for acks
            llc.enqueue_rx(frame);
        }
        assert_eq!(llc.rx.len(), LLC_RX_QUEUE_CAPACITY);
        // The very first frame (seq 1) should have been evicted; the oldest
        // survivor is seq 2.
        assert_eq!(llc.rx.front().unwrap().seq, 2);
    }

    #[test]
    fn ack_to_a_non_neighbor_reports_not_found_without_losing_the_data_frame() {
        let mut llc = llc_for_test(&[]);
        let mut data = Frame::new(vec![9]);
        data.srcid = 42;
        data.dstid = llc.node_id;
        data.seq = 5;
        let err = block_on(llc.send_ack(&data)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn misaddressed_frames_are_never_enqueued() {
        let mut llc = llc_for_test(&[]);
        let mut frame = Frame::new(vec![1]);
        frame.srcid = 9;
        frame.dstid = llc.node_id + 1;
        frame.seq = 1;
        block_on(llc.store_incoming(frame));
        assert!(llc.rx.is_empty());
    }
}
