//! Link sublayer: four directed send variants plus a timed, polling receive.
//!
//! Grounded on the `pdsns_link_send_nonblocking_noack/_blocking_noack/
//! _nonblocking_ack/_blocking_ack/_recv/_accept/_pass` signatures in
//! `libpdsns.h`; each send variant is a thin pass-through to the matching
//! LLC event, and `recv` repeatedly asks the LLC to hand over one queued
//! frame (a `Pass`) until one arrives or the timeout expires.

use embassy_futures::select::{select, Either};

use crate::clock::Clock;
use crate::control::{ctrl_accept, event_accept, store_rc, Slot};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::llc::LlcEvent;
use crate::layers::net::NetEvent;
use crate::layers::LinkAction;
use crate::payload::Frame;

/// Deposited into a link's event slot: a send request from the net layer
/// above, or a delivered frame from the LLC below.
pub enum LinkEvent {
    SendNonblockingNoAck { frame: Frame },
    SendBlockingNoAck { frame: Frame },
    SendNonblockingAck { frame: Frame },
    SendBlockingAck { frame: Frame },
    Deliver { frame: Frame },
}

pub struct Link {
    pub node_id: u64,

    /// Own: net deposits send requests, LLC deposits delivered frames.
    pub event_slot: &'static Slot<LinkEvent>,
    pending: Option<LinkEvent>,

    /// Down: commands LLC.
    pub llc_event_slot: &'static Slot<LlcEvent>,
    /// Own: LLC writes its outcome here (`llc_rc` in the original).
    pub llc_rc: &'static Slot<PResult<()>>,

    /// Up: delivers a received frame to the net layer.
    pub net_event_slot: &'static Slot<NetEvent>,
    /// Up: this link writes its outcome here (`link_rc` in the net layer).
    pub net_link_rc: &'static Slot<PResult<()>>,

    pub timeout_wake: &'static Slot<()>,
    pub clock: &'static Clock,
}

impl Link {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: u64,
        event_slot: &'static Slot<LinkEvent>,
        llc_event_slot: &'static Slot<LlcEvent>,
        llc_rc: &'static Slot<PResult<()>>,
        net_event_slot: &'static Slot<NetEvent>,
        net_link_rc: &'static Slot<PResult<()>>,
        timeout_wake: &'static Slot<()>,
        clock: &'static Clock,
    ) -> Self {
        Self {
            node_id,
            event_slot,
            pending: None,
            llc_event_slot,
            llc_rc,
            net_event_slot,
            net_link_rc,
            timeout_wake,
            clock,
        }
    }

    /// Block until an event arrives in this link's own slot, returning which
    /// kind it is.
    pub async fn wait_for_event(&mut self) -> LinkAction {
        let event = ctrl_accept(self.event_slot).await;
        let action = match &event {
            LinkEvent::Deliver { .. } => LinkAction::Recv,
            _ => LinkAction::Send,
        };
        self.pending = Some(event);
        action
    }

    pub fn accept(&mut self) -> PResult<(u64, u64, Frame)> {
        match self.pending.take() {
            Some(
                LinkEvent::SendNonblockingNoAck { frame }
                | LinkEvent::SendBlockingNoAck { frame }
                | LinkEvent::SendNonblockingAck { frame }
                | LinkEvent::SendBlockingAck { frame },
            ) => Ok((frame.srcid, frame.dstid, frame)),
            other => {
                self.pending = other;
                Err(PdsnsError::new(ErrorKind::NoData, "no pending send to accept"))
            }
        }
    }

    async fn send(&mut self, event: LlcEvent) -> PResult<()> {
        event_accept(self.llc_event_slot, event);
        ctrl_accept(self.llc_rc).await
    }

    pub async fn send_nonblocking_noack(&mut self, frame: Frame) -> PResult<()> {
        self.send(LlcEvent::SendNonblockingNoAck { frame }).await
    }

    pub async fn send_blocking_noack(&mut self, frame: Frame) -> PResult<()> {
        self.send(LlcEvent::SendBlockingNoAck { frame }).await
    }

    pub async fn send_nonblocking_ack(&mut self, frame: Frame) -> PResult<()> {
        self.send(LlcEvent::SendNonblockingAck { frame }).await
    }

    pub async fn send_blocking_ack(&mut self, frame: Frame) -> PResult<()> {
        self.send(LlcEvent::SendBlockingAck { frame }).await
    }

    /// Poll the LLC for one queued frame until one arrives or `tout` ticks
    /// pass. Any send request that lands on this link's own slot while
    /// waiting (the net layer attempting to send mid-receive) is failed
    /// immediately and the wait continues.
    pub async fn recv(&mut self, tout: u64) -> PResult<Frame> {
        let expiry = self.clock.now() + tout;
        let timer = self.clock.register_timer(expiry, self.timeout_wake);
        loop {
            event_accept(self.llc_event_slot, LlcEvent::Pass);
            match select(ctrl_accept(self.event_slot), ctrl_accept(self.timeout_wake)).await {
                Either::First(LinkEvent::Deliver { frame }) => {
                    self.clock.cancel_timer(timer);
                    return Ok(frame);
                }
                Either::First(_unexpected_send) => {
                    self.notify_sender(Err(PdsnsError::new(
                        ErrorKind::BadMessage,
                        "send attempted while a receive was pending",
                    )));
                }
                Either::Second(()) => {
                    return Err(PdsnsError::new(ErrorKind::Timeout, "link recv timed out"))
                }
            }
        }
    }

    pub fn pass(&mut self, frame: Frame) {
        event_accept(self.net_event_slot, NetEvent::Recv { frame });
    }

    pub fn notify_sender(&mut self, rc: PResult<()>) {
        store_rc(self.net_link_rc, rc);
    }

    pub async fn sleep(&mut self, tout: u64) {
        let expiry = self.clock.now() + tout;
        self.clock.register_timer(expiry, self.timeout_wake);
        ctrl_accept(self.timeout_wake).await;
    }
}
