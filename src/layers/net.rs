//! Network layer: the topmost per-node task and the simplest.
//!
//! Exposes `send`/`recv`/`sleep` to the user-supplied net routine, grounded
//! on `pdsns_net_send/recv/sleep` in `libpdsns.h`. A send always goes
//! through the link layer's blocking, acknowledged variant — the original
//! exposes only one net-level send, leaving the four reliability/blocking
//! combinations as a link-layer-only choice for code that talks to link
//! directly.

use crate::clock::Clock;
use crate::control::{ctrl_accept, event_accept, Slot};
use crate::error::PResult;
use crate::layers::link::LinkEvent;
use crate::payload::Frame;

/// Deposited into a net layer's event slot: only ever a delivered frame,
/// pushed up by the link layer's `pass`.
pub enum NetEvent {
    Recv { frame: Frame },
}

pub struct Net {
    pub node_id: u64,

    /// Own: link deposits delivered frames here.
    pub event_slot: &'static Slot<NetEvent>,

    /// Down: commands the link layer.
    pub link_event_slot: &'static Slot<LinkEvent>,
    /// Own: link writes its send outcome here (`link_rc` in the original).
    pub link_rc: &'static Slot<PResult<()>>,

    pub timeout_wake: &'static Slot<()>,
    pub clock: &'static Clock,
}

impl Net {
    pub fn new(
        node_id: u64,
        event_slot: &'static Slot<NetEvent>,
        link_event_slot: &'static Slot<LinkEvent>,
        link_rc: &'static Slot<PResult<()>>,
        timeout_wake: &'static Slot<()>,
        clock: &'static Clock,
    ) -> Self {
        Self {
            node_id,
            event_slot,
            link_event_slot,
            link_rc,
            timeout_wake,
            clock,
        }
    }

    pub async fn send(&mut self, dstid: u64, data: Vec<u8>) -> PResult<()> {
        let mut frame = Frame::new(data);
        frame.srcid = self.node_id;
        frame.dstid = dstid;
        event_accept(self.link_event_slot, LinkEvent::SendBlockingAck { frame });
        ctrl_accept(self.link_rc).await
    }

    pub async fn recv(&mut self) -> PResult<Frame> {
        let NetEvent::Recv { frame } = ctrl_accept(self.event_slot).await;
        Ok(frame)
    }

    pub async fn sleep(&mut self, tout: u64) {
        let expiry = self.clock.now() + tout;
        self.clock.register_timer(expiry, self.timeout_wake);
        ctrl_accept(self.timeout_wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::signal::Signal;

    fn net_for_test() -> Net {
        let event_slot: &'static Slot<NetEvent> = Box::leak(Box::new(Signal::new()));
        let link_event_slot = Box::leak(Box::new(Signal::new()));
        let link_rc: &'static Slot<PResult<()>> = Box::leak(Box::new(Signal::new()));
        let timeout_wake: &'static Slot<()> = Box::leak(Box::new(Signal::new()));
        let clock: &'static Clock = Box::leak(Box::new(Clock::new()));
        Net::new(1, event_slot, link_event_slot, link_rc, timeout_wake, clock)
    }

    #[test]
    fn recv_returns_whatever_the_link_layer_delivers() {
        let mut net = net_for_test();
        event_accept(net.event_slot, NetEvent::Recv { frame: Frame::new(vec![4, 5]) });
        let frame = block_on(net.recv()).unwrap();
        assert_eq!(frame.data, vec![4, 5]);
    }

    #[test]
    fn send_deposits_a_blocking_ack_request_addressed_by_node_id() {
        let mut net = net_for_test();
        let send = block_on(async {
            // Race the send against a pre-armed reply so it doesn't block forever.
            event_accept(net.link_rc, Ok(()));
            net.send(2, vec![1, 2, 3]).await
        });
        assert!(send.is_ok());
    }
}
