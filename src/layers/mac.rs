//! MAC sublayer: framing handoff between LLC and the radio.
//!
//! Unlike the radio, the MAC sublayer has no state machine of its own — it
//! is a thin set of blocking operations (`send`, `recv`, `accept`, `pass`,
//! `sleep`, `notify_sender`) that a user-supplied routine calls to drive
//! one node's MAC behavior. Grounded on the `pdsns_mac_*` signatures in
//! `libpdsns.h` and on how the radio/LLC sections of `libpdsns.c` deposit
//! into and read from a MAC's `evport`.

use embassy_futures::select::{select, Either};

use crate::clock::Clock;
use crate::control::{ctrl_accept, event_accept, store_rc, Slot};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::llc::LlcEvent;
use crate::layers::radio::RadioEvent;
use crate::layers::MacAction;
use crate::payload::Frame;

/// Deposited into a MAC's event slot: either LLC asking it to send, or the
/// radio delivering a received frame.
pub enum MacEvent {
    Send { frame: Frame, pwr: f64 },
    Recv { frame: Frame },
}

pub struct Mac {
    pub node_id: u64,

    /// Own: LLC deposits `Send`, radio deposits `Recv`. Leaked once at node
    /// construction, alongside every other slot, so every layer can hold
    /// plain `&'static` references without a circular construction order.
    pub event_slot: &'static Slot<MacEvent>,
    /// An event consumed by `wait_for_event` but not yet resolved by
    /// `accept`/`recv`.
    pending: Option<MacEvent>,

    /// Down: commands the radio.
    pub radio_event_slot: &'static Slot<RadioEvent>,
    /// Own: the radio writes its outcome here (`radio_rc` in the original).
    pub radio_rc: &'static Slot<PResult<()>>,

    /// Up: delivers a received frame to the LLC.
    pub llc_event_slot: &'static Slot<LlcEvent>,
    /// Up: this MAC writes its send outcome here (`mac_rc` in the LLC).
    pub llc_mac_rc: &'static Slot<PResult<()>>,

    /// Reusable wake for `recv`'s timeout, leaked once at node construction.
    pub timeout_wake: &'static Slot<()>,

    pub clock: &'static Clock,
}

impl Mac {
    pub fn new(
        node_id: u64,
        event_slot: &'static Slot<MacEvent>,
        radio_event_slot: &'static Slot<RadioEvent>,
        radio_rc: &'static Slot<PResult<()>>,
        llc_event_slot: &'static Slot<LlcEvent>,
        llc_mac_rc: &'static Slot<PResult<()>>,
        timeout_wake: &'static Slot<()>,
        clock: &'static Clock,
    ) -> Self {
        Self {
            node_id,
            event_slot,
            pending: None,
            radio_event_slot,
            radio_rc,
            llc_event_slot,
            llc_mac_rc,
            timeout_wake,
            clock,
        }
    }

    /// Block until an event arrives in this MAC's own slot, returning which
    /// kind it is; the payload is retained for `accept`/`recv` to consume.
    pub async fn wait_for_event(&mut self) -> MacAction {
        let event = ctrl_accept(self.event_slot).await;
        let action = match &event {
            MacEvent::Send { .. } => MacAction::Send,
            MacEvent::Recv { .. } => MacAction::Recv,
        };
        self.pending = Some(event);
        action
    }

    /// Take a pending `Send` deposited by LLC (after `wait_for_event`
    /// reported `MacAction::Send`).
    pub fn accept(&mut self) -> PResult<(Frame, f64)> {
        match self.pending.take() {
            Some(MacEvent::Send { frame, pwr }) => Ok((frame, pwr)),
            other => {
                self.pending = other;
                Err(PdsnsError::new(ErrorKind::NoData, "no pending send to accept"))
            }
        }
    }

    /// Block for a received frame, honoring a pending event first if one was
    /// already claimed by `wait_for_event`. Times out after `timeout` ticks.
    pub async fn recv(&mut self, timeout: u64) -> PResult<Frame> {
        if let Some(MacEvent::Recv { frame }) = self.pending.take() {
            return Ok(frame);
        }
        let expiry = self.clock.now() + timeout;
        let timer = self.clock.register_timer(expiry, self.timeout_wake);
        let outcome = select(ctrl_accept(self.event_slot), ctrl_accept(self.timeout_wake)).await;
        match outcome {
            Either::First(MacEvent::Recv { frame }) => {
                self.clock.cancel_timer(timer);
                Ok(frame)
            }
            Either::First(send_event) => {
                self.clock.cancel_timer(timer);
                self.pending = Some(send_event);
                Err(PdsnsError::new(ErrorKind::NoData, "send event arrived while awaiting recv"))
            }
            Either::Second(()) => Err(PdsnsError::new(ErrorKind::Timeout, "mac recv timed out")),
        }
    }

    /// Start transmitting `data` at `pwr` towards `dstid`. Blocks until the
    /// radio's matching `StopTransmitting` reports the outcome, so the
    /// caller experiences the full airtime as latency (see SPEC_FULL §4.2).
    pub async fn send(&mut self, mut frame: Frame, pwr: f64, dstid: u64) -> PResult<()> {
        frame.pwr = pwr;
        event_accept(
            self.radio_event_slot,
            RadioEvent::StartTransmitting { frame, dstid },
        );
        ctrl_accept(self.radio_rc).await
    }

    /// Hand a received frame up to the LLC layer.
    pub fn pass(&mut self, frame: Frame) {
        event_accept(self.llc_event_slot, LlcEvent::Recv { frame });
    }

    /// Report this MAC's send outcome to the LLC layer above.
    pub fn notify_sender(&mut self, rc: PResult<()>) {
        store_rc(self.llc_mac_rc, rc);
    }

    /// Sleep for `tout` ticks, cooperatively yielding to the scheduler.
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

    fn mac_for_test() -> Mac {
        let event_slot: &'static Slot<MacEvent> = Box::leak(Box::new(Signal::new()));
        let radio_event_slot = Box::leak(Box::new(Signal::new()));
        let radio_rc: &'static Slot<PResult<()>> = Box::leak(Box::new(Signal::new()));
        let llc_event_slot = Box::leak(Box::new(Signal::new()));
        let llc_mac_rc: &'static Slot<PResult<()>> = Box::leak(Box::new(Signal::new()));
        let timeout_wake: &'static Slot<()> = Box::leak(Box::new(Signal::new()));
        let clock: &'static Clock = Box::leak(Box::new(Clock::new()));
        Mac::new(1, event_slot, radio_event_slot, radio_rc, llc_event_slot, llc_mac_rc, timeout_wake, clock)
    }

    #[test]
    fn accept_takes_a_pending_send_exactly_once() {
        let mut mac = mac_for_test();
        event_accept(mac.event_slot, MacEvent::Send { frame: Frame::new(vec![1]), pwr: 1.0 });
        let action = block_on(mac.wait_for_event());
        assert_eq!(action, MacAction::Send);
        let (frame, pwr) = mac.accept().unwrap();
        assert_eq!(frame.data, vec![1]);
        assert_eq!(pwr, 1.0);
        assert!(mac.accept().is_err());
    }

    #[test]
    fn recv_returns_a_frame_already_claimed_by_wait_for_event() {
        let mut mac = mac_for_test();
        event_accept(mac.event_slot, MacEvent::Recv { frame: Frame::new(vec![9]) });
        let action = block_on(mac.wait_for_event());
        assert_eq!(action, MacAction::Recv);
        let frame = block_on(mac.recv(10)).unwrap();
        assert_eq!(frame.data, vec![9]);
    }
}
