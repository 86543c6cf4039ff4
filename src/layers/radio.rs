//! Radio layer: channel state machine, sensitivity gating, collision tainting.
//!
//! Grounded directly on `pdsns_radio_turn_off/on/start_receiving/
//! stop_receiving/start_transmitting/stop_transmitting` and the per-thread
//! `pdsns_radio_routine` dispatch loop in the original. The state table in
//! SPEC_FULL §4.2 is reproduced verbatim below; anything outside that table
//! is a fatal protocol violation, matching the original's `pdsns_err_exit`
//! calls for the same transitions.

use crate::clock::{Clock, TransmissionRecord};
use crate::control::{ctrl_accept, event_accept, store_rc, Slot};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::mac::MacEvent;
use crate::payload::Frame;
use crate::user::PropagationRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Off,
    Idle,
    Transmitting,
    Receiving,
}

/// Deposited into a radio's event slot, by the scheduler (start/stop
/// receiving fan-out) or by the owning MAC task (turn on/off, start/stop
/// transmitting).
pub enum RadioEvent {
    TurnOn,
    TurnOff,
    StartReceiving { power: f64, frame: Frame },
    StopReceiving,
    StartTransmitting { frame: Frame, dstid: u64 },
    StopTransmitting,
}

pub struct Radio {
    pub node_id: u64,
    pub sensitivity: f64,
    pub maxpwr: f64,
    pub state: RadioState,
    /// Snapshot of the frame currently being received, if any.
    pub current: Option<Frame>,
    /// Set once a second transmission overlaps the current reception above
    /// sensitivity; cleared whenever a reception completes or is dropped.
    pub tainted: bool,

    pub event_slot: &'static Slot<RadioEvent>,
    /// The MAC layer's return-code slot (`radio_rc` in the original).
    pub mac_rc: &'static Slot<PResult<()>>,
    /// The MAC layer's event slot, used to push RECV events upward.
    pub mac_event_slot: &'static Slot<MacEvent>,

    pub clock: &'static Clock,
    /// Computes, for an outbound frame, which nodes receive it and at what
    /// power. Supplied once per run (`pdsns_transmission_fun` in the
    /// original); shared read-only across every node's radio.
    pub propagation: &'static dyn PropagationRule,
    /// Signalled back to the scheduler after a scheduler-originated event
    /// (`StartReceiving`/`StopReceiving`) has been handled, so the driver's
    /// per-destination fan-out (§4.1) can deliver in order rather than
    /// firing every destination's event without waiting.
    pub driver_ack: &'static Slot<()>,
}

impl Radio {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: u64,
        sensitivity: f64,
        maxpwr: f64,
        event_slot: &'static Slot<RadioEvent>,
        mac_rc: &'static Slot<PResult<()>>,
        mac_event_slot: &'static Slot<MacEvent>,
        clock: &'static Clock,
        propagation: &'static dyn PropagationRule,
        driver_ack: &'static Slot<()>,
    ) -> Self {
        Self {
            node_id,
            sensitivity,
            maxpwr,
            state: RadioState::Off,
            current: None,
            tainted: false,
            event_slot,
            mac_rc,
            mac_event_slot,
            clock,
            propagation,
            driver_ack,
        }
    }

    /// Run the radio's dispatch loop forever, one event per iteration.
    ///
    /// Acks the scheduler only for the two events it originates; MAC's own
    /// turn-on/off/transmit requests report their outcome through `mac_rc`
    /// instead and need no separate ack.
    pub async fn run(&mut self) {
        loop {
            let event = ctrl_accept(self.event_slot).await;
            let from_scheduler = matches!(
                event,
                RadioEvent::StartReceiving { .. } | RadioEvent::StopReceiving
            );
            self.handle(event);
            if from_scheduler {
                store_rc(self.driver_ack, ());
            }
        }
    }

    fn handle(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::TurnOn => self.turn_on(),
            RadioEvent::TurnOff => self.turn_off(),
            RadioEvent::StartReceiving { power, frame } => self.start_receiving(power, frame),
            RadioEvent::StopReceiving => self.stop_receiving(),
            RadioEvent::StartTransmitting { frame, dstid } => self.start_transmitting(frame, dstid),
            RadioEvent::StopTransmitting => self.stop_transmitting(),
        }
    }

    fn turn_on(&mut self) {
        match self.state {
            RadioState::Off => {
                self.state = RadioState::Idle;
                store_rc(self.mac_rc, Ok(()));
            }
            _ => store_rc(
                self.mac_rc,
                Err(PdsnsError::new(ErrorKind::Fatal, "radio already on")),
            ),
        }
    }

    fn turn_off(&mut self) {
        // OFF->OFF is a harmless no-op in the original; every other state
        // also transitions cleanly to OFF.
        self.state = RadioState::Off;
        self.current = None;
        self.tainted = false;
        store_rc(self.mac_rc, Ok(()));
    }

    fn start_receiving(&mut self, power: f64, frame: Frame) {
        match self.state {
            RadioState::Idle => {
                if power < self.sensitivity {
                    // Below the noise floor: ignored entirely, no state change.
                    return;
                }
                self.state = RadioState::Receiving;
                self.tainted = false;
                self.current = Some(frame);
            }
            RadioState::Receiving => {
                if power > self.sensitivity {
                    self.tainted = true;
                }
            }
            RadioState::Transmitting | RadioState::Off => {
                // A transmitting or off radio cannot start a reception.
            }
        }
    }

    fn stop_receiving(&mut self) {
        match self.state {
            RadioState::Receiving => {
                self.state = RadioState::Idle;
                let tainted = self.tainted;
                let frame = self.current.take();
                self.tainted = false;
                if tainted {
                    // Collision: drop silently, nothing is delivered to MAC.
                    return;
                }
                if let Some(mut frame) = frame {
                    frame.received_power = frame.received_power.max(0.0);
                    event_accept(self.mac_event_slot, MacEvent::Recv { frame });
                }
            }
            _ => {}
        }
    }

    fn start_transmitting(&mut self, frame: Frame, dstid: u64) {
        match self.state {
            RadioState::Idle => {
                self.state = RadioState::Transmitting;
                self.current = Some(frame.clone());
                let spread = self.propagation.propagate(self.node_id, dstid);
                let duration = transmission_duration(&frame);
                self.clock.enqueue_transmission(TransmissionRecord {
                    sources: spread.sources,
                    destinations: spread.destinations,
                    total_ticks: duration,
                    remaining_ticks: duration,
                    frame,
                });
                // Deliberately does not write `mac_rc` here: the original
                // only reports the outcome when the matching
                // StopTransmitting fires, so a MAC send() blocks for the
                // full airtime. See SPEC_FULL §4.2.
            }
            _ => store_rc(
                self.mac_rc,
                Err(PdsnsError::new(ErrorKind::Fatal, "radio busy, cannot transmit")),
            ),
        }
    }

    fn stop_transmitting(&mut self) {
        match self.state {
            RadioState::Transmitting => {
                self.state = RadioState::Idle;
                self.current = None;
                store_rc(self.mac_rc, Ok(()));
            }
            _ => {
                // The original treats this as an invariant violation
                // (`pdsns_err_exit(EINVAL)`): a radio cannot stop
                // transmitting unless it is transmitting.
                panic!("radio {}: stop_transmitting while not transmitting", self.node_id);
            }
        }
    }
}

/// Frames take one tick per byte of payload, with a one-tick floor so an
/// empty payload still occupies the medium for a tick.
fn transmission_duration(frame: &Frame) -> u64 {
    (frame.data.len() as u64).max(1)
}
