//! Inter-task control transfer.
//!
//! There is no preemption anywhere in this crate: at any instant exactly one
//! task is running, and every suspension point is one of the two primitives
//! below. A task that wants to hand off work deposits into the target's slot
//! (`event_accept`) and then suspends on its own slot (`ctrl_accept`) until
//! something later signals it back. This is a direct translation of the
//! original's `evport` mailbox plus `pth_yield(target)`: depositing into a
//! `Signal` both stores the payload and wakes a waiter on it, so the pair of
//! calls below reproduce "block the caller until yielded back to" exactly,
//! without relying on any assumption about executor polling order.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// A single-producer/single-consumer mailbox doubling as a wake primitive.
pub type Slot<T> = Signal<CriticalSectionRawMutex, T>;

/// Deposit `event` into `slot`, waking a task waiting on it.
///
/// Does not itself suspend the caller; callers that need to hand off control
/// follow this with a `ctrl_accept` on their own slot.
pub fn event_accept<T>(slot: &Slot<T>, event: T) {
    slot.signal(event);
}

/// Suspend the current task until `own_slot` is signalled, returning the
/// payload deposited there.
///
/// This is the receiving half of a control transfer: the caller blocks here
/// until some other task, possibly after cascading through several further
/// handoffs of its own, signals back.
pub async fn ctrl_accept<T>(own_slot: &Slot<T>) -> T {
    own_slot.wait().await
}

/// Write a return code into an upward return-code slot.
///
/// Distinguished from `event_accept` only by naming: return-code slots carry
/// a layer's outcome rather than a request, matching the original's separate
/// `radio_rc`/`mac_rc`/`llc_rc`/`link_rc` fields.
pub fn store_rc<T>(slot: &Slot<T>, rc: T) {
    slot.signal(rc);
}

/// Identifies one of the five cooperative layers a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerId {
    Radio,
    Mac,
    Llc,
    Link,
    Net,
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LayerId::Radio => "radio",
            LayerId::Mac => "mac",
            LayerId::Llc => "llc",
            LayerId::Link => "link",
            LayerId::Net => "net",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn deposit_then_wait_observes_the_payload() {
        let slot: Slot<u32> = Signal::new();
        event_accept(&slot, 7);
        let got = block_on(ctrl_accept(&slot));
        assert_eq!(got, 7);
    }

    #[test]
    fn store_rc_is_readable_as_an_event() {
        let slot: Slot<Result<(), &'static str>> = Signal::new();
        store_rc(&slot, Err("boom"));
        let got = block_on(ctrl_accept(&slot));
        assert_eq!(got, Err("boom"));
    }
}
