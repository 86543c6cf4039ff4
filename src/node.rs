//! A simulated node: one instance of every layer, wired together and
//! spawned as five cooperative tasks.
//!
//! Grounded on the `pdsns_node` struct (`libpdsns.c` lines ~230-355) and on
//! the teacher's `initialize_nodes` in `network_task.rs`, which leaks
//! per-node channels once at construction for the `'static` lifetimes
//! `embassy_executor::task` requires — the same idiom used here for every
//! inter-layer slot.
//!
//! Every slot a layer treats as "own" is leaked once, up front, before any
//! layer struct exists. Each layer's `new()` constructor then just copies in
//! the `&'static` references it needs, in any order — there is no
//! construction-order dependency between layers.

use embassy_executor::{SpawnError, Spawner};
use embassy_futures::select::select;
use embassy_sync::signal::Signal;

use crate::clock::Clock;
use crate::control::{ctrl_accept, store_rc, Slot};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::link::{Link, LinkEvent};
use crate::layers::llc::Llc;
use crate::layers::mac::{Mac, MacEvent};
use crate::layers::net::{Net, NetEvent};
use crate::layers::radio::{Radio, RadioEvent};
use crate::rng::SeqGen;
use crate::user::{LinkRoutine, MacRoutine, NetRoutine, PropagationRule};

/// Upper bound on simultaneously simulated nodes, sized for `pool_size` on
/// each per-layer task.
pub const MAX_NODE_COUNT: usize = 256;

/// Everything the scheduler needs to know about one node after it has been
/// built and spawned.
pub struct Node {
    pub id: u64,
    pub x: i64,
    pub y: i64,
    pub sensitivity: f64,
    pub maxpwr: f64,
    pub neighbors: Vec<(u64, f64)>,
    /// Where the scheduler delivers START_RECEIVING/STOP_RECEIVING fan-out.
    pub radio_event_slot: &'static Slot<RadioEvent>,
    /// Signalled back by the radio once it has handled one fan-out event,
    /// so the scheduler can deliver to destinations in order (§4.1).
    pub driver_ack: &'static Slot<()>,

    /// One per-task cancellation slot, signalled once by
    /// `request_terminate` after the tick loop ends. Each task races its own
    /// dispatch future against its slot (see the `*_task` wrappers below),
    /// so a task blocked anywhere inside a layer's blocking calls — a send,
    /// a receive, a sleep — is still dropped promptly, without having to
    /// teach every blocking primitive to poll a flag.
    radio_terminate: &'static Slot<()>,
    mac_terminate: &'static Slot<()>,
    llc_terminate: &'static Slot<()>,
    link_terminate: &'static Slot<()>,
    net_terminate: &'static Slot<()>,

    /// Signalled back by each task once its race against `*_terminate` has
    /// resolved, so `join` can wait for all five to actually have stopped
    /// before the scheduler frees this node's task-pool slots for reuse.
    /// Mirrors `pdsns_node_join`'s sequential per-layer join calls.
    radio_done: &'static Slot<()>,
    mac_done: &'static Slot<()>,
    llc_done: &'static Slot<()>,
    link_done: &'static Slot<()>,
    net_done: &'static Slot<()>,
}

impl Node {
    /// Signal all five of this node's tasks to stop. Does not block; call
    /// `join` afterwards to wait for them to actually have exited.
    pub fn request_terminate(&self) {
        store_rc(self.radio_terminate, ());
        store_rc(self.mac_terminate, ());
        store_rc(self.llc_terminate, ());
        store_rc(self.link_terminate, ());
        store_rc(self.net_terminate, ());
    }

    /// Block until all five of this node's tasks have reported done.
    /// Best-effort in spirit with the original's `pdsns_node_join`: each
    /// layer is joined in turn, radio first and net last, matching the
    /// direction data flows up the stack.
    pub async fn join(&self) {
        ctrl_accept(self.radio_done).await;
        ctrl_accept(self.mac_done).await;
        ctrl_accept(self.llc_done).await;
        ctrl_accept(self.link_done).await;
        ctrl_accept(self.net_done).await;
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn leak_mut<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

/// Construct one node's full layer stack and spawn its five tasks.
///
/// `neighbors` must already be frozen (computed once from the user's
/// neighbor rule at startup); nodes do not move mid-run so this table never
/// changes again.
#[allow(clippy::too_many_arguments)]
pub fn build_and_spawn(
    spawner: &Spawner,
    run_seed: u64,
    id: u64,
    x: i64,
    y: i64,
    sensitivity: f64,
    maxpwr: f64,
    neighbors: Vec<(u64, f64)>,
    propagation: &'static dyn PropagationRule,
    mac_routine: &'static dyn MacRoutine,
    link_routine: &'static dyn LinkRoutine,
    net_routine: &'static dyn NetRoutine,
    clock: &'static Clock,
) -> PResult<Node> {
    let neighbors_static: &'static [(u64, f64)] = leak(neighbors.clone());

    // Every slot any layer treats as "own", leaked up front so every layer
    // struct can hold a plain `&'static` reference regardless of which
    // layer is constructed first.
    let radio_event_slot: &'static Slot<RadioEvent> = leak(Signal::new());
    let mac_event_slot: &'static Slot<MacEvent> = leak(Signal::new());
    let llc_event_slot = leak(Signal::new());
    let link_event_slot: &'static Slot<LinkEvent> = leak(Signal::new());
    let net_event_slot: &'static Slot<NetEvent> = leak(Signal::new());

    let mac_radio_rc = leak(Signal::new()); // mac's own slot, radio writes into it
    let llc_mac_rc = leak(Signal::new()); // llc's own slot, mac writes into it
    let link_llc_rc = leak(Signal::new()); // link's own slot, llc writes into it
    let net_link_rc = leak(Signal::new()); // net's own slot, link writes into it

    let mac_timeout_wake = leak(Signal::new());
    let llc_timeout_wake = leak(Signal::new());
    let link_timeout_wake = leak(Signal::new());
    let net_timeout_wake = leak(Signal::new());
    let driver_ack: &'static Slot<()> = leak(Signal::new());

    let radio_terminate: &'static Slot<()> = leak(Signal::new());
    let mac_terminate: &'static Slot<()> = leak(Signal::new());
    let llc_terminate: &'static Slot<()> = leak(Signal::new());
    let link_terminate: &'static Slot<()> = leak(Signal::new());
    let net_terminate: &'static Slot<()> = leak(Signal::new());

    let radio_done: &'static Slot<()> = leak(Signal::new());
    let mac_done: &'static Slot<()> = leak(Signal::new());
    let llc_done: &'static Slot<()> = leak(Signal::new());
    let link_done: &'static Slot<()> = leak(Signal::new());
    let net_done: &'static Slot<()> = leak(Signal::new());

    let radio = Radio::new(
        id,
        sensitivity,
        maxpwr,
        radio_event_slot,
        mac_radio_rc,
        mac_event_slot,
        clock,
        propagation,
        driver_ack,
    );
    let radio: &'static mut Radio = leak_mut(radio);

    let mac = Mac::new(
        id,
        mac_event_slot,
        radio_event_slot,
        mac_radio_rc,
        llc_event_slot,
        llc_mac_rc,
        mac_timeout_wake,
        clock,
    );
    let mac: &'static mut Mac = leak_mut(mac);

    let llc = Llc::new(
        id,
        llc_event_slot,
        mac_event_slot,
        llc_mac_rc,
        link_event_slot,
        link_llc_rc,
        neighbors_static,
        SeqGen::for_node(run_seed, id),
        llc_timeout_wake,
        clock,
    );
    let llc: &'static mut Llc = leak_mut(llc);

    let link = Link::new(
        id,
        link_event_slot,
        llc_event_slot,
        link_llc_rc,
        net_event_slot,
        net_link_rc,
        link_timeout_wake,
        clock,
    );
    let link: &'static mut Link = leak_mut(link);

    let net = Net::new(id, net_event_slot, link_event_slot, net_link_rc, net_timeout_wake, clock);
    let net: &'static mut Net = leak_mut(net);

    let spawn_err = |layer: &'static str, e: SpawnError| {
        PdsnsError::new(
            ErrorKind::OutOfMemory,
            format!("node {id}: failed to spawn its {layer} task ({e:?}); raise MAX_NODE_COUNT or run fewer nodes at once"),
        )
    };

    spawner
        .spawn(radio_task(radio, radio_terminate, radio_done))
        .map_err(|e| spawn_err("radio", e))?;
    spawner
        .spawn(llc_task(llc, llc_terminate, llc_done))
        .map_err(|e| spawn_err("llc", e))?;
    spawner
        .spawn(mac_task(mac, mac_routine, mac_terminate, mac_done))
        .map_err(|e| spawn_err("mac", e))?;
    spawner
        .spawn(link_task(link, link_routine, link_terminate, link_done))
        .map_err(|e| spawn_err("link", e))?;
    spawner
        .spawn(net_task(net, net_routine, net_terminate, net_done))
        .map_err(|e| spawn_err("net", e))?;

    Ok(Node {
        id,
        x,
        y,
        sensitivity,
        maxpwr,
        neighbors,
        radio_event_slot,
        driver_ack,
        radio_terminate,
        mac_terminate,
        llc_terminate,
        link_terminate,
        net_terminate,
        radio_done,
        mac_done,
        llc_done,
        link_done,
        net_done,
    })
}

#[embassy_executor::task(pool_size = "MAX_NODE_COUNT")]
async fn radio_task(radio: &'static mut Radio, terminate: &'static Slot<()>, done: &'static Slot<()>) {
    select(radio.run(), ctrl_accept(terminate)).await;
    store_rc(done, ());
}

#[embassy_executor::task(pool_size = "MAX_NODE_COUNT")]
async fn llc_task(llc: &'static mut Llc, terminate: &'static Slot<()>, done: &'static Slot<()>) {
    select(llc.run(), ctrl_accept(terminate)).await;
    store_rc(done, ());
}

#[embassy_executor::task(pool_size = "MAX_NODE_COUNT")]
async fn mac_task(
    mac: &'static mut Mac,
    routine: &'static dyn MacRoutine,
    terminate: &'static Slot<()>,
    done: &'static Slot<()>,
) {
    select(routine.run(mac), ctrl_accept(terminate)).await;
    store_rc(done, ());
}

#[embassy_executor::task(pool_size = "MAX_NODE_COUNT")]
async fn link_task(
    link: &'static mut Link,
    routine: &'static dyn LinkRoutine,
    terminate: &'static Slot<()>,
    done: &'static Slot<()>,
) {
    select(routine.run(link), ctrl_accept(terminate)).await;
    store_rc(done, ());
}

#[embassy_executor::task(pool_size = "MAX_NODE_COUNT")]
async fn net_task(
    net: &'static mut Net,
    routine: &'static dyn NetRoutine,
    terminate: &'static Slot<()>,
    done: &'static Slot<()>,
) {
    select(routine.run(net), ctrl_accept(terminate)).await;
    store_rc(done, ());
}
