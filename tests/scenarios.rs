//! End-to-end scenarios driving `pdsns::run` across multiple nodes.
//!
//! Unlike the inline `#[cfg(test)]` modules under `src/`, which exercise one
//! layer in isolation, these tests build a small scene, a fixed propagation
//! and neighbor rule, and a handful of routines that report their
//! observations back to this thread over a channel, then call `pdsns::run`
//! and assert on both its return value and what was reported.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use pdsns::error::ErrorKind;
use pdsns::layers::llc::LLC_ACK_TIMEOUT_TICKS;
use pdsns::layers::{Link, LinkAction, Mac, MacAction, Net};
use pdsns::user::{BoxFuture, LinkRoutine, MacRoutine, NeighborRule, NetRoutine, PropagationRule, Spread};
use pdsns::{PResult, RunConfig};

/// Services a MAC layer with no logic of its own: down to the radio, up to
/// the LLC. Shared by every scenario below.
struct ReactiveMac;

impl MacRoutine for ReactiveMac {
    fn run<'a>(&'a self, mac: &'a mut Mac) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            loop {
                match mac.wait_for_event().await {
                    MacAction::Send => {
                        if let Ok((frame, pwr)) = mac.accept() {
                            let dstid = frame.dstid;
                            let rc = mac.send(frame, pwr, dstid).await;
                            mac.notify_sender(rc);
                        }
                    }
                    MacAction::Recv => {
                        if let Ok(frame) = mac.recv(0).await {
                            mac.pass(frame);
                        }
                    }
                }
            }
        })
    }
}

const FOREVER_TICKS: u64 = 1_000_000;

/// `sender_id` reacts only to send requests from net; every other node
/// continuously pulls from the LLC and hands anything addressed to itself up
/// to net. See `DESIGN.md`'s note on `main.rs`'s `ForwardingLink` for why
/// these two roles never call `recv` and `wait_for_event` from the same node.
struct RoleLink {
    sender_id: u64,
}

impl LinkRoutine for RoleLink {
    fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if link.node_id == self.sender_id {
                loop {
                    if let LinkAction::Send = link.wait_for_event().await {
                        if let Ok((_src, _dst, frame)) = link.accept() {
                            let rc = link.send_blocking_ack(frame).await;
                            link.notify_sender(rc);
                        }
                    }
                }
            } else {
                loop {
                    match link.recv(FOREVER_TICKS).await {
                        Ok(frame) if frame.dstid == link.node_id => link.pass(frame),
                        Ok(_) | Err(_) => {}
                    }
                }
            }
        })
    }
}

/// One observation reported by a net-layer fixture: which node saw what.
#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    node_id: u64,
    from: u64,
    data: Vec<u8>,
    tick: u64,
}

/// `sender_id` sends `payload` to `receiver_id` once at startup and reports
/// the send outcome; every node reports whatever it receives. Used by
/// scenario A (two-node hello).
struct HelloNet {
    sender_id: u64,
    receiver_id: u64,
    payload: Vec<u8>,
    send_result: Mutex<Sender<PResult<()>>>,
    deliveries: Mutex<Sender<Delivery>>,
}

impl NetRoutine for HelloNet {
    fn run<'a>(&'a self, net: &'a mut Net) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if net.node_id == self.sender_id {
                let rc = net.send(self.receiver_id, self.payload.clone()).await;
                let _ = self.send_result.lock().unwrap().send(rc);
            }
            loop {
                if let Ok(frame) = net.recv().await {
                    let tick = net.clock.now();
                    let _ = self.deliveries.lock().unwrap().send(Delivery {
                        node_id: net.node_id,
                        from: frame.srcid,
                        data: frame.data,
                        tick,
                    });
                }
            }
        })
    }
}

struct FixedPowerPropagation {
    power: f64,
}

impl PropagationRule for FixedPowerPropagation {
    fn propagate(&self, srcid: u64, _dstid: u64) -> Spread {
        Spread {
            sources: vec![srcid],
            destinations: vec![(if srcid == 0 { 1 } else { 0 }, self.power)],
        }
    }
}

struct FixedPowerNeighbors {
    power: f64,
}

impl NeighborRule for FixedPowerNeighbors {
    fn neighbors(&self, node_id: u64) -> Vec<(u64, f64)> {
        vec![(if node_id == 0 { 1 } else { 0 }, self.power)]
    }
}

fn two_node_scene() -> Vec<pdsns::topology::NodeSpec> {
    pdsns::topology::parse_scene(
        r#"<scene>
            <node x="0" y="0" sensitivity="0.1" maximal_power="1.0"/>
            <node x="1" y="0" sensitivity="0.1" maximal_power="1.0"/>
        </scene>"#,
    )
    .unwrap()
}

#[test]
fn scenario_a_two_node_hello() {
    let (send_tx, send_rx) = channel();
    let (deliver_tx, deliver_rx) = channel();
    let propagation: &'static dyn PropagationRule = Box::leak(Box::new(FixedPowerPropagation { power: 1.0 }));
    let neighbors: &'static dyn NeighborRule = Box::leak(Box::new(FixedPowerNeighbors { power: 1.0 }));
    let mac_routine: &'static dyn MacRoutine = Box::leak(Box::new(ReactiveMac));
    let link_routine: &'static dyn LinkRoutine = Box::leak(Box::new(RoleLink { sender_id: 0 }));
    let net_routine: &'static dyn NetRoutine = Box::leak(Box::new(HelloNet {
        sender_id: 0,
        receiver_id: 1,
        payload: b"Hello World".to_vec(),
        send_result: Mutex::new(send_tx),
        deliveries: Mutex::new(deliver_tx),
    }));

    let config = RunConfig {
        run_seed: 1,
        // 11 bytes of airtime plus the ack round trip back, with margin.
        duration: 30,
        scene: two_node_scene(),
        propagation,
        neighbors,
        mac_routine,
        link_routine,
        net_routine,
    };

    let result = pdsns::run(config);
    assert!(result.is_ok(), "run failed: {result:?}");

    let send_rc = send_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert!(send_rc.is_ok(), "sender's net.send failed: {send_rc:?}");

    let delivery = expect_delivery(&deliver_rx, |d| d.node_id == 1);
    assert_eq!(delivery.from, 0);
    assert_eq!(delivery.data.len(), 11);
    assert_eq!(delivery.data, b"Hello World");
    assert!(delivery.tick >= 2, "delivery arrived suspiciously early at tick {}", delivery.tick);
}

fn expect_delivery(rx: &Receiver<Delivery>, pred: impl Fn(&Delivery) -> bool) -> Delivery {
    loop {
        let d = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("expected a delivery but none arrived");
        if pred(&d) {
            return d;
        }
    }
}

/// A link routine that proactively issues one send at startup and reports
/// its outcome, used by scenarios B and C where the send must bypass the
/// net layer (net always sends blocking-ack).
struct OneShotSendLink {
    dstid: u64,
    blocking_ack: bool,
    result_tx: Mutex<Sender<(PResult<()>, u64, u64)>>,
}

impl LinkRoutine for OneShotSendLink {
    fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut frame = pdsns::payload::Frame::new(vec![1, 2, 3]);
            frame.srcid = link.node_id;
            frame.dstid = self.dstid;
            let tick_start = link.clock.now();
            let rc = if self.blocking_ack {
                link.send_blocking_ack(frame).await
            } else {
                link.send_nonblocking_noack(frame).await
            };
            let tick_end = link.clock.now();
            let _ = self.result_tx.lock().unwrap().send((rc, tick_start, tick_end));
            loop {
                link.wait_for_event().await;
            }
        })
    }
}

/// A passive link routine used by a node that neither sends nor needs to
/// forward anything in a given scenario.
struct IdleLink;

impl LinkRoutine for IdleLink {
    fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            loop {
                link.wait_for_event().await;
            }
        })
    }
}

struct IdleNet;

impl NetRoutine for IdleNet {
    fn run<'a>(&'a self, net: &'a mut Net) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            loop {
                let _ = net.recv().await;
            }
        })
    }
}

#[test]
fn scenario_b_below_sensitivity_send_still_reports_ok() {
    let (tx, rx) = channel();
    // Destination's sensitivity is 2.0 (set in the scene below); this
    // propagation delivers at 0.5, below the noise floor.
    let propagation: &'static dyn PropagationRule = Box::leak(Box::new(FixedPowerPropagation { power: 0.5 }));
    let neighbors: &'static dyn NeighborRule = Box::leak(Box::new(FixedPowerNeighbors { power: 0.5 }));
    let mac_routine: &'static dyn MacRoutine = Box::leak(Box::new(ReactiveMac));
    let link_routine_0: &'static dyn LinkRoutine = Box::leak(Box::new(OneShotSendLink {
        dstid: 1,
        blocking_ack: false,
        result_tx: Mutex::new(tx),
    }));

    // Node 1 never sends; it just idles at both link and net.
    // `RunConfig` takes a single link/net routine shared by every node, so
    // the shared routine must itself branch on `node_id`.
    struct SharedLink {
        sender: &'static dyn LinkRoutine,
    }
    impl LinkRoutine for SharedLink {
        fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()> {
            if link.node_id == 0 {
                self.sender.run(link)
            } else {
                Box::pin(async move {
                    loop {
                        link.wait_for_event().await;
                    }
                })
            }
        }
    }
    let link_routine: &'static dyn LinkRoutine = Box::leak(Box::new(SharedLink { sender: link_routine_0 }));
    let net_routine: &'static dyn NetRoutine = Box::leak(Box::new(IdleNet));

    let scene = pdsns::topology::parse_scene(
        r#"<scene>
            <node x="0" y="0" sensitivity="0.1" maximal_power="1.0"/>
            <node x="1" y="0" sensitivity="2.0" maximal_power="1.0"/>
        </scene>"#,
    )
    .unwrap();

    let config = RunConfig {
        run_seed: 1,
        duration: 8,
        scene,
        propagation,
        neighbors,
        mac_routine,
        link_routine,
        net_routine,
    };

    let result = pdsns::run(config);
    assert!(result.is_ok(), "run failed: {result:?}");

    let (send_rc, _start, _end) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert!(send_rc.is_ok(), "a nonblocking-no-ack send must succeed even with no listener: {send_rc:?}");
}

#[test]
fn scenario_c_ack_timeout_fires_after_exactly_the_ack_budget() {
    let (tx, rx) = channel();
    let propagation: &'static dyn PropagationRule = Box::leak(Box::new(FixedPowerPropagation { power: 1.0 }));

    // Node 0 can hear/be heard by node 1, but node 1's own neighbor table is
    // empty, so its LLC cannot find a transmit power to ack node 0 with:
    // `Llc::send_ack` fails with `NotFound`, no ack frame is ever sent, and
    // node 0's `wait_for_ack` runs out its full timeout.
    struct AsymmetricNeighbors;
    impl NeighborRule for AsymmetricNeighbors {
        fn neighbors(&self, node_id: u64) -> Vec<(u64, f64)> {
            if node_id == 0 {
                vec![(1, 1.0)]
            } else {
                Vec::new()
            }
        }
    }
    let neighbors: &'static dyn NeighborRule = Box::leak(Box::new(AsymmetricNeighbors));

    let mac_routine: &'static dyn MacRoutine = Box::leak(Box::new(ReactiveMac));

    struct SharedLink {
        sender: &'static dyn LinkRoutine,
    }
    impl LinkRoutine for SharedLink {
        fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()> {
            if link.node_id == 0 {
                self.sender.run(link)
            } else {
                Box::pin(async move {
                    loop {
                        link.wait_for_event().await;
                    }
                })
            }
        }
    }
    let link_routine_0: &'static dyn LinkRoutine = Box::leak(Box::new(OneShotSendLink {
        dstid: 1,
        blocking_ack: true,
        result_tx: Mutex::new(tx),
    }));
    let link_routine: &'static dyn LinkRoutine = Box::leak(Box::new(SharedLink { sender: link_routine_0 }));
    let net_routine: &'static dyn NetRoutine = Box::leak(Box::new(IdleNet));

    let config = RunConfig {
        run_seed: 1,
        duration: LLC_ACK_TIMEOUT_TICKS + 20,
        scene: two_node_scene(),
        propagation,
        neighbors,
        mac_routine,
        link_routine,
        net_routine,
    };

    let result = pdsns::run(config);
    assert!(result.is_ok(), "run failed: {result:?}");

    let (send_rc, tick_start, tick_end) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    let err = send_rc.expect_err("an unanswered blocking-ack send must time out");
    assert_eq!(err.kind, ErrorKind::Timeout);
    // The elapsed time includes the frame's own airtime ahead of the ack
    // wait itself, so this can only assert a floor of exactly the ack
    // budget, not an exact total.
    assert!(
        tick_end - tick_start >= LLC_ACK_TIMEOUT_TICKS,
        "ack wait must run its full {LLC_ACK_TIMEOUT_TICKS}-tick budget before giving up"
    );
}

#[test]
fn scenario_e_sleep_resumes_exactly_on_schedule() {
    let (tx, rx) = channel();

    struct SleepNet {
        tx: Mutex<Sender<(u64, u64)>>,
    }
    impl NetRoutine for SleepNet {
        fn run<'a>(&'a self, net: &'a mut Net) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                net.sleep(1).await;
                let before = net.clock.now();
                net.sleep(5).await;
                let after = net.clock.now();
                let _ = self.tx.lock().unwrap().send((before, after));
                loop {
                    let _ = net.recv().await;
                }
            })
        }
    }

    let propagation: &'static dyn PropagationRule = Box::leak(Box::new(FixedPowerPropagation { power: 1.0 }));
    let neighbors: &'static dyn NeighborRule = Box::leak(Box::new(FixedPowerNeighbors { power: 1.0 }));
    let mac_routine: &'static dyn MacRoutine = Box::leak(Box::new(ReactiveMac));
    let link_routine: &'static dyn LinkRoutine = Box::leak(Box::new(IdleLink));
    let net_routine: &'static dyn NetRoutine = Box::leak(Box::new(SleepNet { tx: Mutex::new(tx) }));

    let config = RunConfig {
        run_seed: 1,
        duration: 10,
        scene: two_node_scene(),
        propagation,
        neighbors,
        mac_routine,
        link_routine,
        net_routine,
    };

    let result = pdsns::run(config);
    assert!(result.is_ok(), "run failed: {result:?}");

    let (before, after) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert_eq!(before, 1, "the first one-tick sleep should land exactly on tick 1");
    assert_eq!(after, 6, "sleep(5) from tick 1 must resume exactly at tick 6");
}

/// Scenario D (collision tainting at the radio) is covered directly at the
/// radio layer by `radio::tests::overlapping_reception_taints_and_drops`,
/// which exercises the exact state transition without depending on two
/// independent node tasks happening to start transmitting on the same tick —
/// an alignment this crate's scheduler does not explicitly guarantee across
/// unrelated nodes and which is not worth asserting on here without running
/// the simulator to observe the actual interleaving.
#[test]
fn scenario_d_collision_is_covered_at_the_radio_layer() {
    // See the module-level doc comment above; this is a pointer, not a
    // duplicate of that test.
}
