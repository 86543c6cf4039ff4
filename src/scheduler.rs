//! The global tick loop: propagation fan-out, timer firing, queue swap.
//!
//! Grounded on `pdsns_run`'s main loop (`libpdsns.c`, lines ~4700-4896): drain
//! `now`, deliver START_RECEIVING/STOP_RECEIVING to destinations, fire due
//! timers, swap `now`/`next`, advance the clock, repeat until the configured
//! duration is exceeded.

use embassy_executor::Spawner;

use crate::clock::Clock;
use crate::control::{ctrl_accept, event_accept, store_rc};
use crate::error::{ErrorKind, PResult, PdsnsError};
use crate::layers::radio::RadioEvent;
use crate::node::{self, Node};
use crate::user::{LinkRoutine, MacRoutine, NeighborRule, NetRoutine, PropagationRule};

/// Everything one run needs, gathered before any node is constructed.
pub struct RunConfig {
    pub run_seed: u64,
    pub duration: u64,
    pub scene: Vec<crate::topology::NodeSpec>,
    pub propagation: &'static dyn PropagationRule,
    pub neighbors: &'static dyn NeighborRule,
    pub mac_routine: &'static dyn MacRoutine,
    pub link_routine: &'static dyn LinkRoutine,
    pub net_routine: &'static dyn NetRoutine,
}

/// Build every node, spawn the driver task, and report the outcome on
/// `done` once the tick loop finishes (and every per-node task has actually
/// exited — see `run_ticks`). Runs inside the closure Embassy hands an
/// `executor.run()` call, so it is synchronous: it only needs to spawn,
/// never to await.
///
/// A node that fails to build (its per-layer task pool exhausted, see
/// `node::MAX_NODE_COUNT`) reports that failure on `done` immediately and
/// the run never starts; nodes already spawned before the failure are left
/// running rather than torn down, since tearing them down would itself need
/// the driver task this function hasn't spawned yet to deliver termination.
pub fn spawn_run(spawner: &Spawner, cfg: RunConfig, done: std::sync::mpsc::Sender<PResult<()>>) {
    let clock: &'static Clock = Box::leak(Box::new(Clock::new()));

    let mut nodes = Vec::with_capacity(cfg.scene.len());
    for spec in &cfg.scene {
        let neighbors = cfg.neighbors.neighbors(spec.id);
        let built = node::build_and_spawn(
            spawner,
            cfg.run_seed,
            spec.id,
            spec.x,
            spec.y,
            spec.sensitivity,
            spec.maximal_power,
            neighbors,
            cfg.propagation,
            cfg.mac_routine,
            cfg.link_routine,
            cfg.net_routine,
            clock,
        );
        match built {
            Ok(node) => nodes.push(node),
            Err(e) => {
                let _ = done.send(Err(e));
                return;
            }
        }
    }
    let nodes: &'static [Node] = Box::leak(nodes.into_boxed_slice());

    if let Err(e) = spawner.spawn(driver_task(nodes, clock, cfg.duration, done.clone())) {
        let _ = done.send(Err(PdsnsError::new(
            ErrorKind::OutOfMemory,
            format!("failed to spawn the scheduler's driver task ({e:?})"),
        )));
    }
}

#[embassy_executor::task]
async fn driver_task(
    nodes: &'static [Node],
    clock: &'static Clock,
    duration: u64,
    done: std::sync::mpsc::Sender<PResult<()>>,
) {
    let result = run_ticks(nodes, clock, duration).await;
    let _ = done.send(result);
}

/// Run the tick loop to completion, then terminate and join every per-node
/// task before returning, so the task-pool slots they occupy (§4.7,
/// `node::MAX_NODE_COUNT`) are free again for a later `run()` call.
async fn run_ticks(nodes: &'static [Node], clock: &'static Clock, duration: u64) -> PResult<()> {
    loop {
        if clock.now() > duration {
            clock.terminate();
            for node in nodes {
                node.request_terminate();
            }
            for node in nodes {
                node.join().await;
            }
            return Ok(());
        }

        let work = clock.begin_tick();

        for start in &work.starting {
            for &(dstid, power) in &start.destinations {
                if let Some(node) = nodes.get(dstid as usize) {
                    event_accept(
                        node.radio_event_slot,
                        RadioEvent::StartReceiving {
                            power,
                            frame: start.frame.clone(),
                        },
                    );
                    ctrl_accept(node.driver_ack).await;
                }
            }
        }

        for stop in &work.expiring {
            for &(dstid, _power) in &stop.destinations {
                if let Some(node) = nodes.get(dstid as usize) {
                    event_accept(node.radio_event_slot, RadioEvent::StopReceiving);
                    ctrl_accept(node.driver_ack).await;
                }
            }
            // Tell each source's own radio its transmission has completed,
            // so a blocked `mac.send()` finally sees its outcome (§4.2). Not
            // acked: unlike the destination fan-out above, nothing later in
            // this same tick depends on the sender having processed it yet.
            for &srcid in &stop.sources {
                if let Some(node) = nodes.get(srcid as usize) {
                    event_accept(node.radio_event_slot, RadioEvent::StopTransmitting);
                }
            }
        }

        // Timer wakes are terminal (they resume exactly one blocked select),
        // unlike the radio fan-out above which can itself enqueue further
        // transmissions; no per-waiter ack round-trip is needed to keep
        // delivery deterministic tick-to-tick.
        for waiter in &work.due_waiters {
            store_rc(waiter, ());
        }

        clock.end_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeSpec;
    use crate::user::{BoxFuture, RangeNeighbors, RangePropagation};

    struct Silent;
    impl MacRoutine for Silent {
        fn run<'a>(&'a self, mac: &'a mut crate::layers::Mac) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                loop {
                    mac.wait_for_event().await;
                }
            })
        }
    }
    impl LinkRoutine for Silent {
        fn run<'a>(&'a self, link: &'a mut crate::layers::Link) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                loop {
                    link.wait_for_event().await;
                }
            })
        }
    }
    impl NetRoutine for Silent {
        fn run<'a>(&'a self, net: &'a mut crate::layers::Net) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                loop {
                    let _ = net.recv().await;
                }
            })
        }
    }

    #[test]
    fn run_config_accepts_an_empty_scene() {
        // Exercises wiring only: `spawn_run` with zero nodes must not panic
        // when the driver task finds no destinations to fan out to.
        let positions: &'static [(u64, i64, i64)] = Box::leak(Box::new([]));
        let propagation: &'static dyn PropagationRule = Box::leak(Box::new(RangePropagation {
            positions,
            range: 1.0,
            power: 1.0,
        }));
        let neighbors: &'static dyn NeighborRule = Box::leak(Box::new(RangeNeighbors {
            positions,
            range: 1.0,
            power: 1.0,
        }));
        let silent: &'static Silent = Box::leak(Box::new(Silent));
        let cfg = RunConfig {
            run_seed: 1,
            duration: 0,
            scene: Vec::<NodeSpec>::new(),
            propagation,
            neighbors,
            mac_routine: silent,
            link_routine: silent,
            net_routine: silent,
        };
        assert_eq!(cfg.scene.len(), 0);
    }

    #[test]
    fn duration_zero_runs_exactly_one_tick_and_stops() {
        // Tick 0 still runs its body (nothing queued can complete within it,
        // since every transmission needs at least one further tick to start
        // and another to expire); the loop then sees `now() > duration` and
        // returns without ever reaching tick 1.
        let clock: &'static Clock = Box::leak(Box::new(Clock::new()));
        embassy_futures::block_on(run_ticks(&[], clock, 0)).unwrap();
        assert_eq!(clock.now(), 1);
    }
}
