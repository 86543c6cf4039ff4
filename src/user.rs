//! Contracts the simulator calls out to, but never implements itself.
//!
//! Three things are supplied once per run, mirroring the original's function
//! pointer typedefs: a propagation rule (`pdsns_transmission_fun`), a
//! neighbor rule (`pdsns_neighbor_fun`), and one routine each for the MAC,
//! link, and network layers (`pdsns_usr_mac_fun`/`pdsns_usr_link_fun`/
//! `pdsns_usr_net_fun`). All nodes share the same routine *values*; each
//! node's task runs it against its own layer state.
//!
//! Rust has no first-class async function pointers, so the per-layer
//! routines are trait objects returning a boxed future, the usual pattern
//! for dynamically dispatched async work.

use std::future::Future;
use std::pin::Pin;

use crate::layers::{Link, Mac, Net};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of asking where an outbound frame from `srcid` to `dstid`
/// actually lands: who else hears it (at what power), and at what power the
/// named destinations receive it. Only the destination side is consulted by
/// the radio layer; the source side exists for symmetry with the original
/// signature and for user code that wants to log full propagation spread.
pub struct Spread {
    pub sources: Vec<u64>,
    pub destinations: Vec<(u64, f64)>,
}

/// Computes how a transmission from one node to another propagates.
///
/// Supplied once per run and shared read-only across every node's radio
/// layer; must not depend on mutable simulation state beyond the topology
/// (positions, max power, sensitivity) fixed at startup, since nodes do not
/// move mid-run.
pub trait PropagationRule: Send + Sync {
    fn propagate(&self, srcid: u64, dstid: u64) -> Spread;
}

/// Computes a node's fixed neighbor table (who it can hear, and at what
/// power), invoked once per node at startup and frozen for the run.
pub trait NeighborRule: Send + Sync {
    fn neighbors(&self, node_id: u64) -> Vec<(u64, f64)>;
}

/// The user-supplied MAC-layer main routine, run once per node.
pub trait MacRoutine: Send + Sync {
    fn run<'a>(&'a self, mac: &'a mut Mac) -> BoxFuture<'a, ()>;
}

/// The user-supplied link-layer main routine, run once per node.
pub trait LinkRoutine: Send + Sync {
    fn run<'a>(&'a self, link: &'a mut Link) -> BoxFuture<'a, ()>;
}

/// The user-supplied network-layer main routine, run once per node.
pub trait NetRoutine: Send + Sync {
    fn run<'a>(&'a self, net: &'a mut Net) -> BoxFuture<'a, ()>;
}

/// Distance-threshold propagation: every node within `range` of the sender
/// hears it at a fixed power, everyone else hears nothing. Not part of the
/// core (the core takes any `PropagationRule`), but a small, realistic
/// reference implementation used by the demo binary and the end-to-end
/// tests, the way a library ships a default alongside a trait.
pub struct RangePropagation<'a> {
    pub positions: &'a [(u64, i64, i64)],
    pub range: f64,
    pub power: f64,
}

impl PropagationRule for RangePropagation<'_> {
    fn propagate(&self, srcid: u64, _dstid: u64) -> Spread {
        let Some(&(_, sx, sy)) = self.positions.iter().find(|(id, ..)| *id == srcid) else {
            return Spread {
                sources: vec![srcid],
                destinations: Vec::new(),
            };
        };
        let destinations = self
            .positions
            .iter()
            .filter(|(id, ..)| *id != srcid)
            .filter_map(|&(id, x, y)| {
                let dx = (x - sx) as f64;
                let dy = (y - sy) as f64;
                let dist = (dx * dx + dy * dy).sqrt();
                (dist <= self.range).then_some((id, self.power))
            })
            .collect();
        Spread {
            sources: vec![srcid],
            destinations,
        }
    }
}

/// Mirrors `RangePropagation`'s reach for neighbor-table construction at
/// startup.
pub struct RangeNeighbors<'a> {
    pub positions: &'a [(u64, i64, i64)],
    pub range: f64,
    pub power: f64,
}

impl NeighborRule for RangeNeighbors<'_> {
    fn neighbors(&self, node_id: u64) -> Vec<(u64, f64)> {
        let Some(&(_, sx, sy)) = self.positions.iter().find(|(id, ..)| *id == node_id) else {
            return Vec::new();
        };
        self.positions
            .iter()
            .filter(|(id, ..)| *id != node_id)
            .filter_map(|&(id, x, y)| {
                let dx = (x - sx) as f64;
                let dy = (y - sy) as f64;
                let dist = (dx * dx + dy * dy).sqrt();
                (dist <= self.range).then_some((id, self.power))
            })
            .collect()
    }
}
