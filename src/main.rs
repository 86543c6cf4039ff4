//! Thin CLI front end over the `pdsns` library.
//!
//! Parses `pdsns run --scene <path> --duration <ticks> [--seed <u64>]
//! [--range <f64>] [--power <f64>]`, builds a [`pdsns::RunConfig`] from the
//! parsed scene plus a small demo MAC/link/net routine triple, and calls
//! `pdsns::run`. The demo routines (flood-forward at the link layer,
//! print-on-receive at the network layer) exist only so the binary is
//! runnable end to end; they are fixtures, not part of the simulator core.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use env_logger::{Builder, Env};
use pdsns::layers::{Link, LinkAction, Mac, MacAction, Net};
use pdsns::user::{BoxFuture, LinkRoutine, MacRoutine, NetRoutine, RangeNeighbors, RangePropagation};
use pdsns::RunConfig;

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = CliOptions::parse(&args)?;

    let scene = pdsns::topology::load_scene(&opts.scene)
        .with_context(|| format!("loading scene {}", opts.scene.display()))?;
    log::info!("loaded {} node(s) from {}", scene.len(), opts.scene.display());

    let positions: &'static [(u64, i64, i64)] =
        Box::leak(scene.iter().map(|n| (n.id, n.x, n.y)).collect::<Vec<_>>().into_boxed_slice());

    let propagation: &'static dyn pdsns::user::PropagationRule = Box::leak(Box::new(RangePropagation {
        positions,
        range: opts.range,
        power: opts.power,
    }));
    let neighbors: &'static dyn pdsns::user::NeighborRule = Box::leak(Box::new(RangeNeighbors {
        positions,
        range: opts.range,
        power: opts.power,
    }));

    let sender_id = scene.first().map(|n| n.id).unwrap_or(0);
    let receiver_id = scene.get(1).map(|n| n.id).unwrap_or(sender_id);

    let mac_routine: &'static dyn MacRoutine = Box::leak(Box::new(PassThroughMac));
    let link_routine: &'static dyn LinkRoutine = Box::leak(Box::new(ForwardingLink { sender_id }));
    let net_routine: &'static dyn NetRoutine = Box::leak(Box::new(PrintOnReceiveNet {
        sender_id,
        receiver_id,
        payload: b"hello".to_vec(),
    }));

    let config = RunConfig {
        run_seed: opts.seed,
        duration: opts.duration,
        scene,
        propagation,
        neighbors,
        mac_routine,
        link_routine,
        net_routine,
    };

    pdsns::run(config).context("simulation run failed")?;
    Ok(())
}

struct CliOptions {
    scene: PathBuf,
    duration: u64,
    seed: u64,
    range: f64,
    power: f64,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(("run", rest)) = args.split_first().map(|(c, r)| (c.as_str(), r)) else {
            bail!("usage: pdsns run --scene <path> --duration <ticks> [--seed <u64>] [--range <f64>] [--power <f64>]");
        };

        let mut scene = None;
        let mut duration = None;
        let mut seed = 1u64;
        let mut range = 10.0;
        let mut power = 1.0;

        let mut iter = rest.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .with_context(|| format!("flag `{flag}` is missing its value"))?;
            match flag.as_str() {
                "--scene" => scene = Some(PathBuf::from(value)),
                "--duration" => duration = Some(value.parse().context("`--duration` must be a non-negative integer")?),
                "--seed" => seed = value.parse().context("`--seed` must be an integer")?,
                "--range" => range = value.parse().context("`--range` must be a number")?,
                "--power" => power = value.parse().context("`--power` must be a number")?,
                other => bail!("unrecognized flag `{other}`"),
            }
        }

        Ok(Self {
            scene: scene.context("missing required `--scene <path>`")?,
            duration: duration.context("missing required `--duration <ticks>`")?,
            seed,
            range,
            power,
        })
    }
}

/// Services the MAC layer's own slot with no logic of its own: hands outbound
/// frames to the radio and delivered frames up to the LLC.
struct PassThroughMac;

impl MacRoutine for PassThroughMac {
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

/// Drains any frame addressed to this node up to the network layer;
/// forwards anything else on towards its destination. `sender_id`'s own link
/// never calls `recv`, so its single demo send can never race against an
/// outstanding pass to the LLC (see SPEC_FULL §4.4's pass/abandon rule).
struct ForwardingLink {
    sender_id: u64,
}

const FOREVER_TICKS: u64 = 1_000_000;

impl LinkRoutine for ForwardingLink {
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
                        Ok(frame) => {
                            let _ = link.send_nonblocking_noack(frame).await;
                        }
                        Err(_) => {}
                    }
                }
            }
        })
    }
}

/// `sender_id` sends `payload` to `receiver_id` once at startup, retrying a
/// bounded number of times if the link is transiently busy; every node logs
/// whatever it receives.
struct PrintOnReceiveNet {
    sender_id: u64,
    receiver_id: u64,
    payload: Vec<u8>,
}

impl NetRoutine for PrintOnReceiveNet {
    fn run<'a>(&'a self, net: &'a mut Net) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if net.node_id == self.sender_id && self.sender_id != self.receiver_id {
                let mut delivered = false;
                for _ in 0..16 {
                    if net.send(self.receiver_id, self.payload.clone()).await.is_ok() {
                        delivered = true;
                        break;
                    }
                    net.sleep(1).await;
                }
                if !delivered {
                    log::warn!(
                        "node {}: failed to deliver initial message to node {}",
                        net.node_id,
                        self.receiver_id
                    );
                }
            }

            loop {
                match net.recv().await {
                    Ok(frame) => log::info!(
                        "node {}: received {} byte(s) from node {}",
                        net.node_id,
                        frame.data.len(),
                        frame.srcid
                    ),
                    Err(e) => log::warn!("node {}: recv failed: {e}", net.node_id),
                }
            }
        })
    }
}
