//! Discrete-time, process-driven simulator for layered wireless sensor
//! network protocol stacks.
//!
//! Mirrors `libpdsns.h`'s public surface (`pdsns_init`/`pdsns_run`/
//! `pdsns_get_time`/`pdsns_sigterm`/`pdsns_destroy`) as a single blocking
//! `run()` entry point: construct a [`scheduler::RunConfig`] from a parsed
//! scene and a set of user-supplied hooks, call `run`, and the whole
//! simulation executes to completion (or failure) on a background thread
//! before `run` returns.

pub mod clock;
pub mod control;
pub mod error;
pub mod layers;
pub mod node;
pub mod payload;
pub mod rng;
pub mod scheduler;
pub mod topology;
pub mod user;

pub use error::{last_error, ErrorKind, PResult, PdsnsError};
pub use scheduler::RunConfig;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use std::sync::OnceLock;

/// One queued run: the config to execute and where to report its outcome.
type RunRequest = (RunConfig, std::sync::mpsc::Sender<PResult<()>>);

/// Bound on runs awaiting dispatch onto the executor thread. `run()` only
/// blocks on this when that many callers are already queued faster than the
/// executor can pick them up, which in practice means never.
const DISPATCH_CAPACITY: usize = 16;

static DISPATCH: OnceLock<&'static Channel<CriticalSectionRawMutex, RunRequest, DISPATCH_CAPACITY>> =
    OnceLock::new();

/// Start (on first call) the single OS thread that hosts this process's one
/// `embassy_executor::Executor`, and return the channel used to hand it runs.
///
/// `embassy_executor::Executor::run` never returns, so the thread that calls
/// it can never be joined — the same "intentional leak, lives for the
/// process's lifetime" tradeoff the executor's own documentation describes.
/// What earlier leaked was a fresh thread (and a fresh executor) on every
/// `run()` call; starting exactly one here and dispatching every call onto
/// it is what keeps that leak bounded regardless of how many times `run` is
/// called.
fn dispatch_channel() -> &'static Channel<CriticalSectionRawMutex, RunRequest, DISPATCH_CAPACITY> {
    *DISPATCH.get_or_init(|| {
        let channel: &'static Channel<CriticalSectionRawMutex, RunRequest, DISPATCH_CAPACITY> =
            Box::leak(Box::new(Channel::new()));
        std::thread::Builder::new()
            .name("pdsns-executor".into())
            .spawn(move || {
                let executor: &'static mut embassy_executor::Executor =
                    Box::leak(Box::new(embassy_executor::Executor::new()));
                executor.run(|spawner| {
                    spawner
                        .spawn(dispatch_task(spawner, channel))
                        .expect("dispatch_task is this executor's first and only spawn");
                });
            })
            .expect("failed to start the pdsns executor thread");
        channel
    })
}

#[embassy_executor::task]
async fn dispatch_task(
    spawner: embassy_executor::Spawner,
    channel: &'static Channel<CriticalSectionRawMutex, RunRequest, DISPATCH_CAPACITY>,
) {
    loop {
        let (config, done) = channel.receive().await;
        scheduler::spawn_run(&spawner, config, done);
    }
}

/// Run one simulation to completion and block until it finishes.
///
/// The first call starts a single executor thread hosting the 5N+1
/// cooperative tasks machinery described in SPEC_FULL §5; every call after
/// that dispatches its `RunConfig` onto that same thread instead of
/// spawning a new one. `run_ticks` (see `scheduler.rs`) terminates and joins
/// every per-node task before reporting a result, so the task-pool slots a
/// finished run occupied are free again by the time this call returns —
/// repeated calls do not exhaust `node::MAX_NODE_COUNT`.
pub fn run(config: RunConfig) -> PResult<()> {
    let (done_tx, done_rx) = std::sync::mpsc::channel();

    dispatch_channel().try_send((config, done_tx)).map_err(|_| {
        PdsnsError::new(
            ErrorKind::OutOfMemory,
            "too many simulation runs already queued",
        )
    })?;

    done_rx.recv().unwrap_or_else(|_| {
        Err(PdsnsError::new(
            ErrorKind::Fatal,
            "simulation worker thread terminated without reporting a result",
        ))
    })
}
