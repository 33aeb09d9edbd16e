/*!
 * Synchro Demo - Main Entry Point
 *
 * Runs a deliberately deadlocking program on monitored semaphores:
 * - two workers take two resources in opposite order
 * - a stall watchdog notices both are blocked
 * - free mode drains the semaphores and the program terminates
 *
 * An optional first argument names a JSON delay configuration file.
 */

use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use synchro::{
    init_tracing, sleep_micros, Coordinator, DelayConfig, Semaphore, StallWatchdog, ThreadHandle,
};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => DelayConfig::from_file(path)?,
        None => DelayConfig::from_env(),
    };
    info!(config = ?config, "starting deadlock demo");

    let coordinator = Arc::new(Coordinator::with_config(config));
    let watchdog = Arc::new(StallWatchdog::new(&coordinator, 2));
    coordinator.set_watchdog(watchdog.clone());

    let left = Arc::new(Semaphore::with_coordinator(1, true, coordinator.clone()));
    let right = Arc::new(Semaphore::with_coordinator(1, true, coordinator.clone()));

    let workers = [("alice", left.clone(), right.clone()), ("bob", right, left)]
        .into_iter()
        .map(|(name, first, second)| {
            ThreadHandle::builder()
                .name(name)
                .coordinator(coordinator.clone())
                .spawn(move || {
                    first.acquire();
                    info!(worker = name, "holding first resource");
                    sleep_micros(20_000);
                    second.acquire();
                    info!(worker = name, "holding both resources");
                    second.release();
                    first.release();
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for worker in workers {
        worker.join()?;
    }

    info!(
        drained = watchdog.has_fired(),
        peak_blocked = watchdog.peak(),
        "demo finished"
    );
    let stats = serde_json::to_string_pretty(&coordinator.stats()).into_diagnostic()?;
    println!("{}", stats);
    Ok(())
}
