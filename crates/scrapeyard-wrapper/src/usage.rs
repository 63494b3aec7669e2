// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource usage of a stage.
//!
//! Network traffic is measured from the host-wide interface counters, so the
//! wrapper's own event uploads are counted too and have to be subtracted.
//! CPU time and peak RSS come from `getrusage(RUSAGE_CHILDREN)`, which covers
//! every child the wrapper has reaped so far. Peak RSS is therefore the
//! largest of all stages up to and including the current one.

use std::time::{Duration, Instant};

use nix::sys::resource::{UsageWho, getrusage};
use nix::sys::time::TimeVal;
use scrapeyard_protocol::Usage;
use sysinfo::Networks;
use tracing::debug;

/// Byte totals summed over every network interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    /// Total bytes received.
    pub received: u64,
    /// Total bytes transmitted.
    pub transmitted: u64,
}

impl NetworkCounters {
    /// Read the current totals.
    pub fn snapshot() -> Self {
        let networks = Networks::new_with_refreshed_list();
        networks
            .list()
            .values()
            .fold(Self::default(), |acc, data| Self {
                received: acc.received.saturating_add(data.total_received()),
                transmitted: acc.transmitted.saturating_add(data.total_transmitted()),
            })
    }
}

/// Resources consumed by reaped children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildUsage {
    /// User plus system CPU time.
    pub cpu_time: Duration,
    /// Peak resident set size in bytes.
    pub max_rss: u64,
}

impl ChildUsage {
    /// Read the current totals. Zero when the OS does not report them.
    pub fn snapshot() -> Self {
        match getrusage(UsageWho::RUSAGE_CHILDREN) {
            Ok(usage) => Self {
                cpu_time: duration(usage.user_time()) + duration(usage.system_time()),
                // Linux reports kilobytes
                max_rss: u64::try_from(usage.max_rss()).unwrap_or(0) * 1024,
            },
            Err(e) => {
                debug!(error = %e, "getrusage unavailable");
                Self::default()
            }
        }
    }
}

fn duration(tv: TimeVal) -> Duration {
    let secs = u64::try_from(tv.tv_sec()).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec()).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

/// Counters taken at one instant.
#[derive(Debug, Clone, Copy)]
pub struct UsageSnapshot {
    /// Network totals.
    pub network: NetworkCounters,
    /// Child resource totals.
    pub children: ChildUsage,
}

impl UsageSnapshot {
    /// Read every counter now.
    pub fn take() -> Self {
        Self {
            network: NetworkCounters::snapshot(),
            children: ChildUsage::snapshot(),
        }
    }
}

/// Usage between two snapshots, excluding `own_bytes` of outbound traffic
/// the wrapper generated itself.
pub fn usage_between(
    start: &UsageSnapshot,
    end: &UsageSnapshot,
    wall_time: Duration,
    own_bytes: u64,
) -> Usage {
    let sent = end
        .network
        .transmitted
        .saturating_sub(start.network.transmitted);
    let cpu = end
        .children
        .cpu_time
        .saturating_sub(start.children.cpu_time);

    Usage {
        max_rss: end.children.max_rss,
        network_in: end.network.received.saturating_sub(start.network.received),
        network_out: sent.saturating_sub(own_bytes),
        wall_time: Some(wall_time.as_secs_f64()),
        cpu_time: Some(cpu.as_secs_f64()),
    }
}

/// Measures one stage from construction to [`StageMeter::finish`].
#[derive(Debug)]
pub struct StageMeter {
    started: Instant,
    start: UsageSnapshot,
}

impl StageMeter {
    /// Snapshot the counters and start the clock.
    pub fn start() -> Self {
        Self {
            start: UsageSnapshot::take(),
            started: Instant::now(),
        }
    }

    /// Snapshot again and compute the stage's usage.
    pub fn finish(self, own_bytes: u64) -> Usage {
        let wall_time = self.started.elapsed();
        usage_between(&self.start, &UsageSnapshot::take(), wall_time, own_bytes)
    }
}
