use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use splitref_queue::SplitRefQueue;
use tracing::{debug, info, warn};

use crate::config::StressConfig;
use crate::error::{Result, StressError};

/// Outcome of one producer/consumer round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: u32,
    pub pushed: u64,
    pub popped: u64,
    /// Pops that found the queue empty and backed off.
    pub empty_polls: u64,
    pub reclaimed_after_join: usize,
    pub reclaimed_after_drop: usize,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub config: StressConfig,
    pub rounds: Vec<RoundReport>,
    pub elapsed_ms: f64,
}

/// Values one consumer took, in the order it took them.
struct ConsumerLog {
    values: Vec<u64>,
    empty_polls: u64,
}

/// Runs every configured round; stops at the first one that fails
/// verification.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    config.validate()?;

    let threads = config.producers + config.consumers;
    let cpus = num_cpus::get();
    if threads > cpus {
        warn!(threads, cpus, "more worker threads than CPUs, expect heavy preemption");
    }

    let started = Instant::now();
    let mut rounds = Vec::with_capacity(config.rounds as usize);
    for round in 1..=config.rounds {
        let report = run_round(config, round)?;
        info!(
            round,
            popped = report.popped,
            empty_polls = report.empty_polls,
            elapsed_ms = report.elapsed_ms,
            "round verified"
        );
        rounds.push(report);
    }

    Ok(StressReport {
        config: config.clone(),
        rounds,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

pub fn run_round(config: &StressConfig, round: u32) -> Result<RoundReport> {
    let started = Instant::now();
    let queue = Arc::new(SplitRefQueue::new());
    let reclaimed = queue.reclaim_counter();

    let producers: Vec<_> = (0..config.producers)
        .map(|index| {
            let q = queue.clone();
            let range = config.producer_range(index);
            let pause = Duration::from_millis(config.producer_pause_ms);
            thread::spawn(move || {
                for value in range {
                    q.push(value);
                    if !pause.is_zero() {
                        thread::sleep(pause);
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..config.consumers)
        .map(|index| {
            let q = queue.clone();
            let quota = config.consumer_quota(index);
            let backoff_ms = config.consumer_backoff_ms;
            let jitter = config.backoff_jitter;
            thread::spawn(move || consume(&q, quota, backoff_ms, jitter))
        })
        .collect();

    for (index, handle) in producers.into_iter().enumerate() {
        handle.join().map_err(|_| StressError::WorkerPanicked {
            role: "producer",
            index,
        })?;
    }
    let mut logs = Vec::with_capacity(config.consumers);
    for (index, handle) in consumers.into_iter().enumerate() {
        logs.push(handle.join().map_err(|_| StressError::WorkerPanicked {
            role: "consumer",
            index,
        })?);
    }

    let reclaimed_after_join = reclaimed.get();
    let popped: u64 = logs.iter().map(|l| l.values.len() as u64).sum();
    let empty_polls: u64 = logs.iter().map(|l| l.empty_polls).sum();
    debug!(round, popped, empty_polls, reclaimed_after_join, "workers joined");

    let fail = |reason: String| StressError::Verification { round, reason };

    let sequences: Vec<&[u64]> = logs.iter().map(|l| l.values.as_slice()).collect();
    verify_values(config, &sequences).map_err(fail)?;

    let total = config.total_items();
    if reclaimed_after_join as u64 != total {
        return Err(fail(format!(
            "{reclaimed_after_join} nodes reclaimed after join, expected {total}"
        )));
    }
    if queue.pop().is_some() {
        return Err(fail("queue not empty after all quotas were met".into()));
    }

    // Every worker has exited, so this is the last handle.
    drop(queue);
    let reclaimed_after_drop = reclaimed.get();
    if reclaimed_after_drop as u64 != total + 1 {
        return Err(fail(format!(
            "{reclaimed_after_drop} nodes reclaimed after drop, expected {}",
            total + 1
        )));
    }

    Ok(RoundReport {
        round,
        pushed: total,
        popped,
        empty_polls,
        reclaimed_after_join,
        reclaimed_after_drop,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

fn consume(queue: &SplitRefQueue<u64>, quota: u64, backoff_ms: u64, jitter: bool) -> ConsumerLog {
    let mut log = ConsumerLog {
        values: Vec::with_capacity(quota as usize),
        empty_polls: 0,
    };
    while (log.values.len() as u64) < quota {
        match queue.pop() {
            Some(value) => log.values.push(value),
            None => {
                log.empty_polls += 1;
                let ms = if jitter && backoff_ms > 0 {
                    fastrand::u64(0..=backoff_ms)
                } else {
                    backoff_ms
                };
                if ms == 0 {
                    thread::yield_now();
                } else {
                    thread::sleep(Duration::from_millis(ms));
                }
            }
        }
    }
    log
}

/// Checks what the consumers took against what the producers pushed:
/// same multiset, nothing twice, nothing lost, and each producer's values
/// seen in push order by every consumer.
pub fn verify_values(config: &StressConfig, sequences: &[&[u64]]) -> std::result::Result<(), String> {
    let total = config.total_items();
    let popped: u64 = sequences.iter().map(|s| s.len() as u64).sum();
    if popped != total {
        return Err(format!("popped {popped} values, pushed {total}"));
    }

    let mut seen: HashMap<u64, usize> = HashMap::with_capacity(total as usize);
    for (consumer, values) in sequences.iter().enumerate() {
        let mut last_per_producer: HashMap<u64, u64> = HashMap::new();
        for &value in values.iter() {
            if value >= total {
                return Err(format!("consumer {consumer} popped unknown value {value}"));
            }
            if let Some(first) = seen.insert(value, consumer) {
                return Err(format!(
                    "value {value} popped by consumer {first} and consumer {consumer}"
                ));
            }
            let producer = value / config.items_per_producer;
            if let Some(prev) = last_per_producer.insert(producer, value) {
                if prev > value {
                    return Err(format!(
                        "consumer {consumer} saw producer {producer} out of order: {prev} before {value}"
                    ));
                }
            }
        }
    }

    // Counts match and nothing repeats, so every pushed value was seen.
    debug_assert_eq!(seen.len() as u64, total);
    Ok(())
}
