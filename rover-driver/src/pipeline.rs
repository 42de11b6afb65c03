//! Sensing and actuation threads.
//!
//! The sensing thread owns the decoder, the aggregator and the decision
//! engine. The actuation thread owns the rover link. The only thing they
//! share is the latest-wins command slot.

use crate::actuator::write_command;
use crate::aggregator::{Aggregate, PointAggregator};
use crate::channel::{latest, LatestReceiver, LatestSender, Received};
use crate::config::RoverConfig;
use crate::constants::READ_CHUNK_SIZE;
use crate::decision::{Decision, DecisionEngine};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::RoverError;
use crate::margin::safety_margin;
use crate::serial::read_available;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use crossbeam_utils::Backoff;
use rover_data::Command;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Decoder → aggregator → margin → decision, driven by incoming bytes.
pub struct SensingPipeline {
    config: Arc<RoverConfig>,
    decoder: FrameDecoder,
    aggregator: PointAggregator,
    engine: DecisionEngine,
    last_activity: Instant,
}

impl SensingPipeline {
    pub fn new(config: Arc<RoverConfig>) -> SensingPipeline {
        SensingPipeline {
            decoder: FrameDecoder::new(config.layout.clone(), config.pipeline.max_distance_mm),
            aggregator: PointAggregator::new(config.aggregation),
            engine: DecisionEngine::new(config.decision.clone()),
            last_activity: Instant::now(),
            config,
        }
    }

    /// Feeds raw sensor bytes and reports every decision they complete.
    pub fn process(&mut self, bytes: &[u8], mut on_decision: impl FnMut(Decision)) {
        self.decoder.feed(bytes);
        for result in self.decoder.frames() {
            let frame = match result {
                Ok(frame) => frame,
                Err(e) => {
                    trace!("Dropped candidate packet: {e}");
                    continue;
                }
            };
            self.last_activity = Instant::now();
            if self.aggregator.push(frame) {
                let aggregate = self.aggregator.drain(&self.config.sectors);
                on_decision(decide(&mut self.engine, &self.config, &aggregate));
            }
        }
    }

    /// Runs a cycle on an empty sector map when no frame arrived for a whole cycle.
    pub fn poll_stall(&mut self) -> Option<Decision> {
        if self.last_activity.elapsed() < self.config.pipeline.cycle_timeout() {
            return None;
        }
        self.last_activity = Instant::now();
        Some(decide(&mut self.engine, &self.config, &Aggregate::empty()))
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

fn decide(engine: &mut DecisionEngine, config: &RoverConfig, aggregate: &Aggregate) -> Decision {
    let margin = safety_margin(&config.margin, &aggregate.dynamics);
    engine.decide(&aggregate.sectors, margin)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensingReport {
    pub decoder: DecoderStats,
    pub cycles: u64,
    pub degraded_cycles: u64,
    /// Commands overwritten before the actuation thread took them.
    pub superseded: u64,
    pub read_errors: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActuationReport {
    pub written: u64,
    pub write_errors: u64,
    /// Timed commands that ran out and were followed by a stop.
    pub expired: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub sensing: SensingReport,
    pub actuation: ActuationReport,
}

/// Process-wide stop request. Both threads observe it within one cycle.
#[derive(Clone)]
pub struct ShutdownHandle {
    terminators: Vec<Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        for tx in &self.terminators {
            let _ = tx.try_send(true);
        }
    }
}

/// Struct that contains the pipeline threads.
pub struct RoverThreads {
    pub(crate) shutdown: ShutdownHandle,
    pub(crate) sensing_thread: Option<JoinHandle<SensingReport>>,
    pub(crate) actuation_thread: Option<JoinHandle<Result<ActuationReport, RoverError>>>,
}

impl RoverThreads {
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Waits until the actuation thread exits, then stops the sensing thread.
    ///
    /// The actuation thread exits on shutdown or when the rover link failed
    /// for good, in which case the link error is returned.
    pub fn join(mut self) -> Result<SessionReport, RoverError> {
        join(&mut self)
    }
}

/// Function to join pipeline threads.
/// This function is automatically called when `RoverThreads` is dropped.
pub fn join(threads: &mut RoverThreads) -> Result<SessionReport, RoverError> {
    let actuation = match threads.actuation_thread.take() {
        Some(thread) => thread
            .join()
            .unwrap_or(Err(RoverError::ThreadPanicked("actuation"))),
        None => Ok(ActuationReport::default()),
    };
    threads.shutdown.trigger();
    let sensing = match threads.sensing_thread.take() {
        Some(thread) => thread
            .join()
            .map_err(|_| RoverError::ThreadPanicked("sensing"))?,
        None => SensingReport::default(),
    };
    Ok(SessionReport {
        sensing,
        actuation: actuation?,
    })
}

impl Drop for RoverThreads {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Err(e) = join(self) {
            error!("{e}");
        }
    }
}

/// Starts the sensing and actuation threads.
///
/// # Arguments
///
/// * `source` - LiDAR byte stream, typically the serial port.
/// * `link` - Motor controller byte stream.
/// * `config` - Configuration shared by both threads.
pub fn spawn_pipeline<R, W>(
    mut source: R,
    mut link: W,
    config: Arc<RoverConfig>,
) -> Result<RoverThreads, RoverError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (sensing_terminator_tx, sensing_terminator_rx) = bounded(1);
    let (actuation_terminator_tx, actuation_terminator_rx) = bounded(1);
    let (command_tx, command_rx) = latest::<Command>();

    let sensing_config = config.clone();
    let sensing_thread = thread::Builder::new()
        .name("sensing".to_string())
        .spawn(move || sense(&mut source, command_tx, sensing_terminator_rx, sensing_config))?;

    let actuation_thread = thread::Builder::new()
        .name("actuation".to_string())
        .spawn(move || actuate(&mut link, command_rx, actuation_terminator_rx, &config))?;

    Ok(RoverThreads {
        shutdown: ShutdownHandle {
            terminators: vec![sensing_terminator_tx, actuation_terminator_tx],
        },
        sensing_thread: Some(sensing_thread),
        actuation_thread: Some(actuation_thread),
    })
}

pub(crate) fn sense<R: Read + ?Sized>(
    source: &mut R,
    commands: LatestSender<Command>,
    terminator_rx: Receiver<bool>,
    config: Arc<RoverConfig>,
) -> SensingReport {
    let mut report = SensingReport::default();
    let mut pipeline = SensingPipeline::new(config.clone());
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let backoff = Backoff::new();

    let publish = |decision: Decision, report: &mut SensingReport| {
        report.cycles += 1;
        if decision.degraded {
            report.degraded_cycles += 1;
        }
        // a closed slot only means actuation is gone; keep sensing
        if let Ok(Some(_)) = commands.publish(decision.command) {
            report.superseded += 1;
        }
    };

    while !do_terminate(&terminator_rx) {
        match read_available(source, &mut buf) {
            Ok(0) => backoff.snooze(),
            Ok(n) => {
                backoff.reset();
                pipeline.process(&buf[..n], |decision| publish(decision, &mut report));
            }
            Err(e) => {
                report.read_errors += 1;
                warn!("LiDAR read failed: {e}");
                thread::sleep(config.pipeline.read_timeout());
            }
        }
        if let Some(decision) = pipeline.poll_stall() {
            publish(decision, &mut report);
        }
    }

    commands.close();
    report.decoder = pipeline.decoder_stats();
    debug!("Sensing thread finished: {:?}", report);
    report
}

pub(crate) fn actuate<W: Write + ?Sized>(
    link: &mut W,
    commands: LatestReceiver<Command>,
    terminator_rx: Receiver<bool>,
    config: &RoverConfig,
) -> Result<ActuationReport, RoverError> {
    let mut report = ActuationReport::default();
    let mut failures = 0usize;
    let mut expires_at: Option<Instant> = None;
    let cycle_timeout = config.pipeline.cycle_timeout();

    while !do_terminate(&terminator_rx) {
        let wait = match expires_at {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(cycle_timeout),
            None => cycle_timeout,
        };
        let command = match commands.recv_timeout(wait) {
            Received::Value(command) => command,
            Received::Timeout | Received::Empty => match expires_at {
                Some(deadline) if Instant::now() >= deadline => {
                    report.expired += 1;
                    Command::STOP
                }
                _ => continue,
            },
            Received::Closed => break,
        };
        // only stops go out until the link works again
        let command = if failures > 0 { Command::STOP } else { command };
        expires_at = command.duration.map(|d| Instant::now() + d);

        match write_command(link, &command, &config.drive) {
            Ok(()) => {
                if failures > 0 {
                    info!("Rover link recovered after {} failed writes", failures);
                }
                failures = 0;
                report.written += 1;
                trace!("Sent {:?}", command.kind);
            }
            Err(e) => {
                failures += 1;
                report.write_errors += 1;
                error!(
                    "Failed to send {:?} to the rover ({}/{}): {}",
                    command.kind, failures, config.pipeline.max_write_failures, e
                );
                if !command.is_stop() {
                    if let Err(e) = write_command(link, &Command::STOP, &config.drive) {
                        debug!("Stop after failed write also failed: {e}");
                    }
                }
                if failures >= config.pipeline.max_write_failures {
                    return Err(RoverError::ActuatorFailed {
                        attempts: failures,
                        source: e,
                    });
                }
            }
        }
    }

    // pending motion is dropped, the rover is left standing
    write_command(link, &Command::STOP, &config.drive).map_err(|e| {
        RoverError::ActuatorFailed {
            attempts: failures + 1,
            source: e,
        }
    })?;
    report.written += 1;
    debug!("Actuation thread finished: {:?}", report);
    Ok(report)
}

/// A dropped terminator counts as a stop request.
pub(crate) fn do_terminate(terminator_rx: &Receiver<bool>) -> bool {
    match terminator_rx.try_recv() {
        Ok(stop) => stop,
        Err(TryRecvError::Empty) => false,
        Err(TryRecvError::Disconnected) => true,
    }
}
