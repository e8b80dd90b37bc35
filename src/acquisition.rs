//! The acquisition loop: poll due data loads, decode them and publish the
//! results, one batch per tick.

use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::{
    decode::decode,
    error::Result,
    publish::{Broker, PublishSession},
    scheduler::Scheduler,
    transport::RegisterTransport,
    types::DataLoadDescriptor,
};

/// Timing knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Sleep when nothing is due.
    pub idle_interval: Duration,
    /// Longest wait between attempts to reach an unavailable broker.
    pub connect_backoff_max: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(500),
            connect_backoff_max: Duration::from_secs(30),
        }
    }
}

/// Wait before retrying an unreachable broker.
///
/// Starts at the idle interval and doubles on every failure, up to
/// [`LoopTiming::connect_backoff_max`].
#[derive(Debug, Clone, Copy)]
struct Backoff {
    timing: LoopTiming,
    current: Duration,
}

impl Backoff {
    fn new(timing: LoopTiming) -> Self {
        Self {
            timing,
            current: timing.idle_interval,
        }
    }

    /// The wait for this failure. The next one waits twice as long.
    fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = self
            .current
            .saturating_mul(2)
            .min(self.timing.connect_backoff_max.max(self.timing.idle_interval));
        wait
    }

    fn reset(&mut self) {
        self.current = self.timing.idle_interval;
    }
}

/// What happened to one data load in a batch.
#[derive(Debug)]
pub struct TaskReport {
    pub name: String,
    /// The published payload, or why nothing was published.
    pub outcome: Result<String>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub tasks: Vec<TaskReport>,
}

impl BatchReport {
    pub fn published(&self) -> usize {
        self.tasks.iter().filter(|t| t.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.tasks.len() - self.published()
    }
}

/// Drives the scheduler, the register transport and the broker.
pub struct Acquisition<T: RegisterTransport, B: Broker> {
    scheduler: Scheduler,
    transport: T,
    broker: B,
    timing: LoopTiming,
}

impl<T: RegisterTransport, B: Broker> Acquisition<T, B> {
    /// Every data load is due on the first tick.
    pub fn new(
        descriptors: impl IntoIterator<Item = DataLoadDescriptor>,
        transport: T,
        broker: B,
        timing: LoopTiming,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(descriptors, Instant::now()),
            transport,
            broker,
            timing,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one iteration at `now` without sleeping.
    ///
    /// Returns `Ok(None)` when nothing is due. Failing to open the broker
    /// session abandons the batch: nothing is read and the due tasks stay
    /// due. Any other failure is confined to its data load.
    pub fn tick(&mut self, now: Instant) -> Result<Option<BatchReport>> {
        let due = self.scheduler.due_tasks(now);
        if due.is_empty() {
            return Ok(None);
        }

        let mut session = PublishSession::open(&mut self.broker)?;
        let mut report = BatchReport::default();

        for index in due {
            let Some(task) = self.scheduler.task(index) else {
                continue;
            };
            let descriptor = &task.descriptor;
            let outcome = poll(descriptor, &mut self.transport, &mut session);
            match &outcome {
                Ok(payload) => debug!(
                    data_load = %descriptor.name,
                    topic = %descriptor.topic,
                    %payload,
                    unit = %descriptor.unit,
                    "Published"
                ),
                Err(e) => error!(
                    data_load = %descriptor.name,
                    unit = %descriptor.unit,
                    error = %e,
                    "Data load failed"
                ),
            }
            report.tasks.push(TaskReport {
                name: descriptor.name.clone(),
                outcome,
            });
            self.scheduler.reschedule(index, now);
        }

        session.close();
        Ok(Some(report))
    }

    /// Poll forever.
    ///
    /// When the broker cannot be reached the wait before the next attempt
    /// doubles, starting from the idle interval, up to
    /// [`LoopTiming::connect_backoff_max`].
    pub fn run(&mut self) -> ! {
        info!(data_loads = self.scheduler.len(), "Starting acquisition");
        let mut backoff = Backoff::new(self.timing);
        loop {
            match self.tick(Instant::now()) {
                Ok(None) => thread::sleep(self.timing.idle_interval),
                Ok(Some(report)) => {
                    backoff.reset();
                    info!(
                        published = report.published(),
                        failed = report.failed(),
                        "Batch complete"
                    );
                }
                Err(e) => {
                    let wait = backoff.next_wait();
                    error!(error = %e, retry_in = ?wait, "Batch aborted");
                    thread::sleep(wait);
                }
            }
        }
    }
}

/// Read, decode and publish one data load.
fn poll<T: RegisterTransport + ?Sized, B: Broker + ?Sized>(
    descriptor: &DataLoadDescriptor,
    transport: &mut T,
    session: &mut PublishSession<'_, B>,
) -> Result<String> {
    let payload = decode(descriptor, transport)?.payload();
    session.publish(&descriptor.topic, &payload)?;
    Ok(payload)
}
