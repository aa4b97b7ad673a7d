//! Recurring backup jobs driven by a polling loop.
//!
//! Every trigger is evaluated against a `next_run` timestamp that moves past
//! `now` whenever the job is found due, so one evaluation can fire a job at
//! most once. Monthly jobs sit on a daily trigger and only execute when the
//! day of month matches: a job for the 31st does nothing in 30-day months.

use crate::backup::BackupKind;
use crate::clock::Clock;
use crate::AutomationError;
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    Daily,
    Weekly(Weekday),
    /// Day of month, 1 to 31
    Monthly(u32),
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobBinding {
    pub kind: BackupKind,
    pub report_kinds: Vec<String>,
}

impl JobBinding {
    pub fn new(kind: BackupKind, report_kinds: Vec<String>) -> Self {
        Self { kind, report_kinds }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    pub id: usize,
    pub trigger: Trigger,
    pub at: NaiveTime,
    pub binding: JobBinding,
    /// Next evaluation time of the underlying trigger
    pub next_run: NaiveDateTime,
}

impl ScheduledJob {
    /// Whether a due evaluation at `now` should actually run the job.
    fn executes_on(&self, now: NaiveDateTime) -> bool {
        match self.trigger {
            Trigger::Monthly(day) => now.day() == day,
            Trigger::Daily | Trigger::Weekly(_) => true,
        }
    }
}

impl fmt::Display for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.at.format("%H:%M");
        match self.trigger {
            Trigger::Daily => write!(f, "every day at {at}")?,
            Trigger::Weekly(day) => write!(f, "every {day:?} at {at}")?,
            Trigger::Monthly(day) => write!(f, "day {day} of every month at {at}")?,
        }
        write!(
            f,
            " -> {} backup (next check {})",
            self.binding.kind,
            self.next_run.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Next occurrence of the trigger's underlying schedule strictly after `now`.
fn next_occurrence(trigger: Trigger, at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    match trigger {
        // Monthly runs on a daily trigger; the day check happens at fire time
        Trigger::Daily | Trigger::Monthly(_) => {
            if today > now {
                today
            } else {
                today + ChronoDuration::days(1)
            }
        }
        Trigger::Weekly(weekday) => {
            let ahead = (7 + weekday.num_days_from_monday() as i64
                - now.weekday().num_days_from_monday() as i64)
                % 7;
            let candidate = today + ChronoDuration::days(ahead);
            if candidate > now {
                candidate
            } else {
                candidate + ChronoDuration::days(7)
            }
        }
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`).
pub fn parse_time(value: &str) -> Result<NaiveTime, AutomationError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AutomationError::InvalidArgument(format!("invalid time '{value}' (expected HH:MM)")))
}

/// Parse an English weekday name such as `monday` or `Mon`.
pub fn parse_weekday(value: &str) -> Result<Weekday, AutomationError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| AutomationError::InvalidArgument(format!("invalid weekday '{value}'")))
}

/// Executes a fired job. Failures are the runner's to log; the loop keeps going.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: &ScheduledJob);
}

/// Stops a running [`Scheduler`] loop from elsewhere, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    /// Takes effect at the top of the next loop iteration. A job in flight finishes first.
    /// A request made before [`Scheduler::run`] starts makes that run return at once.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        info!("Scheduler stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Owns the job registry for the lifetime of the process.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    next_id: usize,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    stop: StopHandle,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            clock,
            stop: StopHandle {
                running: Arc::new(AtomicBool::new(false)),
                stop_requested: Arc::new(AtomicBool::new(false)),
                wake: Arc::new(Notify::new()),
            },
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn register(&mut self, trigger: Trigger, at: NaiveTime, binding: JobBinding) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let next_run = next_occurrence(trigger, at, self.clock.now().naive_local());
        let job = ScheduledJob {
            id,
            trigger,
            at,
            binding,
            next_run,
        };
        info!("Registered job {}: {}", id, job);
        self.jobs.push(job);
        id
    }

    pub fn schedule_daily(&mut self, at: NaiveTime, binding: JobBinding) -> usize {
        self.register(Trigger::Daily, at, binding)
    }

    pub fn schedule_weekly(&mut self, day: Weekday, at: NaiveTime, binding: JobBinding) -> usize {
        self.register(Trigger::Weekly(day), at, binding)
    }

    pub fn schedule_monthly(
        &mut self,
        day: u32,
        at: NaiveTime,
        binding: JobBinding,
    ) -> Result<usize, AutomationError> {
        if !(1..=31).contains(&day) {
            return Err(AutomationError::InvalidArgument(format!(
                "day of month must be between 1 and 31, got {day}"
            )));
        }
        Ok(self.register(Trigger::Monthly(day), at, binding))
    }

    pub fn list_jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub fn clear_jobs(&mut self) {
        self.jobs.clear();
        info!("All scheduled jobs removed");
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Evaluate every job once at `now`. Due jobs run one after another.
    ///
    /// Returns how many jobs executed.
    pub async fn tick(&mut self, now: NaiveDateTime, runner: &dyn JobRunner) -> usize {
        let mut executed = 0;
        for index in 0..self.jobs.len() {
            if self.jobs[index].next_run > now {
                continue;
            }
            let job = {
                let job = &mut self.jobs[index];
                job.next_run = next_occurrence(job.trigger, job.at, now);
                job.clone()
            };
            if !job.executes_on(now) {
                debug!("Job {} due but not its day of month", job.id);
                continue;
            }

            info!("Running job {}: {}", job.id, job);
            runner.run_job(&job).await;
            executed += 1;
        }
        executed
    }

    /// Poll until stopped. Stopping never interrupts a job already running.
    pub async fn run(&mut self, runner: &dyn JobRunner) {
        if self.stop.stop_requested.swap(false, Ordering::SeqCst) {
            info!("Scheduler stopped before it started");
            return;
        }
        self.stop.running.store(true, Ordering::SeqCst);
        info!("Scheduler started with {} job(s)", self.jobs.len());
        if self.jobs.is_empty() {
            warn!("No jobs registered; the scheduler will idle");
        }

        while !self.stop.stop_requested() {
            let now = self.clock.now().naive_local();
            self.tick(now, runner).await;
            if self.stop.stop_requested() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.stop.wake.notified() => {}
            }
        }

        self.stop.stop_requested.store(false, Ordering::SeqCst);
        self.stop.running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
    }
}
