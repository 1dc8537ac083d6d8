use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone, Utc, Weekday};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::service::NewsService;

/// How far a job is pushed when its next run cannot be computed.
const RESCHEDULE_FALLBACK_HOURS: i64 = 24;

/// When a job is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    DailyAt(NaiveTime),
    WeeklyAt(Weekday, NaiveTime),
}

impl Schedule {
    /// First due time strictly after `after`, reading wall-clock times in
    /// the local timezone.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.next_after_in(after, &Local)
    }

    /// A wall-clock time skipped by a DST jump runs one hour later that day.
    pub fn next_after_in<Tz: TimeZone>(
        &self,
        after: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<DateTime<Utc>> {
        let (weekday, at) = match self {
            Schedule::Every(interval) => {
                return after.checked_add_signed(*interval).ok_or_else(|| {
                    AppError::Schedule(format!("{} overflows from {}", self, after))
                });
            }
            Schedule::DailyAt(at) => (None, *at),
            Schedule::WeeklyAt(day, at) => (Some(*day), *at),
        };

        let start = after.with_timezone(tz).date_naive();
        for offset in 0..=7 {
            let date = start + Duration::days(offset);
            if weekday.is_some_and(|day| date.weekday() != day) {
                continue;
            }

            let local = date.and_time(at);
            let resolved = tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest());
            let Some(candidate) = resolved.map(|dt| dt.with_timezone(&Utc)) else {
                tracing::debug!("{} does not exist in the local timezone", local);
                continue;
            };
            if candidate > after {
                return Ok(candidate);
            }
        }

        Err(AppError::Schedule(format!("no upcoming run for {}", self)))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(interval) if interval.num_minutes() % 60 == 0 => {
                write!(f, "every {} hours", interval.num_hours())
            }
            Schedule::Every(interval) => write!(f, "every {} minutes", interval.num_minutes()),
            Schedule::DailyAt(at) => write!(f, "daily at {}", at.format("%H:%M")),
            Schedule::WeeklyAt(day, at) => write!(f, "every {} at {}", day, at.format("%H:%M")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Collection,
    DailySummary,
    HealthCheck,
    Retention,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Collection => "collection",
            Job::DailySummary => "daily-summary",
            Job::HealthCheck => "health-check",
            Job::Retention => "retention",
        }
    }

    async fn run(&self, service: &NewsService) -> Result<()> {
        match self {
            Job::Collection => {
                service.run_once().await?;
            }
            Job::DailySummary => {
                service.daily_summary().await?;
            }
            Job::HealthCheck => {
                service.health_check().await?;
            }
            Job::Retention => {
                service.retention_cleanup().await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone)]
pub struct PendingJob {
    pub job: Job,
    pub schedule: Schedule,
    pub next_run: DateTime<Utc>,
}

/// Stops a running scheduler from another task.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Cooperative polling loop. Due jobs run inline, one at a time.
pub struct Scheduler {
    service: NewsService,
    clock: Arc<dyn Clock>,
    registry: Vec<(Schedule, Job)>,
    pending: Vec<PendingJob>,
    state: SchedulerState,
    tick: std::time::Duration,
    error_backoff: std::time::Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(
        service: NewsService,
        clock: Arc<dyn Clock>,
        registry: Vec<(Schedule, Job)>,
        tick: std::time::Duration,
        error_backoff: std::time::Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            service,
            clock,
            registry,
            pending: Vec::new(),
            state: SchedulerState::Stopped,
            tick,
            error_backoff,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn from_config(
        service: NewsService,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self> {
        let (retention_day, retention_at) = config.retention_at()?;
        let registry = vec![
            (
                Schedule::Every(Duration::minutes(i64::from(config.collection_interval_minutes))),
                Job::Collection,
            ),
            (Schedule::DailyAt(config.daily_summary_at()?), Job::DailySummary),
            (
                Schedule::Every(Duration::minutes(i64::from(config.health_check_interval_minutes))),
                Job::HealthCheck,
            ),
            (Schedule::WeeklyAt(retention_day, retention_at), Job::Retention),
        ];

        Ok(Self::new(
            service,
            clock,
            registry,
            std::time::Duration::from_secs(config.tick_seconds),
            std::time::Duration::from_secs(config.error_backoff_seconds),
        ))
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> &[PendingJob] {
        &self.pending
    }

    #[cfg(test)]
    pub fn service(&self) -> &NewsService {
        &self.service
    }

    /// Next run of every configured job, without registering anything.
    pub fn upcoming(&self) -> Result<Vec<PendingJob>> {
        let now = self.clock.now();
        self.registry
            .iter()
            .map(|(schedule, job)| -> Result<PendingJob> {
                Ok(PendingJob {
                    job: *job,
                    schedule: schedule.clone(),
                    next_run: schedule.next_after(now)?,
                })
            })
            .collect()
    }

    /// Registers the jobs and moves to `Running`. Every job is registered
    /// even when one of them cannot be scheduled; that job is pushed back a
    /// day and the first such error is returned.
    pub fn register(&mut self) -> Result<()> {
        let now = self.clock.now();
        let mut failure = None;
        self.pending = self
            .registry
            .iter()
            .map(|(schedule, job)| PendingJob {
                job: *job,
                schedule: schedule.clone(),
                next_run: next_run_or_fallback(*job, schedule, now, &mut failure),
            })
            .collect();
        self.state = SchedulerState::Running;

        tracing::info!("Scheduling setup complete:");
        for pending in &self.pending {
            tracing::info!("- {}: {}", pending.job.name(), pending.schedule);
        }
        failure.map_or(Ok(()), Err)
    }

    /// Runs every job that is due. Job failures are logged. A job whose next
    /// run cannot be computed is pushed back a day, and the first such error
    /// is returned after all due jobs ran.
    pub async fn run_pending(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let mut ran = 0;
        let mut failure = None;

        for i in 0..self.pending.len() {
            if self.pending[i].next_run > now {
                continue;
            }

            let job = self.pending[i].job;
            tracing::info!("Starting {} job", job.name());
            if let Err(e) = job.run(&self.service).await {
                tracing::error!("Error in {} job: {}", job.name(), e);
            }
            ran += 1;

            let finished = self.clock.now();
            let next_run =
                next_run_or_fallback(job, &self.pending[i].schedule, finished, &mut failure);
            self.pending[i].next_run = next_run;
        }

        failure.map_or(Ok(ran), Err)
    }

    /// Registers the jobs, runs an initial collection, then polls until
    /// stopped.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("Starting news bot service");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if let Err(e) = self.register() {
            tracing::error!("Scheduler error: {}", e);
        }

        tracing::info!("Starting initial news collection");
        match self.service.run_once().await {
            Ok(articles) if !articles.is_empty() => {
                tracing::info!("Collected {} articles in initial run", articles.len())
            }
            Ok(_) => tracing::warn!("No articles collected in initial run"),
            Err(e) => tracing::error!("Error in initial collection: {}", e),
        }

        while self.state == SchedulerState::Running && !*shutdown_rx.borrow() {
            let pause = match self.run_pending().await {
                Ok(_) => self.tick,
                Err(e) => {
                    tracing::error!("Scheduler error: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        self.stop();
        Ok(())
    }

    /// Clears pending jobs and moves to `Stopped`.
    pub fn stop(&mut self) {
        tracing::info!("Stopping news bot service");
        self.pending.clear();
        self.state = SchedulerState::Stopped;
        self.shutdown_tx.send_replace(true);
    }
}

fn next_run_or_fallback(
    job: Job,
    schedule: &Schedule,
    after: DateTime<Utc>,
    failure: &mut Option<AppError>,
) -> DateTime<Utc> {
    schedule.next_after(after).unwrap_or_else(|e| {
        tracing::error!("Cannot schedule next {} run: {}", job.name(), e);
        if failure.is_none() {
            *failure = Some(e);
        }
        after + Duration::hours(RESCHEDULE_FALLBACK_HOURS)
    })
}
