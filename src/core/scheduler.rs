use crate::core::sync::SyncOrchestrator;
use crate::domain::ports::SettingsStore;
use crate::utils::error::Result;
use crate::utils::validation::parse_cron_expression;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const JOB_NAME: &str = "hosts-fetch-job";

struct ActiveJob {
    expression: String,
    handle: JoinHandle<()>,
}

/// Counts live timer tasks; decremented when the task future is dropped,
/// including on abort.
struct TimerGuard(Arc<AtomicUsize>);

impl TimerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the single recurring hosts-fetch timer.
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    slot: Mutex<Option<ActiveJob>>,
    live_timers: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            slot: Mutex::new(None),
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Installs `expression` as the job's schedule, replacing any previous
    /// timer. An invalid expression leaves the current timer running.
    ///
    /// The old timer is stopped and gone before the new one is spawned. A
    /// pass already started by the old timer keeps running to completion.
    pub async fn register(&self, expression: &str) -> Result<()> {
        let expression = expression.trim();
        let schedule = parse_cron_expression(expression)?;

        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.take() {
            old.handle.abort();
            // 等舊 timer 真的結束，確保同時只有一個
            let _ = old.handle.await;
            tracing::debug!("Removed cron job '{}' ({})", JOB_NAME, old.expression);
        }

        let guard = TimerGuard::new(self.live_timers.clone());
        let handle = tokio::spawn(run_timer(schedule, self.orchestrator.clone(), guard));
        *slot = Some(ActiveJob {
            expression: expression.to_string(),
            handle,
        });

        tracing::info!("⏰ Registered cron job '{}' with schedule: {}", JOB_NAME, expression);
        Ok(())
    }

    /// Validates, persists, then re-registers. Nothing changes on a bad expression.
    pub async fn update_schedule(&self, settings: &dyn SettingsStore, expression: &str) -> Result<()> {
        parse_cron_expression(expression.trim())?;
        settings.set_cron_expression(expression).await?;
        self.register(expression).await
    }

    pub async fn current_expression(&self) -> Option<String> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|job| job.expression.clone())
    }

    /// Number of timer tasks currently alive for the job.
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) {
        if let Some(job) = self.slot.lock().await.take() {
            job.handle.abort();
            let _ = job.handle.await;
            tracing::info!("🛑 Stopped cron job '{}'", JOB_NAME);
        }
    }
}

/// Next tick strictly after both the last fired tick and `now`, so a wall
/// clock stepping backwards never replays a tick that already ran.
pub(crate) fn next_fire(
    schedule: &Schedule,
    last_fired: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule.after(&last_fired.max(now)).next()
}

async fn run_timer(schedule: Schedule, orchestrator: Arc<SyncOrchestrator>, _guard: TimerGuard) {
    let mut last_fired = Utc::now();
    loop {
        let now = Utc::now();
        let Some(next) = next_fire(&schedule, last_fired, now) else {
            tracing::warn!("⚠️ Cron job '{}' has no upcoming fire time", JOB_NAME);
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!("Next hosts fetch at {}", next);
        tokio::time::sleep(wait).await;

        fire(orchestrator.clone()).await;
        last_fired = next;
    }
}

/// Runs one scheduled pass in its own task so aborting the timer never
/// cancels it. Errors and panics are logged, never propagated.
pub(crate) async fn fire(orchestrator: Arc<SyncOrchestrator>) {
    let pass = tokio::spawn(async move { orchestrator.run_once(None).await });
    match pass.await {
        Ok(Ok(result)) => tracing::info!(
            "📋 Scheduled fetch finished: {} hosts, {} errors",
            result.hosts_count,
            result.errors_count
        ),
        Ok(Err(e)) => tracing::error!("❌ Cron job execution failed: {}", e),
        Err(e) => tracing::error!("❌ Cron job execution panicked: {}", e),
    }
}
