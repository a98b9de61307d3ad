//! Drift-free periodic triggering, one independent timer per provider.
//!
//! Trigger arithmetic lives in [`first_delay`] and [`advance`]; the timer
//! loop only sleeps and calls the handler.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::ops::Add;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Called once per cycle with the cycle's reference time.
pub type CycleHandler = Arc<dyn Fn(DateTime<Utc>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Delay until the next wall-clock multiple of `interval` after `now`.
///
/// A `now` that sits exactly on a boundary waits a full interval, so a
/// provider never fires at registration.
pub fn first_delay(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1) as i64;
    let elapsed = now.timestamp_millis().rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - elapsed) as u64)
}

/// Next planned start after a cycle that was planned for `planned` and
/// finished at `now`.
///
/// The result is `planned + k * interval` for the smallest `k >= 1` that lies
/// strictly after `now`. The second value is the number of slots skipped
/// (`k - 1`), non-zero only when the cycle overran.
pub fn advance<T>(planned: T, interval: Duration, now: T) -> (T, u32)
where
    T: Copy + PartialOrd + Add<Duration, Output = T>,
{
    let mut next = planned + interval;
    let mut skipped = 0;
    while next <= now {
        next = next + interval;
        skipped += 1;
    }
    (next, skipped)
}

/// Scheduling record of one provider.
pub struct ScheduledProvider {
    pub provider_id: String,
    pub interval: Duration,
    handler: CycleHandler,
}

/// Collects providers, then starts one timer task for each.
#[derive(Default)]
pub struct Scheduler {
    providers: Vec<ScheduledProvider>,
}

/// Running timers; dropping it leaves them running.
pub struct SchedulerHandle {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider_id` to fire every `interval`, aligned on the wall
    /// clock. Nothing runs until [`Scheduler::start`].
    pub fn schedule(
        &mut self,
        provider_id: &str,
        interval: Duration,
        handler: CycleHandler,
    ) -> &mut Self {
        self.providers.push(ScheduledProvider {
            provider_id: provider_id.to_string(),
            interval,
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Spawns the timer tasks. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let tasks = self
            .providers
            .into_iter()
            .map(|provider| {
                let id = provider.provider_id.clone();
                (id, tokio::spawn(run_timer(provider)))
            })
            .collect();
        SchedulerHandle { tasks }
    }
}

impl SchedulerHandle {
    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(id, _)| id.as_str())
    }

    /// Stops every timer, including a cycle in progress.
    pub async fn shutdown(self) {
        for (id, task) in self.tasks {
            task.abort();
            // An aborted task always resolves to a cancellation error.
            let _ = task.await;
            debug!("Stopped scheduler for {}", id);
        }
    }
}

/// Reference time of a cycle planned for the wall-clock boundary `planned`,
/// rounded to the nearest minute.
fn reference_time(planned: DateTime<Utc>) -> DateTime<Utc> {
    planned.duration_round(TimeDelta::minutes(1)).unwrap_or(planned)
}

async fn run_timer(provider: ScheduledProvider) {
    let ScheduledProvider {
        provider_id,
        interval,
        handler,
    } = provider;

    let wall_now = Utc::now();
    let delay = first_delay(wall_now, interval);
    let first_wall = TimeDelta::from_std(delay)
        .ok()
        .and_then(|delay| wall_now.checked_add_signed(delay));
    let (Ok(step), Some(mut planned_wall)) = (TimeDelta::from_std(interval), first_wall) else {
        error!(
            "Cannot schedule {}: interval {:?} is out of range",
            provider_id, interval
        );
        return;
    };
    info!(
        "Scheduled {} every {:?}, first run in {:?}",
        provider_id, interval, delay
    );
    let mut planned = Instant::now() + delay;

    loop {
        sleep_until(planned).await;
        let cycle = AssertUnwindSafe(handler(reference_time(planned_wall))).catch_unwind();
        if cycle.await.is_err() {
            error!("Cycle of {} panicked, waiting for the next slot", provider_id);
        }

        let now = Instant::now();
        let (next, skipped) = advance(planned, interval, now);
        if skipped > 0 {
            warn!(
                "Cycle of {} overran its {:?} interval (took {:?}), skipping {} slot(s)",
                provider_id,
                interval,
                now.duration_since(planned),
                skipped
            );
        }
        let next_wall = i32::try_from(skipped + 1)
            .ok()
            .and_then(|slots| step.checked_mul(slots))
            .and_then(|offset| planned_wall.checked_add_signed(offset));
        let Some(next_wall) = next_wall else {
            error!("Stopping scheduler for {}: next run is out of range", provider_id);
            return;
        };
        planned = next;
        planned_wall = next_wall;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_first_delay_aligns_to_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 7, 30).unwrap();
        assert_eq!(
            first_delay(now, Duration::from_secs(15 * 60)),
            Duration::from_secs(7 * 60 + 30)
        );
    }

    #[test]
    fn test_first_delay_on_boundary_waits_full_interval() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            first_delay(now, Duration::from_secs(3600)),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_advance_does_not_drift_over_many_cycles() {
        let interval = Duration::from_secs(300);
        let start = std::time::Instant::now();
        let mut planned = start;
        for _ in 0..100 {
            // Cycles finish a variable amount of time after their start.
            let finished = planned + Duration::from_millis(1234);
            let (next, skipped) = advance(planned, interval, finished);
            assert_eq!(skipped, 0);
            planned = next;
        }
        assert_eq!(planned, start + interval * 100);
    }

    #[test]
    fn test_advance_skips_missed_slot_after_overrun() {
        let interval = Duration::from_secs(60);
        let planned = std::time::Instant::now();
        let finished = planned + Duration::from_secs(90);

        let (next, skipped) = advance(planned, interval, finished);
        assert_eq!(next, planned + Duration::from_secs(120));
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_advance_on_exact_boundary_moves_past_it() {
        let interval = Duration::from_secs(60);
        let planned = std::time::Instant::now();
        let (next, skipped) = advance(planned, interval, planned + interval);
        assert_eq!(next, planned + interval * 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_reference_time_rounds_to_nearest_minute() {
        let boundary = Utc.with_ymd_and_hms(2024, 6, 1, 12, 15, 0).unwrap();
        assert_eq!(reference_time(boundary), boundary);
        assert_eq!(
            reference_time(boundary - TimeDelta::milliseconds(2)),
            boundary
        );
        assert_eq!(
            reference_time(boundary + TimeDelta::milliseconds(2)),
            boundary
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_times_follow_planned_boundaries() {
        let references: Arc<Mutex<Vec<DateTime<Utc>>>> = Arc::default();
        let mut scheduler = Scheduler::new();
        {
            let references = Arc::clone(&references);
            scheduler.schedule(
                "minutely",
                Duration::from_secs(60),
                Arc::new(move |reference: DateTime<Utc>| {
                    let references = Arc::clone(&references);
                    async move {
                        references.lock().unwrap().push(reference);
                        // Overruns one slot, which must not shift later stamps.
                        tokio::time::sleep(Duration::from_secs(70)).await;
                    }
                    .boxed()
                }),
            );
        }
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_secs(420)).await;
        handle.shutdown().await;

        let references = references.lock().unwrap();
        assert!(references.len() >= 3, "fired {} times", references.len());
        assert!(references
            .iter()
            .all(|r| r.second() == 0 && r.nanosecond() == 0));
        assert!(references
            .windows(2)
            .all(|pair| pair[1] - pair[0] == TimeDelta::minutes(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_keeps_the_timer_alive() {
        let fired = Arc::new(AtomicUsize::new(0));
        let handler: CycleHandler = {
            let fired = Arc::clone(&fired);
            Arc::new(move |_reference: DateTime<Utc>| {
                let fired = Arc::clone(&fired);
                async move {
                    if fired.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first cycle fails");
                    }
                }
                .boxed()
            })
        };

        let mut scheduler = Scheduler::new();
        scheduler.schedule("fragile", Duration::from_secs(1), handler);
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(5500)).await;
        handle.shutdown().await;

        assert!(fired.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_of_one_provider_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let handler: CycleHandler = {
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            let fired = Arc::clone(&fired);
            Arc::new(move |_reference: DateTime<Utc>| {
                let running = Arc::clone(&running);
                let max_running = Arc::clone(&max_running);
                let fired = Arc::clone(&fired);
                async move {
                    let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now_running, Ordering::SeqCst);
                    fired.fetch_add(1, Ordering::SeqCst);
                    // Each cycle overruns its one second interval.
                    tokio::time::sleep(Duration::from_millis(2500)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
                .boxed()
            })
        };

        let mut scheduler = Scheduler::new();
        scheduler.schedule("slow", Duration::from_secs(1), handler);
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.shutdown().await;

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        let fired = fired.load(Ordering::SeqCst);
        assert!((5..=8).contains(&fired), "fired {} times", fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_fire_independently() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut scheduler = Scheduler::new();
        for (id, seconds) in [("fast", 2), ("slow", 10)] {
            let fired = Arc::clone(&fired);
            let id_owned = id.to_string();
            scheduler.schedule(
                id,
                Duration::from_secs(seconds),
                Arc::new(move |_reference: DateTime<Utc>| {
                    let fired = Arc::clone(&fired);
                    let id = id_owned.clone();
                    async move {
                        fired.lock().unwrap().push(id);
                    }
                    .boxed()
                }),
            );
        }
        assert_eq!(scheduler.len(), 2);
        let handle = scheduler.start();
        assert_eq!(handle.provider_ids().collect::<Vec<_>>(), vec!["fast", "slow"]);

        tokio::time::sleep(Duration::from_secs(21)).await;
        handle.shutdown().await;

        let fired = fired.lock().unwrap();
        let fast = fired.iter().filter(|id| *id == "fast").count();
        let slow = fired.iter().filter(|id| *id == "slow").count();
        assert!(fast >= 9, "fast fired {} times", fast);
        assert!((1..=3).contains(&slow), "slow fired {} times", slow);
    }
}
