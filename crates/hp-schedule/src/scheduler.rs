use crate::clock::Clock;
use crate::window::Sample;
use crate::window::SampleWindow;
use crate::window::WindowCount;
use hp_core::PreviewError;
use hp_core::PreviewResult;
use log::debug;
use log::warn;

/// Host timers cannot fire twice at the same instant; armed delays are
/// clamped to this even when the computed interval is zero.
pub const MIN_TIMER_DELAY_MS: u64 = 1;

/// Work sampled on every tick. `Ok(true)` means "something changed".
pub trait Probe {
    fn sample(&mut self) -> PreviewResult<bool>;
}

impl<F> Probe for F
where
    F: FnMut() -> bool,
{
    fn sample(&mut self) -> PreviewResult<bool> {
        Ok(self())
    }
}

/// Adapts a closure that can fail.
pub struct FallibleProbe<F>(pub F);

impl<F> Probe for FallibleProbe<F>
where
    F: FnMut() -> PreviewResult<bool>,
{
    fn sample(&mut self) -> PreviewResult<bool> {
        (self.0)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Width of the trailing window, and length of the warm-up period.
    pub sample_interval_ms: u64,
    /// Delay used when nothing is changing.
    pub max_interval_ms: u64,
    /// Floor for the delay when everything is changing.
    pub min_interval_ms: u64,
    /// Slope applied to the change proportion.
    pub factor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 240,
            max_interval_ms: 150,
            min_interval_ms: 0,
            factor: 1.1765,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Reset,
    Running,
    Paused,
    /// The probe returned an error; the instance never runs again.
    Failed,
}

/// Repeating timer that polls faster while its probe keeps reporting changes
/// and backs off toward `max_interval_ms` once things settle.
pub struct AdaptiveScheduler<P, C> {
    probe: P,
    clock: C,
    config: SchedulerConfig,
    state: SchedulerState,
    start_time_ms: u64,
    window: SampleWindow,
    next_due_ms: Option<u64>,
    last_interval_ms: Option<u64>,
}

impl<P: Probe, C: Clock> AdaptiveScheduler<P, C> {
    pub fn new(probe: P, clock: C, config: SchedulerConfig) -> Self {
        Self {
            probe,
            clock,
            config,
            state: SchedulerState::Reset,
            start_time_ms: 0,
            window: SampleWindow::default(),
            next_due_ms: None,
            last_interval_ms: None,
        }
    }

    pub fn with_defaults(probe: P, clock: C) -> Self {
        Self::new(probe, clock, SchedulerConfig::default())
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Deadline of the single armed timer, if any.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.next_due_ms
    }

    /// Interval computed by the most recent tick, before clamping.
    pub fn last_interval_ms(&self) -> Option<u64> {
        self.last_interval_ms
    }

    /// Arms the timer to fire immediately. Starting a running scheduler
    /// re-arms it to now.
    pub fn start(&mut self) -> &mut Self {
        let now = self.clock.now_ms();
        match self.state {
            SchedulerState::Failed => {
                warn!("ignoring start on a scheduler whose probe failed");
                return self;
            }
            SchedulerState::Reset => self.start_time_ms = now,
            SchedulerState::Running | SchedulerState::Paused => {}
        }
        self.state = SchedulerState::Running;
        self.next_due_ms = Some(now);
        self
    }

    /// Cancels the armed timer and keeps collected samples.
    pub fn pause(&mut self) -> &mut Self {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
            self.next_due_ms = None;
        }
        self
    }

    /// Cancels the armed timer and discards collected samples.
    pub fn reset(&mut self) -> &mut Self {
        match self.state {
            SchedulerState::Running | SchedulerState::Paused => {
                self.state = SchedulerState::Reset;
                self.next_due_ms = None;
                self.last_interval_ms = None;
                self.start_time_ms = 0;
                self.window.clear();
            }
            SchedulerState::Failed => warn!("ignoring reset on a scheduler whose probe failed"),
            SchedulerState::Reset => {}
        }
        self
    }

    /// Ticks if the armed deadline has passed. Returns whether a tick ran.
    pub fn fire(&mut self) -> PreviewResult<bool> {
        if self.state != SchedulerState::Running {
            return Ok(false);
        }
        match self.next_due_ms {
            Some(due) if due <= self.clock.now_ms() => {
                self.tick()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drives the timer with the clock's sleep until `deadline_ms`, or until
    /// the scheduler stops running. Returns the number of ticks.
    pub fn run_until(&mut self, deadline_ms: u64) -> PreviewResult<usize> {
        let mut ticks = 0;
        while self.state == SchedulerState::Running {
            let Some(due) = self.next_due_ms else {
                break;
            };
            let now = self.clock.now_ms();
            if due > deadline_ms {
                if deadline_ms > now {
                    self.clock.sleep_ms(deadline_ms - now);
                }
                break;
            }
            if due > now {
                self.clock.sleep_ms(due - now);
            }
            self.tick()?;
            ticks += 1;
        }
        Ok(ticks)
    }

    fn tick(&mut self) -> PreviewResult<()> {
        self.next_due_ms = None;
        let outcome = match self.probe.sample() {
            Ok(outcome) => outcome,
            Err(error) => {
                self.state = SchedulerState::Failed;
                return Err(PreviewError::new(
                    "schedule.probe_failed",
                    format!("probe failed: {error}"),
                ));
            }
        };

        let now = self.clock.now_ms();
        self.window.push(Sample {
            timestamp_ms: now,
            outcome,
        });

        let interval = self.calc_next_interval(now);
        self.last_interval_ms = Some(interval);
        self.next_due_ms = Some(now + interval.max(MIN_TIMER_DELAY_MS));
        Ok(())
    }

    /// Warm-up polls at a tenth of the sample interval; afterwards the delay
    /// falls linearly from `max_interval_ms` as the change proportion rises.
    pub fn calc_next_interval(&mut self, now_ms: u64) -> u64 {
        let config = self.config;
        if now_ms.saturating_sub(self.start_time_ms) < config.sample_interval_ms {
            return config.sample_interval_ms / 10;
        }

        let count = self.count(now_ms);
        let min = config.min_interval_ms as f64;
        let max = config.max_interval_ms as f64;
        let interval = (config.factor * (min - max) * count.proportion() + max).max(min);
        debug!(
            "{}/{} samples changed, next poll in {interval:.0} ms",
            count.changed, count.total
        );
        interval.round() as u64
    }

    /// Tally over samples newer than `now_ms - sample_interval_ms`.
    pub fn count(&mut self, now_ms: u64) -> WindowCount {
        self.window.count(now_ms, self.config.sample_interval_ms)
    }
}
