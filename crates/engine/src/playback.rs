use std::time::Duration;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::scheduler::{Scheduler, TaskId, TaskKind};

/// Coarse state of the playback clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Outcome of one clock tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockTick {
    /// The clock is not running; the tick was stale.
    Idle,
    /// Current time moved to the contained position in seconds.
    Advanced(f64),
    /// The end of the timeline was reached; the clock stopped and rewound.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    started_at: Duration,
    base: f64,
}

/// Real-time clock producing the timeline's current time.
///
/// Elapsed time is always derived from the instant playback was (re)anchored
/// plus the position at that instant, so late or irregular ticks never
/// accumulate drift.
#[derive(Debug)]
pub struct PlaybackClock {
    state: PlaybackState,
    current: f64,
    anchor: Option<Anchor>,
    tick: Option<TaskId>,
    tick_interval: Duration,
}

impl PlaybackClock {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            state: PlaybackState::Stopped,
            current: 0.0,
            anchor: None,
            tick: None,
            tick_interval,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    /// Current position in seconds as of the last tick or control call.
    pub fn current_time(&self) -> f64 {
        self.current
    }

    /// Handle of the pending tick task, if playback is running.
    pub fn tick_task(&self) -> Option<TaskId> {
        self.tick
    }

    /// Starts or resumes playback and registers the recurring tick.
    ///
    /// Returns `Ok(false)` when the clock was already running. A position at or
    /// past the end restarts from zero.
    pub fn play(&mut self, now: Duration, total: f64, scheduler: &mut Scheduler) -> Result<bool> {
        if total <= 0.0 {
            return Err(EngineError::EmptyTimeline);
        }
        if self.is_running() {
            return Ok(false);
        }
        if self.current >= total {
            self.current = 0.0;
        }

        self.state = PlaybackState::Running;
        self.anchor = Some(Anchor {
            started_at: now,
            base: self.current,
        });
        self.tick = Some(scheduler.schedule(TaskKind::PlaybackTick, self.tick_interval, now));
        debug!(current_time = self.current, total, "playback started");
        Ok(true)
    }

    /// Pauses playback, keeping the current time. Returns `false` when there
    /// was nothing to pause.
    ///
    /// A pause that lands at or past `total` before the tick noticed stops and
    /// rewinds instead, like the tick would have.
    pub fn pause(&mut self, now: Duration, total: f64, scheduler: &mut Scheduler) -> bool {
        if !self.is_running() {
            return false;
        }
        let elapsed = self.elapsed(now);
        if elapsed >= total {
            self.reset(scheduler);
            debug!(total, "pause past the end rewound playback");
            return true;
        }
        self.current = elapsed;
        self.state = PlaybackState::Paused;
        self.anchor = None;
        self.cancel_tick(scheduler);
        debug!(current_time = self.current, "playback paused");
        true
    }

    /// Moves the current time to `t`, clamped to `[0, total]`.
    ///
    /// Running playback continues from the new position; a paused clock stays
    /// paused. Seeking a stopped clock away from zero leaves it paused there.
    pub fn seek(&mut self, t: f64, total: f64, now: Duration) -> f64 {
        let target = clamp_position(t, total);
        self.current = target;
        match self.state {
            PlaybackState::Running => {
                self.anchor = Some(Anchor {
                    started_at: now,
                    base: target,
                });
            }
            PlaybackState::Stopped if target > 0.0 => {
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Stopped | PlaybackState::Paused => {}
        }
        debug!(current_time = target, total, state = ?self.state, "seek applied");
        target
    }

    /// Stops playback and rewinds to zero.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.cancel_tick(scheduler);
        self.state = PlaybackState::Stopped;
        self.current = 0.0;
        self.anchor = None;
    }

    /// Recomputes the current time from the anchor.
    ///
    /// Reaching `total` stops the clock and rewinds it to zero instead of
    /// freezing on the last frame.
    pub fn tick(&mut self, now: Duration, total: f64, scheduler: &mut Scheduler) -> ClockTick {
        if !self.is_running() {
            return ClockTick::Idle;
        }

        let elapsed = self.elapsed(now);
        if elapsed >= total {
            self.reset(scheduler);
            debug!(total, "playback reached the end and rewound");
            return ClockTick::Finished;
        }

        self.current = elapsed;
        ClockTick::Advanced(elapsed)
    }

    /// Pulls the clock back inside a timeline whose total just changed.
    ///
    /// Returns `true` when the position or state changed.
    pub fn clamp_to(&mut self, total: f64, now: Duration, scheduler: &mut Scheduler) -> bool {
        if total <= 0.0 {
            let changed = self.state != PlaybackState::Stopped || self.current != 0.0;
            self.reset(scheduler);
            return changed;
        }

        let position = match self.state {
            PlaybackState::Running => self.elapsed(now),
            PlaybackState::Stopped | PlaybackState::Paused => self.current,
        };
        if position <= total {
            return false;
        }
        self.seek(total, total, now);
        true
    }

    fn elapsed(&self, now: Duration) -> f64 {
        match self.anchor {
            Some(anchor) => anchor.base + now.saturating_sub(anchor.started_at).as_secs_f64(),
            None => self.current,
        }
    }

    fn cancel_tick(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.tick.take() {
            scheduler.cancel(task);
        }
    }
}

fn clamp_position(t: f64, total: f64) -> f64 {
    if t.is_nan() {
        return 0.0;
    }
    t.clamp(0.0, total.max(0.0))
}
