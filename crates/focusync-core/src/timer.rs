//! Pomodoro countdown state machine.
//!
//! The timer is driven by explicit `now` values so the caller owns the clock.

use chrono::{DateTime, TimeDelta, Utc};
use focusync_config::TimerConfig;
use focusync_protocol::{Companion, DomainEvent, FocusPhase};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running {
        phase: FocusPhase,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    Paused {
        phase: FocusPhase,
        remaining: TimeDelta,
    },
}

/// Emitted by [`FocusTimer::tick`] when a phase runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCompleted {
    pub phase: FocusPhase,
    pub companion: Companion,
    pub minutes: u32,
    pub completed_at: DateTime<Utc>,
    pub next_phase: FocusPhase,
}

impl PhaseCompleted {
    /// Event to publish for a finished focus phase.
    pub fn focus_event(&self) -> Option<DomainEvent> {
        (self.phase == FocusPhase::Focus).then_some(DomainEvent::FocusSessionCompleted {
            companion: self.companion,
            minutes: self.minutes,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FocusTimer {
    config: TimerConfig,
    companion: Companion,
    state: TimerState,
    next_phase: FocusPhase,
    completed_focus: u32,
}

impl FocusTimer {
    pub fn new(config: TimerConfig, companion: Companion) -> Self {
        Self {
            config,
            companion,
            state: TimerState::Idle,
            next_phase: FocusPhase::Focus,
            completed_focus: 0,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn companion(&self) -> Companion {
        self.companion
    }

    /// Companion credited for future focus phases.
    pub fn set_companion(&mut self, companion: Companion) {
        self.companion = companion;
    }

    /// Phase that `start` will begin.
    pub fn next_phase(&self) -> FocusPhase {
        self.next_phase
    }

    pub fn completed_focus_sessions(&self) -> u32 {
        self.completed_focus
    }

    pub fn phase_minutes(&self, phase: FocusPhase) -> u32 {
        match phase {
            FocusPhase::Focus => self.config.focus_minutes,
            FocusPhase::ShortBreak => self.config.short_break_minutes,
            FocusPhase::LongBreak => self.config.long_break_minutes,
        }
    }

    /// Begin the next phase. Returns false unless the timer was idle.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TimerState::Idle {
            return false;
        }
        let phase = self.next_phase;
        let length = TimeDelta::minutes(i64::from(self.phase_minutes(phase)));
        self.state = TimerState::Running {
            phase,
            started_at: now,
            ends_at: now + length,
        };
        debug!("timer started (phase={phase:?}, companion={})", self.companion);
        true
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        let TimerState::Running { phase, ends_at, .. } = self.state else {
            return false;
        };
        let remaining = (ends_at - now).max(TimeDelta::zero());
        self.state = TimerState::Paused { phase, remaining };
        true
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        let TimerState::Paused { phase, remaining } = self.state else {
            return false;
        };
        self.state = TimerState::Running {
            phase,
            started_at: now,
            ends_at: now + remaining,
        };
        true
    }

    /// Abandon the current phase without crediting it.
    pub fn reset(&mut self) {
        self.state = TimerState::Idle;
    }

    /// Time left in the current phase.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        match self.state {
            TimerState::Idle => TimeDelta::zero(),
            TimerState::Running { ends_at, .. } => (ends_at - now).max(TimeDelta::zero()),
            TimerState::Paused { remaining, .. } => remaining,
        }
    }

    /// Advance to `now`; returns the completed phase when the countdown ends.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<PhaseCompleted> {
        let TimerState::Running { phase, ends_at, .. } = self.state else {
            return None;
        };
        if now < ends_at {
            return None;
        }
        let next_phase = match phase {
            FocusPhase::Focus => {
                self.completed_focus += 1;
                let every = self.config.sessions_before_long_break.max(1);
                if self.completed_focus % every == 0 {
                    FocusPhase::LongBreak
                } else {
                    FocusPhase::ShortBreak
                }
            }
            FocusPhase::ShortBreak | FocusPhase::LongBreak => FocusPhase::Focus,
        };
        self.state = TimerState::Idle;
        self.next_phase = next_phase;
        debug!("timer phase finished (phase={phase:?}, next={next_phase:?})");
        Some(PhaseCompleted {
            phase,
            companion: self.companion,
            minutes: self.phase_minutes(phase),
            completed_at: ends_at,
            next_phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("time")
    }

    fn run_phase(timer: &mut FocusTimer, now: &mut DateTime<Utc>) -> PhaseCompleted {
        assert!(timer.start(*now));
        *now += TimeDelta::minutes(i64::from(timer.phase_minutes(timer.next_phase())));
        timer.tick(*now).expect("phase completes")
    }

    #[test]
    fn long_break_follows_configured_focus_count() {
        let mut timer = FocusTimer::new(TimerConfig::default(), Companion::Sage);
        let mut now = start();
        let mut breaks = Vec::new();
        for _ in 0..4 {
            let focus = run_phase(&mut timer, &mut now);
            assert_eq!(focus.phase, FocusPhase::Focus);
            breaks.push(focus.next_phase);
            run_phase(&mut timer, &mut now);
        }
        assert_eq!(
            breaks,
            vec![
                FocusPhase::ShortBreak,
                FocusPhase::ShortBreak,
                FocusPhase::ShortBreak,
                FocusPhase::LongBreak
            ]
        );
        assert_eq!(timer.completed_focus_sessions(), 4);
    }

    #[test]
    fn pause_freezes_remaining_time() {
        let mut timer = FocusTimer::new(TimerConfig::default(), Companion::Tide);
        let now = start();
        timer.start(now);
        assert!(timer.pause(now + TimeDelta::minutes(10)));
        assert_eq!(timer.remaining(now + TimeDelta::hours(3)), TimeDelta::minutes(15));
        assert_eq!(timer.tick(now + TimeDelta::hours(3)), None);

        let resumed_at = now + TimeDelta::hours(3);
        assert!(timer.resume(resumed_at));
        let done = timer
            .tick(resumed_at + TimeDelta::minutes(15))
            .expect("done");
        assert_eq!(done.minutes, 25);
        assert!(matches!(
            done.focus_event(),
            Some(DomainEvent::FocusSessionCompleted { minutes: 25, .. })
        ));
    }

    #[test]
    fn reset_discards_the_running_phase() {
        let mut timer = FocusTimer::new(TimerConfig::default(), Companion::Spark);
        let now = start();
        timer.start(now);
        timer.reset();
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.tick(now + TimeDelta::hours(1)), None);
        assert_eq!(timer.next_phase(), FocusPhase::Focus);
    }
}
