use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Complete,
}

/// Why the timer is not counting. Several reasons can hold at once; the
/// timer stays paused while any of them is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PauseReasons {
    pub attention_lost: bool,
    pub popup_closed: bool,
}

impl PauseReasons {
    pub fn any(&self) -> bool {
        self.attention_lost || self.popup_closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; nothing counted.
    Ignored,
    Counted { elapsed_secs: u64 },
    /// This tick reached the required duration.
    Completed,
}

/// Watch-time counter gating reward eligibility.
///
/// Time is counted in whole ticks, one per second of attended viewing, so
/// rapid pause/resume cycles cannot count the same second twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementTimer {
    phase: TimerPhase,
    required_secs: u64,
    elapsed_secs: u64,
    pause_reasons: PauseReasons,
    popup_seen: bool,
}

impl EngagementTimer {
    pub fn new(required_secs: u64) -> Self {
        Self {
            phase: TimerPhase::Idle,
            required_secs,
            elapsed_secs: 0,
            pause_reasons: PauseReasons::default(),
            popup_seen: false,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn required_secs(&self) -> u64 {
        self.required_secs
    }

    /// Raw counted seconds, for display.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Counted seconds clamped to the requirement, for gating and reporting.
    pub fn credited_secs(&self) -> u64 {
        self.elapsed_secs.min(self.required_secs)
    }

    pub fn remaining_secs(&self) -> u64 {
        self.required_secs.saturating_sub(self.elapsed_secs)
    }

    pub fn pause_reasons(&self) -> PauseReasons {
        self.pause_reasons
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TimerPhase::Complete
    }

    /// Re-evaluates the phase from the current signals. Returns the new
    /// phase when it changed.
    pub fn apply_signals(&mut self, attending: bool, popup_open: bool) -> Option<TimerPhase> {
        if self.phase == TimerPhase::Complete {
            return None;
        }

        self.pause_reasons = PauseReasons {
            attention_lost: !attending,
            popup_closed: !popup_open,
        };
        if popup_open {
            self.popup_seen = true;
        }

        let next = if !self.popup_seen {
            TimerPhase::Idle
        } else if self.pause_reasons.any() {
            TimerPhase::Paused
        } else {
            TimerPhase::Running
        };

        self.transition(next)
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != TimerPhase::Running {
            return TickOutcome::Ignored;
        }

        self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        if self.elapsed_secs >= self.required_secs {
            self.phase = TimerPhase::Complete;
            TickOutcome::Completed
        } else {
            TickOutcome::Counted {
                elapsed_secs: self.elapsed_secs,
            }
        }
    }

    fn transition(&mut self, next: TimerPhase) -> Option<TimerPhase> {
        if next == self.phase {
            return None;
        }
        self.phase = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(required: u64) -> EngagementTimer {
        let mut timer = EngagementTimer::new(required);
        assert_eq!(timer.apply_signals(true, true), Some(TimerPhase::Running));
        timer
    }

    #[test]
    fn stays_idle_until_a_popup_exists() {
        let mut timer = EngagementTimer::new(30);
        assert_eq!(timer.apply_signals(false, false), None);
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.elapsed_secs(), 0);
    }

    #[test]
    fn completes_exactly_at_required_tick() {
        let mut timer = running(30);
        for tick in 1..30 {
            assert_eq!(timer.tick(), TickOutcome::Counted { elapsed_secs: tick });
            assert!(!timer.is_complete());
        }
        assert_eq!(timer.tick(), TickOutcome::Completed);
        assert!(timer.is_complete());
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn paused_interval_is_not_counted() {
        let mut timer = running(30);
        for _ in 0..10 {
            timer.tick();
        }
        assert_eq!(timer.apply_signals(false, true), Some(TimerPhase::Paused));
        for _ in 0..5 {
            assert_eq!(timer.tick(), TickOutcome::Ignored);
        }
        assert_eq!(timer.apply_signals(true, true), Some(TimerPhase::Running));
        for _ in 0..3 {
            timer.tick();
        }
        assert_eq!(timer.elapsed_secs(), 13);
    }

    #[test]
    fn any_pause_reason_keeps_timer_paused() {
        let mut timer = running(30);
        timer.apply_signals(false, false);
        assert_eq!(timer.phase(), TimerPhase::Paused);
        assert!(timer.pause_reasons().attention_lost);
        assert!(timer.pause_reasons().popup_closed);

        // Attention back but popup still closed.
        assert_eq!(timer.apply_signals(true, false), None);
        assert_eq!(timer.phase(), TimerPhase::Paused);
        assert!(!timer.pause_reasons().attention_lost);

        assert_eq!(timer.apply_signals(true, true), Some(TimerPhase::Running));
    }

    #[test]
    fn repeated_signals_do_not_double_transition() {
        let mut timer = running(30);
        assert_eq!(timer.apply_signals(true, true), None);
        timer.tick();
        assert_eq!(timer.apply_signals(false, true), Some(TimerPhase::Paused));
        assert_eq!(timer.apply_signals(false, true), None);
        assert_eq!(timer.apply_signals(true, true), Some(TimerPhase::Running));
        assert_eq!(timer.elapsed_secs(), 1);
    }

    #[test]
    fn complete_is_terminal() {
        let mut timer = running(2);
        timer.tick();
        timer.tick();
        assert!(timer.is_complete());

        assert_eq!(timer.apply_signals(false, false), None);
        assert_eq!(timer.apply_signals(true, true), None);
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.phase(), TimerPhase::Complete);
        assert_eq!(timer.elapsed_secs(), 2);
    }

    #[test]
    fn running_iff_attending_and_popup_open() {
        let mut timer = EngagementTimer::new(1_000);
        timer.apply_signals(false, true);
        let combos = [
            (true, true),
            (false, true),
            (true, false),
            (false, false),
            (true, true),
            (true, false),
            (false, true),
        ];
        let mut last_elapsed = 0;
        for (attending, popup_open) in combos.iter().copied().cycle().take(50) {
            timer.apply_signals(attending, popup_open);
            assert_eq!(
                timer.phase() == TimerPhase::Running,
                attending && popup_open
            );
            timer.tick();
            assert!(timer.elapsed_secs() >= last_elapsed);
            last_elapsed = timer.elapsed_secs();
        }
    }

    #[test]
    fn zero_requirement_completes_on_first_running_tick() {
        let mut timer = running(0);
        assert_eq!(timer.tick(), TickOutcome::Completed);
    }
}
