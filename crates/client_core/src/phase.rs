//! Coarse progress phase for a streamed search.
//!
//! The tracker is a pure state machine: it never sleeps or spawns. Inputs that
//! want a delayed transition return [`ScheduledPhase`]s inside a
//! [`PhaseEffect`], and the owner arms timers for them (see
//! [`crate::session`]). Timer firings come back through [`PhaseTracker::apply`].

use std::{fmt, time::Duration};

use serde::Serialize;
use tokio::time::Instant;

pub const READING_DELAY: Duration = Duration::from_millis(1500);
pub const ANALYZING_DELAY: Duration = Duration::from_millis(4500);
pub const GENERATING_INTERVAL: Duration = Duration::from_millis(1500);

/// Ordered: a query only ever moves forward through these until it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Input,
    Searching,
    Reading,
    Analyzing,
    Summarizing,
    Generating,
    Citing,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Searching => "searching",
            Self::Reading => "reading",
            Self::Analyzing => "analyzing",
            Self::Summarizing => "summarizing",
            Self::Generating => "generating",
            Self::Citing => "citing",
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Input
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub reading_delay: Duration,
    pub analyzing_delay: Duration,
    pub generating_interval: Duration,
}

impl Default for PhaseTiming {
    fn default() -> Self {
        Self {
            reading_delay: READING_DELAY,
            analyzing_delay: ANALYZING_DELAY,
            generating_interval: GENERATING_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPhase {
    pub phase: Phase,
    pub delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseEffect {
    pub changed_to: Option<Phase>,
    pub schedule: Vec<ScheduledPhase>,
    pub cancel_pending: bool,
}

impl PhaseEffect {
    fn changed(phase: Phase) -> Self {
        Self {
            changed_to: Some(phase),
            ..Self::default()
        }
    }

    fn scheduled(schedule: Vec<ScheduledPhase>) -> Self {
        Self {
            schedule,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed_to.is_none() && self.schedule.is_empty() && !self.cancel_pending
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: Phase,
    narration: bool,
    timing: PhaseTiming,
    analysis_started_at: Option<Instant>,
    generating_scheduled: bool,
}

impl PhaseTracker {
    pub fn new(narration: bool, timing: PhaseTiming) -> Self {
        Self {
            phase: Phase::Input,
            narration,
            timing,
            analysis_started_at: None,
            generating_scheduled: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn narration(&self) -> bool {
        self.narration
    }

    pub fn set_narration(&mut self, narration: bool) {
        self.narration = narration;
    }

    pub fn analysis_started_at(&self) -> Option<Instant> {
        self.analysis_started_at
    }

    pub fn start_query(&mut self) -> PhaseEffect {
        self.phase = Phase::Searching;
        self.analysis_started_at = None;
        self.generating_scheduled = false;
        PhaseEffect {
            changed_to: Some(Phase::Searching),
            schedule: Vec::new(),
            cancel_pending: true,
        }
    }

    pub fn on_documents(&mut self, count: usize) -> PhaseEffect {
        if self.phase.is_idle() {
            return PhaseEffect::default();
        }
        if count == 0 || !self.narration {
            return self.finish();
        }

        PhaseEffect::scheduled(vec![
            ScheduledPhase {
                phase: Phase::Reading,
                delay: self.timing.reading_delay,
            },
            ScheduledPhase {
                phase: Phase::Analyzing,
                delay: self.timing.analyzing_delay,
            },
        ])
    }

    /// Paces the switch to `Generating` onto the next interval boundary
    /// measured from when analysis started, however fast tokens arrive.
    pub fn on_answer(&mut self, now: Instant) -> PhaseEffect {
        if self.phase.is_idle() || self.generating_scheduled || self.phase >= Phase::Generating {
            return PhaseEffect::default();
        }
        let Some(started) = self.analysis_started_at else {
            return PhaseEffect::default();
        };

        let elapsed = now.saturating_duration_since(started);
        self.generating_scheduled = true;
        PhaseEffect::scheduled(vec![ScheduledPhase {
            phase: Phase::Generating,
            delay: delay_to_next_boundary(elapsed, self.timing.generating_interval),
        }])
    }

    pub fn on_relevance(&mut self) -> PhaseEffect {
        if self.phase == Phase::Analyzing {
            self.phase = Phase::Summarizing;
            return PhaseEffect::changed(Phase::Summarizing);
        }
        PhaseEffect::default()
    }

    pub fn on_selected_docs(&mut self) -> PhaseEffect {
        if self.phase == Phase::Generating {
            self.phase = Phase::Citing;
            return PhaseEffect::changed(Phase::Citing);
        }
        PhaseEffect::default()
    }

    /// Terminal for the current query: error, quotes, end of stream, or no
    /// documents. Pending timers must be dropped by the owner.
    pub fn finish(&mut self) -> PhaseEffect {
        let was = self.phase;
        self.phase = Phase::Input;
        self.generating_scheduled = false;
        PhaseEffect {
            changed_to: (was != Phase::Input).then_some(Phase::Input),
            schedule: Vec::new(),
            cancel_pending: true,
        }
    }

    /// Applies a timer that fired at `at`. Returns whether the phase moved.
    pub fn apply(&mut self, phase: Phase, at: Instant) -> bool {
        if self.phase.is_idle() || phase <= self.phase {
            return false;
        }
        self.phase = phase;
        if phase == Phase::Analyzing {
            self.analysis_started_at = Some(at);
        }
        true
    }
}

fn delay_to_next_boundary(elapsed: Duration, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1);
    let elapsed_ms = elapsed.as_millis();
    let boundary = elapsed_ms.div_ceil(interval_ms) * interval_ms;
    Duration::from_millis((boundary - elapsed_ms) as u64)
}

#[cfg(test)]
#[path = "tests/phase_tests.rs"]
mod tests;
