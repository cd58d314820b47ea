use super::*;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn narrated() -> PhaseTracker {
    let mut tracker = PhaseTracker::new(true, PhaseTiming::default());
    tracker.start_query();
    tracker
}

#[test]
fn start_query_enters_searching_and_drops_old_timers() {
    let mut tracker = PhaseTracker::new(false, PhaseTiming::default());
    let effect = tracker.start_query();
    assert_eq!(tracker.phase(), Phase::Searching);
    assert_eq!(effect.changed_to, Some(Phase::Searching));
    assert!(effect.cancel_pending);
}

#[test]
fn documents_schedule_reading_then_analyzing_when_narrated() {
    let mut tracker = narrated();
    let effect = tracker.on_documents(3);
    assert_eq!(
        effect.schedule,
        vec![
            ScheduledPhase {
                phase: Phase::Reading,
                delay: ms(1500)
            },
            ScheduledPhase {
                phase: Phase::Analyzing,
                delay: ms(4500)
            },
        ]
    );
    assert_eq!(tracker.phase(), Phase::Searching);
}

#[test]
fn documents_end_the_sequence_without_narration() {
    let mut tracker = PhaseTracker::new(false, PhaseTiming::default());
    tracker.start_query();
    let effect = tracker.on_documents(5);
    assert_eq!(tracker.phase(), Phase::Input);
    assert_eq!(effect.changed_to, Some(Phase::Input));
    assert!(effect.schedule.is_empty());
}

#[test]
fn zero_documents_finish_immediately_even_when_narrated() {
    let mut tracker = narrated();
    let effect = tracker.on_documents(0);
    assert_eq!(tracker.phase(), Phase::Input);
    assert!(effect.cancel_pending);
    assert!(effect.schedule.is_empty());
    assert!(!tracker.apply(Phase::Reading, Instant::now()));
}

#[test]
fn answer_waits_for_next_interval_boundary_after_analysis() {
    let start = Instant::now();
    let mut tracker = narrated();
    tracker.on_documents(2);
    assert!(tracker.apply(Phase::Reading, start + ms(1500)));
    assert!(tracker.apply(Phase::Analyzing, start + ms(4500)));
    assert_eq!(tracker.analysis_started_at(), Some(start + ms(4500)));

    let effect = tracker.on_answer(start + ms(5000));
    assert_eq!(
        effect.schedule,
        vec![ScheduledPhase {
            phase: Phase::Generating,
            delay: ms(1000)
        }]
    );

    // Only one pacing timer per query.
    assert!(tracker.on_answer(start + ms(5200)).is_noop());
}

#[test]
fn answer_exactly_on_boundary_is_immediate() {
    let start = Instant::now();
    let mut tracker = narrated();
    tracker.apply(Phase::Analyzing, start);
    let effect = tracker.on_answer(start + ms(3000));
    assert_eq!(effect.schedule[0].delay, Duration::ZERO);
}

#[test]
fn answer_before_analysis_schedules_nothing() {
    let mut tracker = narrated();
    tracker.on_documents(1);
    assert!(tracker.on_answer(Instant::now()).is_noop());
}

#[test]
fn timers_never_move_backwards_or_revive_idle() {
    let now = Instant::now();
    let mut tracker = narrated();
    assert!(tracker.apply(Phase::Analyzing, now));
    assert!(!tracker.apply(Phase::Reading, now));
    assert_eq!(tracker.phase(), Phase::Analyzing);

    tracker.finish();
    assert!(!tracker.apply(Phase::Generating, now));
    assert_eq!(tracker.phase(), Phase::Input);
}

#[test]
fn relevance_and_selected_docs_advance_only_from_their_stage() {
    let now = Instant::now();
    let mut tracker = narrated();
    assert!(tracker.on_relevance().is_noop());

    tracker.apply(Phase::Analyzing, now);
    assert_eq!(tracker.on_relevance().changed_to, Some(Phase::Summarizing));

    assert!(tracker.on_selected_docs().is_noop());
    tracker.apply(Phase::Generating, now);
    assert_eq!(tracker.on_selected_docs().changed_to, Some(Phase::Citing));
}

#[test]
fn finish_from_idle_reports_no_change() {
    let mut tracker = PhaseTracker::new(true, PhaseTiming::default());
    let effect = tracker.finish();
    assert_eq!(effect.changed_to, None);
    assert!(effect.cancel_pending);
}

#[test]
fn boundary_helper_rounds_up() {
    assert_eq!(delay_to_next_boundary(ms(500), ms(1500)), ms(1000));
    assert_eq!(delay_to_next_boundary(ms(1501), ms(1500)), ms(1499));
    assert_eq!(delay_to_next_boundary(Duration::ZERO, ms(1500)), Duration::ZERO);
}
