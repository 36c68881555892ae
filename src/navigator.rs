use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::timing::{TimeEntry, TimingTracker};
use crate::warning;

/// Snapshot of a rehearsal in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    current_index: usize,
    elapsed_on_current_slide: u64,
    is_warning: bool,
    slide_count: usize,
    /// Seconds committed per slide during this session only
    visit_totals: Vec<u64>,
}

impl SessionState {
    fn new(initial_index: usize, slide_count: usize) -> Self {
        Self {
            current_index: initial_index,
            elapsed_on_current_slide: 0,
            is_warning: false,
            slide_count,
            visit_totals: vec![0; slide_count],
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn elapsed_on_current_slide(&self) -> u64 {
        self.elapsed_on_current_slide
    }

    pub fn is_warning(&self) -> bool {
        self.is_warning
    }

    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    pub fn is_first_slide(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last_slide(&self) -> bool {
        self.current_index + 1 >= self.slide_count
    }

    /// What the current slide's actual time would be if committed now.
    pub fn pending_total(&self) -> u64 {
        self.visit_totals[self.current_index].saturating_add(self.elapsed_on_current_slide)
    }

    fn evaluate_warning(&mut self, tracker: &TimingTracker) {
        let planned = tracker
            .entry(self.current_index)
            .map(TimeEntry::planned_seconds)
            .unwrap_or(0);
        self.is_warning = warning::evaluate(self.elapsed_on_current_slide, planned);
    }

    /// Writes the time spent on the current slide into the tracker and starts
    /// a fresh visit.
    fn commit(&mut self, tracker: &mut TimingTracker) -> Result<()> {
        let total = self.pending_total();
        tracker.set_actual_time(self.current_index, total)?;
        debug!(
            "committed {}s on slide {} (session total {}s)",
            self.elapsed_on_current_slide,
            self.current_index + 1,
            total
        );
        self.visit_totals[self.current_index] = total;
        self.elapsed_on_current_slide = 0;
        self.is_warning = false;
        Ok(())
    }

    fn move_to(&mut self, index: usize, tracker: &mut TimingTracker) -> Result<()> {
        self.commit(tracker)?;
        self.current_index = index;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NavigatorState {
    #[default]
    Idle,
    Running(SessionState),
}

/// Drives slide navigation for one rehearsal and keeps the timing table in
/// step with it.
///
/// The navigator owns only the session snapshot; the time table is passed in
/// by whoever owns it, so edits made between sessions are seen by the next
/// one.
#[derive(Debug, Clone, Default)]
pub struct SessionNavigator {
    state: NavigatorState,
}

impl SessionNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &NavigatorState {
        &self.state
    }

    pub fn session(&self) -> Option<&SessionState> {
        match &self.state {
            NavigatorState::Running(session) => Some(session),
            NavigatorState::Idle => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, NavigatorState::Running(_))
    }

    pub fn start(&mut self, initial_index: usize, tracker: &TimingTracker) -> Result<()> {
        if self.is_running() {
            return Err(Error::SessionAlreadyActive);
        }
        if tracker.is_empty() {
            return Err(Error::EmptyDeck);
        }
        if initial_index >= tracker.len() {
            return Err(Error::IndexOutOfRange {
                index: initial_index,
                len: tracker.len(),
            });
        }

        info!(
            "rehearsal started on slide {} of {}",
            initial_index + 1,
            tracker.len()
        );
        self.state = NavigatorState::Running(SessionState::new(initial_index, tracker.len()));
        Ok(())
    }

    /// Adds one second to the current slide. Returns false when idle.
    pub fn tick(&mut self, tracker: &TimingTracker) -> bool {
        let NavigatorState::Running(session) = &mut self.state else {
            return false;
        };
        session.elapsed_on_current_slide = session.elapsed_on_current_slide.saturating_add(1);
        session.evaluate_warning(tracker);
        true
    }

    /// Re-derives the warning flag, e.g. after the current slide's budget
    /// was edited mid-session.
    pub fn refresh_warning(&mut self, tracker: &TimingTracker) {
        if let NavigatorState::Running(session) = &mut self.state {
            session.evaluate_warning(tracker);
        }
    }

    /// Moves to the next slide. Returns whether the slide changed.
    pub fn advance(&mut self, tracker: &mut TimingTracker) -> Result<bool> {
        let NavigatorState::Running(session) = &mut self.state else {
            return Ok(false);
        };
        if session.is_last_slide() {
            return Ok(false);
        }
        let next = session.current_index + 1;
        session.move_to(next, tracker)?;
        Ok(true)
    }

    /// Moves to the previous slide. Returns whether the slide changed.
    pub fn retreat(&mut self, tracker: &mut TimingTracker) -> Result<bool> {
        let NavigatorState::Running(session) = &mut self.state else {
            return Ok(false);
        };
        if session.is_first_slide() {
            return Ok(false);
        }
        let previous = session.current_index - 1;
        session.move_to(previous, tracker)?;
        Ok(true)
    }

    /// Jumps straight to `index`, committing the outgoing slide.
    pub fn jump_to(&mut self, index: usize, tracker: &mut TimingTracker) -> Result<bool> {
        let NavigatorState::Running(session) = &mut self.state else {
            return Ok(false);
        };
        if index >= session.slide_count {
            return Err(Error::IndexOutOfRange {
                index,
                len: session.slide_count,
            });
        }
        if index == session.current_index {
            return Ok(false);
        }
        session.move_to(index, tracker)?;
        Ok(true)
    }

    /// Ends the session, flushing the current slide's elapsed time, and
    /// returns the full table. `None` when no session was running.
    pub fn stop(&mut self, tracker: &mut TimingTracker) -> Option<Vec<TimeEntry>> {
        let NavigatorState::Running(mut session) = std::mem::take(&mut self.state) else {
            return None;
        };
        if let Err(err) = session.commit(tracker) {
            error!("failed to commit final slide time: {err}");
        }
        info!(
            "rehearsal stopped on slide {} of {}",
            session.current_index + 1,
            session.slide_count
        );
        Some(tracker.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn running(slides: usize, at: usize) -> (SessionNavigator, TimingTracker) {
        let tracker = TimingTracker::new(slides);
        let mut nav = SessionNavigator::new();
        nav.start(at, &tracker).unwrap();
        (nav, tracker)
    }

    fn ticks(nav: &mut SessionNavigator, tracker: &TimingTracker, n: u64) {
        for _ in 0..n {
            nav.tick(tracker);
        }
    }

    #[test]
    fn test_start_sets_index_and_zero_elapsed() {
        let (nav, _) = running(3, 1);
        let session = nav.session().unwrap();
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.elapsed_on_current_slide(), 0);
        assert!(!session.is_warning());
    }

    #[test]
    fn test_start_rejects_bad_index_and_empty_deck() {
        let mut nav = SessionNavigator::new();
        assert_matches!(
            nav.start(3, &TimingTracker::new(3)),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_matches!(nav.start(0, &TimingTracker::new(0)), Err(Error::EmptyDeck));
        assert!(!nav.is_running());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (mut nav, tracker) = running(3, 0);
        assert_matches!(nav.start(0, &tracker), Err(Error::SessionAlreadyActive));
    }

    #[test]
    fn test_retreat_at_first_slide_is_noop() {
        let (mut nav, mut tracker) = running(3, 0);
        ticks(&mut nav, &tracker, 4);
        assert!(!nav.retreat(&mut tracker).unwrap());
        let session = nav.session().unwrap();
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.elapsed_on_current_slide(), 4);
    }

    #[test]
    fn test_advance_at_last_slide_is_noop() {
        let (mut nav, mut tracker) = running(3, 2);
        assert!(!nav.advance(&mut tracker).unwrap());
        assert_eq!(nav.session().unwrap().current_index(), 2);
    }

    #[test]
    fn test_advance_commits_outgoing_slide() {
        let (mut nav, mut tracker) = running(3, 0);
        ticks(&mut nav, &tracker, 12);
        assert!(nav.advance(&mut tracker).unwrap());

        assert_eq!(tracker.entry(0).unwrap().actual_seconds(), 12);
        let session = nav.session().unwrap();
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.elapsed_on_current_slide(), 0);
    }

    #[test]
    fn test_retreat_commits_outgoing_slide() {
        let (mut nav, mut tracker) = running(3, 2);
        ticks(&mut nav, &tracker, 7);
        assert!(nav.retreat(&mut tracker).unwrap());
        assert_eq!(tracker.entry(2).unwrap().actual_seconds(), 7);
        assert_eq!(nav.session().unwrap().current_index(), 1);
        assert_eq!(nav.session().unwrap().elapsed_on_current_slide(), 0);
    }

    #[test]
    fn test_revisits_accumulate_within_a_session() {
        let (mut nav, mut tracker) = running(2, 0);
        ticks(&mut nav, &tracker, 10);
        nav.advance(&mut tracker).unwrap();
        ticks(&mut nav, &tracker, 3);
        nav.retreat(&mut tracker).unwrap();
        ticks(&mut nav, &tracker, 5);
        assert_eq!(nav.session().unwrap().pending_total(), 15);
        nav.stop(&mut tracker).unwrap();
        assert_eq!(tracker.entry(0).unwrap().actual_seconds(), 15);
        assert_eq!(tracker.entry(1).unwrap().actual_seconds(), 3);
    }

    #[test]
    fn test_new_session_does_not_inherit_visit_totals() {
        let (mut nav, mut tracker) = running(1, 0);
        ticks(&mut nav, &tracker, 30);
        nav.stop(&mut tracker);

        nav.start(0, &tracker).unwrap();
        ticks(&mut nav, &tracker, 4);
        nav.stop(&mut tracker);
        assert_eq!(tracker.entry(0).unwrap().actual_seconds(), 4);
    }

    #[test]
    fn test_unvisited_slides_keep_previous_actual_time() {
        let mut tracker = TimingTracker::new(3);
        tracker.set_actual_time(2, 42).unwrap();
        let mut nav = SessionNavigator::new();
        nav.start(0, &tracker).unwrap();
        ticks(&mut nav, &tracker, 1);
        let snapshot = nav.stop(&mut tracker).unwrap();
        assert_eq!(snapshot[2].actual_seconds(), 42);
    }

    #[test]
    fn test_warning_window_follows_planned_time() {
        let mut tracker = TimingTracker::new(2);
        tracker.set_planned_time(0, 100).unwrap();
        let mut nav = SessionNavigator::new();
        nav.start(0, &tracker).unwrap();

        for tick in 1..=100u64 {
            nav.tick(&tracker);
            let warn = nav.session().unwrap().is_warning();
            assert_eq!(warn, (80..100).contains(&tick), "tick {tick}");
        }
    }

    #[test]
    fn test_navigation_clears_warning() {
        let mut tracker = TimingTracker::new(2);
        tracker.set_planned_time(0, 10).unwrap();
        let mut nav = SessionNavigator::new();
        nav.start(0, &tracker).unwrap();
        ticks(&mut nav, &tracker, 9);
        assert!(nav.session().unwrap().is_warning());
        nav.advance(&mut tracker).unwrap();
        assert!(!nav.session().unwrap().is_warning());
    }

    #[test]
    fn test_refresh_warning_after_budget_edit() {
        let (mut nav, mut tracker) = running(1, 0);
        ticks(&mut nav, &tracker, 9);
        assert!(!nav.session().unwrap().is_warning());
        tracker.set_planned_time(0, 10).unwrap();
        nav.refresh_warning(&tracker);
        assert!(nav.session().unwrap().is_warning());
    }

    #[test]
    fn test_jump_to() {
        let (mut nav, mut tracker) = running(4, 0);
        ticks(&mut nav, &tracker, 2);
        assert!(nav.jump_to(3, &mut tracker).unwrap());
        assert_eq!(tracker.entry(0).unwrap().actual_seconds(), 2);
        assert_eq!(nav.session().unwrap().current_index(), 3);
        assert!(!nav.jump_to(3, &mut tracker).unwrap());
        assert_matches!(
            nav.jump_to(4, &mut tracker),
            Err(Error::IndexOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn test_idle_operations_are_noops() {
        let mut tracker = TimingTracker::new(2);
        let mut nav = SessionNavigator::new();
        assert!(!nav.tick(&tracker));
        assert!(!nav.advance(&mut tracker).unwrap());
        assert!(!nav.retreat(&mut tracker).unwrap());
        assert!(nav.stop(&mut tracker).is_none());
        assert_eq!(tracker, TimingTracker::new(2));
    }

    #[test]
    fn test_stop_flushes_current_slide_and_goes_idle() {
        let (mut nav, mut tracker) = running(3, 1);
        ticks(&mut nav, &tracker, 25);
        let snapshot = nav.stop(&mut tracker).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1].actual_seconds(), 25);
        assert_eq!(*nav.state(), NavigatorState::Idle);
    }
}
