use std::sync::mpsc::Sender;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::navigator::SessionNavigator;
use crate::runtime::{ClockId, ClockTask, RehearsalEvent, Ticker};
use crate::store::{PresentationId, PresentationStore, SlideField, SlideRecord};
use crate::time_format;
use crate::timing::{TimeEntry, TimeRow, TimingTracker};

/// Navigation requested by the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Advance,
    Retreat,
    First,
    Last,
    End,
}

impl Command {
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::End);
        }
        match key.code {
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char(' ') | KeyCode::Char('l') => {
                Some(Command::Advance)
            }
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('h') => Some(Command::Retreat),
            KeyCode::Home => Some(Command::First),
            KeyCode::End => Some(Command::Last),
            KeyCode::Esc | KeyCode::Char('q') => Some(Command::End),
            _ => None,
        }
    }
}

/// Whether an edit reached durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    /// Applied in memory only; the store rejected the write.
    Unsaved,
}

/// Outcome of feeding one event to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Updated,
    Ended(Vec<TimeEntry>),
}

/// Everything a shell needs to draw the current state, pre-formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub title: String,
    pub slide_count: usize,
    pub is_active: bool,
    pub current_index: Option<usize>,
    pub current_image: Option<String>,
    pub elapsed: String,
    pub is_warning: bool,
    pub speaker_view: bool,
    /// Only filled in speaker view
    pub speaker_note: Option<String>,
    pub rows: Vec<TimeRow>,
    pub total_planned: String,
    pub total_actual: String,
}

struct ClockSource {
    sink: Sender<RehearsalEvent>,
    ticker: Box<dyn Ticker>,
}

/// Binds input and the rehearsal clock to one presentation's timing state.
pub struct RehearsalController<S: PresentationStore> {
    store: S,
    presentation_id: PresentationId,
    title: String,
    image_refs: Vec<String>,
    speaker_notes: Vec<String>,
    tracker: TimingTracker,
    navigator: SessionNavigator,
    speaker_view: bool,
    clock_source: Option<ClockSource>,
    clock: Option<ClockTask>,
}

impl<S: PresentationStore> RehearsalController<S> {
    /// Loads a stored presentation.
    pub fn load(store: S, presentation_id: PresentationId) -> Result<Self> {
        let title = store.presentation(presentation_id)?.title;
        let slides = store.fetch_slides(presentation_id)?;
        Ok(Self::new(store, presentation_id, title, slides))
    }

    pub fn new(
        store: S,
        presentation_id: PresentationId,
        title: String,
        slides: Vec<SlideRecord>,
    ) -> Self {
        let tracker = TimingTracker::from_entries(
            slides
                .iter()
                .map(|slide| TimeEntry::new(slide.planned_time, slide.actual_time)),
        );
        let (image_refs, speaker_notes) = slides
            .into_iter()
            .map(|slide| (slide.image_ref, slide.speaker_note))
            .unzip();

        Self {
            store,
            presentation_id,
            title,
            image_refs,
            speaker_notes,
            tracker,
            navigator: SessionNavigator::new(),
            speaker_view: false,
            clock_source: None,
            clock: None,
        }
    }

    /// Enables the periodic clock: every session started from now on gets
    /// its own [`ClockTask`] feeding `sink`.
    pub fn with_clock(mut self, sink: Sender<RehearsalEvent>, ticker: impl Ticker) -> Self {
        self.clock_source = Some(ClockSource {
            sink,
            ticker: Box::new(ticker),
        });
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn presentation_id(&self) -> PresentationId {
        self.presentation_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn slide_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn tracker(&self) -> &TimingTracker {
        &self.tracker
    }

    pub fn navigator(&self) -> &SessionNavigator {
        &self.navigator
    }

    pub fn is_active(&self) -> bool {
        self.navigator.is_running()
    }

    pub fn speaker_note(&self, index: usize) -> Option<&str> {
        self.speaker_notes.get(index).map(String::as_str)
    }

    pub fn clock_id(&self) -> Option<ClockId> {
        self.clock.as_ref().map(ClockTask::id)
    }

    pub fn begin_session(&mut self, initial_index: usize, speaker_view: bool) -> Result<()> {
        self.navigator.start(initial_index, &self.tracker)?;
        self.speaker_view = speaker_view;
        if let Some(source) = &self.clock_source {
            self.clock = Some(ClockTask::spawn(source.ticker.as_ref(), source.sink.clone()));
        }
        info!(
            "rehearsing '{}' from slide {}{}",
            self.title,
            initial_index + 1,
            if speaker_view { " in speaker view" } else { "" }
        );
        Ok(())
    }

    /// Counts one second on the current slide.
    pub fn tick(&mut self) -> bool {
        self.navigator.tick(&self.tracker)
    }

    pub fn advance(&mut self) -> Result<bool> {
        self.navigator.advance(&mut self.tracker)
    }

    pub fn retreat(&mut self) -> Result<bool> {
        self.navigator.retreat(&mut self.tracker)
    }

    pub fn jump_to(&mut self, index: usize) -> Result<bool> {
        self.navigator.jump_to(index, &mut self.tracker)
    }

    /// Stops the clock, flushes the current slide and writes every actual
    /// time to the store. Returns the finalized table; when no session was
    /// running it is simply the current table.
    pub fn end_session(&mut self) -> Vec<TimeEntry> {
        // release the clock before anything else so no tick outlives the session
        self.clock = None;

        let Some(snapshot) = self.navigator.stop(&mut self.tracker) else {
            return self.tracker.snapshot();
        };

        for (index, entry) in snapshot.iter().enumerate() {
            self.persist(index, SlideField::ActualTime(entry.actual_seconds()));
        }
        info!(
            "rehearsal of '{}' finished: {} actual vs {} planned",
            self.title,
            time_format::format(self.tracker.total_actual()),
            time_format::format(self.tracker.total_planned())
        );
        snapshot
    }

    pub fn handle_command(&mut self, command: Command) -> Result<EventOutcome> {
        if !self.is_active() {
            return Ok(EventOutcome::Ignored);
        }
        let moved = match command {
            Command::Advance => self.advance()?,
            Command::Retreat => self.retreat()?,
            Command::First => self.jump_to(0)?,
            Command::Last => self.jump_to(self.slide_count().saturating_sub(1))?,
            Command::End => return Ok(EventOutcome::Ended(self.end_session())),
        };
        Ok(if moved {
            EventOutcome::Updated
        } else {
            EventOutcome::Ignored
        })
    }

    /// Routes one runtime event. Ticks from any clock other than the
    /// current session's are dropped.
    pub fn handle_event(&mut self, event: RehearsalEvent) -> Result<EventOutcome> {
        match event {
            RehearsalEvent::Tick(id) => {
                if self.clock_id() != Some(id) {
                    return Ok(EventOutcome::Ignored);
                }
                Ok(if self.tick() {
                    EventOutcome::Updated
                } else {
                    EventOutcome::Ignored
                })
            }
            RehearsalEvent::Key(key) => match Command::from_key(&key) {
                Some(command) => self.handle_command(command),
                None => Ok(EventOutcome::Ignored),
            },
            RehearsalEvent::Resize => Ok(EventOutcome::Updated),
        }
    }

    /// Sets a slide's budget from `HH:MM:SS`. Invalid input leaves the old
    /// value in place.
    pub fn edit_planned_time(&mut self, index: usize, value: &str) -> Result<SaveStatus> {
        let seconds = time_format::parse(value)?;
        self.tracker.set_planned_time(index, seconds)?;
        self.navigator.refresh_warning(&self.tracker);
        Ok(self.persist(index, SlideField::PlannedTime(seconds)))
    }

    pub fn edit_speaker_note(&mut self, index: usize, text: &str) -> Result<SaveStatus> {
        let len = self.speaker_notes.len();
        let note = self
            .speaker_notes
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        *note = text.to_string();
        Ok(self.persist(index, SlideField::SpeakerNote(text.to_string())))
    }

    /// Clears all actual times, keeping budgets. Not allowed mid-session.
    pub fn reset_all_times(&mut self) -> Result<SaveStatus> {
        if self.is_active() {
            return Err(Error::SessionAlreadyActive);
        }
        self.tracker.reset_all();
        let mut status = SaveStatus::Saved;
        for index in 0..self.tracker.len() {
            if self.persist(index, SlideField::ActualTime(0)) == SaveStatus::Unsaved {
                status = SaveStatus::Unsaved;
            }
        }
        Ok(status)
    }

    pub fn rename(&mut self, title: &str) -> SaveStatus {
        self.title = title.to_string();
        match self.store.update_presentation_title(self.presentation_id, title) {
            Ok(()) => SaveStatus::Saved,
            Err(err) => {
                error!("failed to rename presentation {}: {err}", self.presentation_id);
                SaveStatus::Unsaved
            }
        }
    }

    pub fn view(&self) -> SessionView {
        let session = self.navigator.session();
        let current_index = session.map(|s| s.current_index());
        let speaker_note = match (self.speaker_view, current_index) {
            (true, Some(index)) => self.speaker_notes.get(index).cloned(),
            _ => None,
        };

        SessionView {
            title: self.title.clone(),
            slide_count: self.tracker.len(),
            is_active: session.is_some(),
            current_index,
            current_image: current_index.and_then(|i| self.image_refs.get(i).cloned()),
            elapsed: time_format::format(session.map_or(0, |s| s.elapsed_on_current_slide())),
            is_warning: session.is_some_and(|s| s.is_warning()),
            speaker_view: self.speaker_view,
            speaker_note,
            rows: self.tracker.rows(),
            total_planned: time_format::format(self.tracker.total_planned()),
            total_actual: time_format::format(self.tracker.total_actual()),
        }
    }

    fn persist(&self, index: usize, field: SlideField) -> SaveStatus {
        match self
            .store
            .update_slide_field(self.presentation_id, index, &field)
        {
            Ok(()) => SaveStatus::Saved,
            Err(err) => {
                error!(
                    "failed to save {field} for slide {} of presentation {}: {err}",
                    index + 1,
                    self.presentation_id
                );
                SaveStatus::Unsaved
            }
        }
    }
}

impl<S: PresentationStore> Drop for RehearsalController<S> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("controller dropped mid-rehearsal, flushing session");
            self.end_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::identity::Identity;
    use crate::store::{PresentationSummary, StoreResult};
    use crate::deck::SlideImage;
    use assert_matches::assert_matches;
    use std::cell::RefCell;

    /// Records writes and can be told to fail them.
    #[derive(Default)]
    struct RecordingStore {
        writes: RefCell<Vec<(usize, SlideField)>>,
        fail_writes: bool,
    }

    impl PresentationStore for RecordingStore {
        fn create_presentation(&self, _: &Identity, _: &str) -> StoreResult<PresentationId> {
            Ok(1)
        }

        fn store_slide_images(&self, _: PresentationId, _: &[SlideImage]) -> StoreResult<Vec<String>> {
            Ok(vec![])
        }

        fn fetch_slides(&self, _: PresentationId) -> StoreResult<Vec<SlideRecord>> {
            Ok(vec![])
        }

        fn update_slide_field(
            &self,
            id: PresentationId,
            slide_index: usize,
            field: &SlideField,
        ) -> StoreResult<()> {
            if self.fail_writes {
                return Err(PersistenceError::NotFound(id));
            }
            self.writes.borrow_mut().push((slide_index, field.clone()));
            Ok(())
        }

        fn update_presentation_title(&self, id: PresentationId, _: &str) -> StoreResult<()> {
            if self.fail_writes {
                return Err(PersistenceError::NotFound(id));
            }
            Ok(())
        }

        fn presentation(&self, id: PresentationId) -> StoreResult<PresentationSummary> {
            Err(PersistenceError::NotFound(id))
        }

        fn list_presentations(&self, _: &Identity) -> StoreResult<Vec<PresentationSummary>> {
            Ok(vec![])
        }

        fn delete_presentation(&self, id: PresentationId) -> StoreResult<()> {
            Err(PersistenceError::NotFound(id))
        }
    }

    fn slides(n: usize) -> Vec<SlideRecord> {
        (0..n)
            .map(|i| SlideRecord {
                image_ref: format!("/slides/{i}.jpg"),
                speaker_note: format!("note {i}"),
                ..SlideRecord::default()
            })
            .collect()
    }

    fn controller(n: usize) -> RehearsalController<RecordingStore> {
        RehearsalController::new(RecordingStore::default(), 1, "Demo".into(), slides(n))
    }

    fn key(code: KeyCode) -> RehearsalEvent {
        RehearsalEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_key_bindings() {
        let k = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(Command::from_key(&k(KeyCode::Right)), Some(Command::Advance));
        assert_eq!(Command::from_key(&k(KeyCode::Left)), Some(Command::Retreat));
        assert_eq!(Command::from_key(&k(KeyCode::Esc)), Some(Command::End));
        assert_eq!(
            Command::from_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Command::End)
        );
        assert_eq!(Command::from_key(&k(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_view_when_idle() {
        let ctl = controller(2);
        let view = ctl.view();
        assert!(!view.is_active);
        assert_eq!(view.current_index, None);
        assert_eq!(view.elapsed, "00:00:00");
        assert_eq!(view.rows.len(), 2);
    }

    #[test]
    fn test_session_round_trip_persists_actual_times() {
        let mut ctl = controller(3);
        ctl.begin_session(0, false).unwrap();
        for _ in 0..5 {
            ctl.tick();
        }
        ctl.advance().unwrap();
        ctl.tick();
        let snapshot = ctl.end_session();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].actual_seconds(), 5);
        assert_eq!(snapshot[1].actual_seconds(), 1);
        let writes = ctl.store().writes.borrow();
        assert!(writes.contains(&(0, SlideField::ActualTime(5))));
        assert!(writes.contains(&(1, SlideField::ActualTime(1))));
    }

    #[test]
    fn test_escape_ends_session() {
        let mut ctl = controller(2);
        ctl.begin_session(1, false).unwrap();
        ctl.tick();
        let outcome = ctl.handle_event(key(KeyCode::Esc)).unwrap();
        assert_matches!(outcome, EventOutcome::Ended(entries) if entries[1].actual_seconds() == 1);
        assert!(!ctl.is_active());
    }

    #[test]
    fn test_arrow_keys_navigate() {
        let mut ctl = controller(2);
        ctl.begin_session(0, false).unwrap();
        assert_eq!(ctl.handle_event(key(KeyCode::Right)).unwrap(), EventOutcome::Updated);
        assert_eq!(ctl.view().current_index, Some(1));
        assert_eq!(ctl.handle_event(key(KeyCode::Right)).unwrap(), EventOutcome::Ignored);
        assert_eq!(ctl.handle_event(key(KeyCode::Left)).unwrap(), EventOutcome::Updated);
        assert_eq!(ctl.view().current_index, Some(0));
    }

    #[test]
    fn test_home_and_end_jump() {
        let mut ctl = controller(4);
        ctl.begin_session(1, false).unwrap();
        ctl.tick();
        assert_eq!(ctl.handle_event(key(KeyCode::End)).unwrap(), EventOutcome::Updated);
        assert_eq!(ctl.view().current_index, Some(3));
        assert_eq!(ctl.tracker().entry(1).unwrap().actual_seconds(), 1);
        assert_eq!(ctl.handle_event(key(KeyCode::End)).unwrap(), EventOutcome::Ignored);
        assert_eq!(ctl.handle_event(key(KeyCode::Home)).unwrap(), EventOutcome::Updated);
        assert_eq!(ctl.view().current_index, Some(0));
    }

    #[test]
    fn test_ticks_without_matching_clock_are_ignored() {
        let mut ctl = controller(1);
        ctl.begin_session(0, false).unwrap();
        let stray = {
            let (es, _tx) = crate::runtime::TestEventSource::new();
            let clock = ClockTask::spawn(
                &crate::runtime::FixedTicker::new(std::time::Duration::from_secs(60)),
                crate::runtime::EventSource::sender(&es),
            );
            clock.id()
        };
        assert_eq!(
            ctl.handle_event(RehearsalEvent::Tick(stray)).unwrap(),
            EventOutcome::Ignored
        );
        assert_eq!(ctl.view().elapsed, "00:00:00");
    }

    #[test]
    fn test_edit_planned_time() {
        let mut ctl = controller(2);
        assert_eq!(ctl.edit_planned_time(1, "00:01:40").unwrap(), SaveStatus::Saved);
        assert_eq!(ctl.tracker().entry(1).unwrap().planned_seconds(), 100);
        assert!(ctl
            .store()
            .writes
            .borrow()
            .contains(&(1, SlideField::PlannedTime(100))));
    }

    #[test]
    fn test_invalid_edit_keeps_previous_value() {
        let mut ctl = controller(2);
        ctl.edit_planned_time(0, "00:00:30").unwrap();
        assert_matches!(ctl.edit_planned_time(0, "30s"), Err(Error::InvalidFormat(_)));
        assert_matches!(
            ctl.edit_planned_time(5, "00:00:10"),
            Err(Error::IndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(ctl.tracker().entry(0).unwrap().planned_seconds(), 30);
    }

    #[test]
    fn test_store_failure_keeps_edit_in_memory() {
        let store = RecordingStore {
            fail_writes: true,
            ..RecordingStore::default()
        };
        let mut ctl = RehearsalController::new(store, 1, "Demo".into(), slides(1));
        assert_eq!(ctl.edit_planned_time(0, "0:00:10").unwrap(), SaveStatus::Unsaved);
        assert_eq!(ctl.tracker().entry(0).unwrap().planned_seconds(), 10);

        ctl.begin_session(0, false).unwrap();
        ctl.tick();
        let snapshot = ctl.end_session();
        assert_eq!(snapshot[0].actual_seconds(), 1);
    }

    #[test]
    fn test_speaker_note_only_shown_in_speaker_view() {
        let mut ctl = controller(2);
        ctl.edit_speaker_note(0, "smile").unwrap();
        ctl.begin_session(0, false).unwrap();
        assert_eq!(ctl.view().speaker_note, None);
        ctl.end_session();

        ctl.begin_session(0, true).unwrap();
        assert_eq!(ctl.view().speaker_note.as_deref(), Some("smile"));
        assert_eq!(ctl.view().current_image.as_deref(), Some("/slides/0.jpg"));
    }

    #[test]
    fn test_speaker_view_does_not_change_timing() {
        let mut normal = controller(2);
        let mut speaker = controller(2);
        normal.begin_session(0, false).unwrap();
        speaker.begin_session(0, true).unwrap();
        for _ in 0..3 {
            normal.tick();
            speaker.tick();
        }
        assert_eq!(normal.end_session(), speaker.end_session());
    }

    #[test]
    fn test_edit_speaker_note_out_of_range() {
        let mut ctl = controller(1);
        assert_matches!(
            ctl.edit_speaker_note(1, "x"),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_reset_all_times() {
        let mut ctl = controller(2);
        ctl.edit_planned_time(0, "00:00:20").unwrap();
        ctl.begin_session(0, false).unwrap();
        ctl.tick();
        assert_matches!(ctl.reset_all_times(), Err(Error::SessionAlreadyActive));
        ctl.end_session();

        assert_eq!(ctl.reset_all_times().unwrap(), SaveStatus::Saved);
        let entry = *ctl.tracker().entry(0).unwrap();
        assert_eq!(entry.actual_seconds(), 0);
        assert_eq!(entry.difference(), -20);
    }

    #[test]
    fn test_end_session_when_idle_returns_table() {
        let mut ctl = controller(4);
        assert_eq!(ctl.end_session().len(), 4);
        assert!(ctl.store().writes.borrow().is_empty());
    }

    #[test]
    fn test_rename_reports_store_failure() {
        let store = RecordingStore {
            fail_writes: true,
            ..RecordingStore::default()
        };
        let mut ctl = RehearsalController::new(store, 1, "Demo".into(), slides(1));
        assert_eq!(ctl.rename("Better"), SaveStatus::Unsaved);
        assert_eq!(ctl.title(), "Better");
    }
}
