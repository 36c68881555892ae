mod ui;

use std::{
    fs::OpenOptions,
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{bail, Context};
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use log::{error, info, LevelFilter};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use slideflow::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    controller::{EventOutcome, RehearsalController, SaveStatus},
    deck::{DeckConverter, PageRenderer, RasterDocument, RasterPageRenderer, SlideImage},
    identity::Identity,
    pdf::{is_pdf, PdfDocument, PdfPageRenderer},
    runtime::{CrosstermEventSource, EventSource, FixedTicker, RehearsalEvent, Runner},
    store::{PresentationId, PresentationStore, SqliteStore},
    time_format,
};

const REDRAW_INTERVAL_MS: u64 = 100;

/// rehearse slide decks against a per-slide time budget
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Import a slide deck, give every slide a time budget and rehearse it with a running clock that warns you before each slide overruns."
)]
pub struct Cli {
    /// act as this user instead of the one from the config or environment
    #[clap(short = 'u', long, global = true)]
    user: Option<String>,

    /// where the database and slide images live
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// use this config file instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// convert a PDF or page images into a new presentation
    Import {
        /// a single PDF, page image files in order, or a directory of them
        #[clap(required = true)]
        pages: Vec<PathBuf>,

        /// presentation title (defaults to the file or directory name)
        #[clap(short, long)]
        title: Option<String>,
    },
    /// list your presentations, newest first
    List,
    /// print the timing table of a presentation
    Show {
        id: PresentationId,

        /// print the raw per-slide seconds as JSON
        #[clap(long)]
        json: bool,
    },
    /// set the planned time of a slide
    Plan {
        id: PresentationId,
        /// 1-based slide number
        slide: usize,
        /// HH:MM:SS
        time: String,
    },
    /// set the speaker note of a slide
    Note {
        id: PresentationId,
        /// 1-based slide number
        slide: usize,
        text: String,
    },
    /// clear all actual times, keeping the plan
    Reset { id: PresentationId },
    /// change the title of a presentation
    Rename { id: PresentationId, title: String },
    /// delete a presentation and its slide images
    Delete { id: PresentationId },
    /// print the settings, changing any that are given
    Config {
        /// store presentations under this user by default
        #[clap(long)]
        owner: Option<String>,

        /// JPEG quality (1-100) of imported slides
        #[clap(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        jpeg_quality: Option<u8>,

        /// start rehearsals from the editor in speaker view
        #[clap(long)]
        speaker_view: Option<bool>,
    },
    /// open the timing editor and rehearse
    Rehearse {
        id: PresentationId,
        /// start rehearsing right away from this 1-based slide
        #[clap(short, long)]
        from: Option<usize>,

        /// show speaker notes while rehearsing
        #[clap(short, long)]
        speaker: bool,
    },
}

/// Everything a subcommand needs, resolved once from flags and config.
struct AppContext {
    dirs: AppDirs,
    config_store: FileConfigStore,
    config: Config,
    identity: Identity,
}

impl AppContext {
    fn resolve(cli: &Cli) -> Self {
        let config_store = match &cli.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let config = config_store.load();
        let data_dir = cli.data_dir.as_deref().or(config.data_dir.as_deref());
        let dirs = AppDirs::resolve(data_dir);
        let identity = Identity::resolve(cli.user.as_deref(), config.owner.as_deref());
        Self {
            dirs,
            config_store,
            config,
            identity,
        }
    }

    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        SqliteStore::open(&self.dirs.db_path(), &self.dirs.media_dir())
            .context("failed to open presentation store")
    }

    /// Fails unless the presentation belongs to the acting user.
    fn owned(&self, store: &SqliteStore, id: PresentationId) -> anyhow::Result<()> {
        let summary = store.presentation(id)?;
        if summary.owner != self.identity.user_id() {
            bail!("presentation {id} not found");
        }
        Ok(())
    }
}

fn init_logging(dirs: &AppDirs) {
    let file = std::fs::create_dir_all(dirs.state_dir()).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dirs.log_path())
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();
    match file {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // the terminal is ours; rather lose logs than corrupt the screen
        Err(_) => {
            builder.filter_level(LevelFilter::Off);
        }
    }
    let _ = builder.try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = AppContext::resolve(&cli);
    init_logging(&ctx.dirs);
    info!("slideflow {} as {}", env!("CARGO_PKG_VERSION"), ctx.identity);

    let result = run(&cli, &ctx);
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}

fn run(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match &cli.command {
        Command::Import { pages, title } => {
            let id = import(ctx, pages, title.as_deref())?;
            writeln!(out, "{id}")?;
        }
        Command::List => {
            let store = ctx.open_store()?;
            for p in store.list_presentations(&ctx.identity)? {
                writeln!(
                    out,
                    "{:>4}  {}  {:>3} slides  {}",
                    p.id,
                    p.created_at.format("%Y-%m-%d %H:%M"),
                    p.slide_count,
                    p.title
                )?;
            }
        }
        Command::Show { id, json } => {
            let controller = load_owned(ctx, *id)?;
            if *json {
                let entries = controller.tracker().snapshot();
                writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
            } else {
                write!(out, "{}", timing_report(&controller))?;
            }
        }
        Command::Plan { id, slide, time } => {
            let mut controller = load_owned(ctx, *id)?;
            let status = controller.edit_planned_time(slide_index(*slide)?, time)?;
            require_saved(status)?;
        }
        Command::Note { id, slide, text } => {
            let mut controller = load_owned(ctx, *id)?;
            let status = controller.edit_speaker_note(slide_index(*slide)?, text)?;
            require_saved(status)?;
        }
        Command::Reset { id } => {
            let mut controller = load_owned(ctx, *id)?;
            require_saved(controller.reset_all_times()?)?;
        }
        Command::Rename { id, title } => {
            let title = title.trim();
            if title.is_empty() {
                bail!("title must not be empty");
            }
            let mut controller = load_owned(ctx, *id)?;
            require_saved(controller.rename(title))?;
        }
        Command::Delete { id } => {
            let store = ctx.open_store()?;
            ctx.owned(&store, *id)?;
            store.delete_presentation(*id)?;
        }
        Command::Config {
            owner,
            jpeg_quality,
            speaker_view,
        } => {
            let config = update_config(ctx, owner.as_deref(), *jpeg_quality, *speaker_view)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
        }
        Command::Rehearse { id, from, speaker } => {
            let from = from.map(slide_index).transpose()?;
            rehearse(ctx, *id, from, *speaker || ctx.config.speaker_view)?;
        }
    }
    Ok(())
}

fn load_owned(ctx: &AppContext, id: PresentationId) -> anyhow::Result<RehearsalController<SqliteStore>> {
    let store = ctx.open_store()?;
    ctx.owned(&store, id)?;
    Ok(RehearsalController::load(store, id)?)
}

fn slide_index(slide_number: usize) -> anyhow::Result<usize> {
    slide_number
        .checked_sub(1)
        .context("slide numbers start at 1")
}

fn require_saved(status: SaveStatus) -> anyhow::Result<()> {
    match status {
        SaveStatus::Saved => Ok(()),
        SaveStatus::Unsaved => bail!("change could not be saved"),
    }
}

fn default_title(pages: &[PathBuf]) -> String {
    pages
        .first()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn update_config(
    ctx: &AppContext,
    owner: Option<&str>,
    jpeg_quality: Option<u8>,
    speaker_view: Option<bool>,
) -> anyhow::Result<Config> {
    let mut config = ctx.config.clone();
    if owner.is_none() && jpeg_quality.is_none() && speaker_view.is_none() {
        return Ok(config);
    }
    if let Some(owner) = owner {
        let owner = owner.trim();
        config.owner = (!owner.is_empty()).then(|| owner.to_string());
    }
    if let Some(quality) = jpeg_quality {
        config.jpeg_quality = quality;
    }
    if let Some(speaker_view) = speaker_view {
        config.speaker_view = speaker_view;
    }
    ctx.config_store
        .save(&config)
        .with_context(|| format!("failed to write {}", ctx.config_store.path().display()))?;
    info!("saved config to {}", ctx.config_store.path().display());
    Ok(config)
}

fn convert<R: PageRenderer>(
    renderer: R,
    document: &R::Document,
    jpeg_quality: u8,
) -> anyhow::Result<Vec<SlideImage>> {
    let converter = DeckConverter::new(renderer).with_jpeg_quality(jpeg_quality);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(converter.convert(document))?)
}

fn import(ctx: &AppContext, pages: &[PathBuf], title: Option<&str>) -> anyhow::Result<PresentationId> {
    let quality = ctx.config.jpeg_quality;
    let slides = match pages {
        [file] if is_pdf(file) => convert(PdfPageRenderer, &PdfDocument::open(file)?, quality)?,
        [dir] if dir.is_dir() => {
            convert(RasterPageRenderer, &RasterDocument::from_dir(dir)?, quality)?
        }
        _ => convert(
            RasterPageRenderer,
            &RasterDocument::from_paths(pages.iter().cloned()),
            quality,
        )?,
    };

    let store = ctx.open_store()?;
    let title = title.map_or_else(|| default_title(pages), str::to_string);
    let id = store.create_presentation(&ctx.identity, &title)?;
    store
        .store_slide_images(id, &slides)
        .map_err(|err| {
            // an import either lands whole or not at all
            if let Err(cleanup) = store.delete_presentation(id) {
                error!("failed to remove partial presentation {id}: {cleanup}");
            }
            err
        })
        .context("failed to store slide images")?;
    info!("imported '{title}' as presentation {id} ({} slides)", slides.len());
    Ok(id)
}

fn timing_report<S: PresentationStore>(controller: &RehearsalController<S>) -> String {
    let view = controller.view();
    let mut report = format!("{}\n", view.title);
    report.push_str("slide   planned    actual      diff  note\n");
    for row in &view.rows {
        let note = controller
            .speaker_note(row.slide_number - 1)
            .unwrap_or_default();
        report.push_str(&format!(
            "{:>5}  {:>8}  {:>8}  {:>9}  {}\n",
            row.slide_number, row.planned, row.actual, row.difference, note
        ));
    }
    report.push_str(&format!(
        "total  {:>8}  {:>8}\n",
        view.total_planned, view.total_actual
    ));
    report
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditField {
    PlannedTime,
    SpeakerNote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Editor,
    Editing { field: EditField, buffer: String },
    Rehearsal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<S: PresentationStore> {
    pub controller: RehearsalController<S>,
    pub screen: Screen,
    pub selected: usize,
    pub speaker_view: bool,
    pub status: Option<String>,
}

impl<S: PresentationStore> App<S> {
    pub fn new(controller: RehearsalController<S>, speaker_view: bool) -> Self {
        Self {
            controller,
            screen: Screen::Editor,
            selected: 0,
            speaker_view,
            status: None,
        }
    }

    pub fn start_rehearsal(&mut self, from: usize, speaker_view: bool) {
        match self.controller.begin_session(from, speaker_view) {
            Ok(()) => {
                self.selected = from;
                self.screen = Screen::Rehearsal;
                self.status = None;
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    pub fn handle_event(&mut self, event: RehearsalEvent) -> Flow {
        if self.screen == Screen::Rehearsal {
            match self.controller.handle_event(event) {
                Ok(EventOutcome::Ended(_)) => {
                    self.status = Some(format!(
                        "rehearsal finished in {}",
                        time_format::format(self.controller.tracker().total_actual())
                    ));
                    self.screen = Screen::Editor;
                }
                Ok(_) => {}
                Err(err) => self.status = Some(err.to_string()),
            }
            return Flow::Continue;
        }

        match event {
            RehearsalEvent::Key(key) => self.handle_editor_key(key),
            _ => Flow::Continue,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        if let Screen::Editing { field, buffer } = &mut self.screen {
            match key.code {
                KeyCode::Esc => self.screen = Screen::Editor,
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) => buffer.push(c),
                KeyCode::Enter => {
                    let result = match field {
                        EditField::PlannedTime => {
                            self.controller.edit_planned_time(self.selected, buffer)
                        }
                        EditField::SpeakerNote => {
                            self.controller.edit_speaker_note(self.selected, buffer)
                        }
                    };
                    self.status = Some(match result {
                        Ok(SaveStatus::Saved) => "saved".to_string(),
                        Ok(SaveStatus::Unsaved) => "changed, but not saved".to_string(),
                        Err(err) => err.to_string(),
                    });
                    self.screen = Screen::Editor;
                }
                _ => {}
            }
            return Flow::Continue;
        }

        let slide_count = self.controller.slide_count();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < slide_count {
                    self.selected += 1;
                }
            }
            KeyCode::Char('e') => {
                let current = self
                    .controller
                    .tracker()
                    .entry(self.selected)
                    .map(|e| time_format::format(e.planned_seconds()))
                    .unwrap_or_default();
                self.screen = Screen::Editing {
                    field: EditField::PlannedTime,
                    buffer: current,
                };
            }
            KeyCode::Char('n') => {
                let current = self
                    .controller
                    .speaker_note(self.selected)
                    .unwrap_or_default()
                    .to_string();
                self.screen = Screen::Editing {
                    field: EditField::SpeakerNote,
                    buffer: current,
                };
            }
            KeyCode::Char('r') => {
                self.status = Some(match self.controller.reset_all_times() {
                    Ok(SaveStatus::Saved) => "actual times cleared".to_string(),
                    Ok(SaveStatus::Unsaved) => "cleared, but not saved".to_string(),
                    Err(err) => err.to_string(),
                });
            }
            KeyCode::Enter => self.start_rehearsal(self.selected, self.speaker_view),
            KeyCode::Char('s') => self.start_rehearsal(self.selected, true),
            _ => {}
        }
        Flow::Continue
    }
}

fn rehearse(
    ctx: &AppContext,
    id: PresentationId,
    from: Option<usize>,
    speaker_view: bool,
) -> anyhow::Result<()> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = ctx.open_store()?;
    ctx.owned(&store, id)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(REDRAW_INTERVAL_MS),
    );
    let controller = RehearsalController::load(store, id)?
        .with_clock(runner.event_source().sender(), FixedTicker::default());
    let mut app = App::new(controller, speaker_view);
    if let Some(from) = from {
        app.start_rehearsal(from, speaker_view);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // flushes a session that is still running
    drop(app);
    result
}

fn start_tui<B: Backend, S: PresentationStore, E: EventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
    runner: &Runner<E>,
) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| {
            let area = f.area();
            f.render_widget(&*app, area);
        })?;
        if let Some(event) = runner.step() {
            if app.handle_event(event) == Flow::Quit {
                return Ok(());
            }
        }
    }
}
