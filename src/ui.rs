use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget, Wrap},
};
use slideflow::{controller::SessionView, store::PresentationStore, timing::TimeRow};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::{App, EditField, Screen};

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;
const NOTE_COLUMN_WIDTH: usize = 40;

impl<S: PresentationStore> Widget for &App<S> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let view = self.controller.view();
        match self.screen {
            Screen::Rehearsal => render_rehearsal(&view, area, buf),
            _ => render_editor(self, &view, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn difference_style(row: &TimeRow) -> Style {
    if row.over_budget {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    }
}

/// Cuts `text` to at most `max` terminal columns, marking the cut with `…`.
fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn timing_table<'a>(
    rows: &'a [TimeRow],
    notes: impl Fn(usize) -> Option<&'a str>,
    highlighted: Option<usize>,
) -> Table<'a> {
    let header = Row::new(["Slide", "Planned", "Actual", "Diff", "Note"])
        .style(bold().fg(Color::Cyan))
        .bottom_margin(1);

    let body = rows.iter().enumerate().map(|(i, row)| {
        let note = notes(i).map(|n| truncate_to_width(n, NOTE_COLUMN_WIDTH));
        let line = Row::new(vec![
            Cell::from(row.slide_number.to_string()),
            Cell::from(row.planned.as_str()),
            Cell::from(row.actual.as_str()),
            Cell::from(Span::styled(row.difference.as_str(), difference_style(row))),
            Cell::from(note.unwrap_or_default()),
        ]);
        if highlighted == Some(i) {
            line.style(Style::default().add_modifier(Modifier::REVERSED))
        } else {
            line
        }
    });

    Table::new(
        body,
        [
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(11),
            Constraint::Min(10),
        ],
    )
    .header(header)
}

fn render_editor<S: PresentationStore>(app: &App<S>, view: &SessionView, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(3),    // table
            Constraint::Length(1), // totals
            Constraint::Length(1), // input or status
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(Span::styled(view.title.as_str(), bold().fg(Color::Cyan)))
        .block(Block::default().borders(Borders::ALL).title("slideflow"))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let controller = &app.controller;
    timing_table(&view.rows, |i| controller.speaker_note(i), Some(app.selected))
        .block(Block::default().borders(Borders::ALL).title("Timing"))
        .render(chunks[1], buf);

    Paragraph::new(format!(
        "total planned {}   total actual {}",
        view.total_planned, view.total_actual
    ))
    .style(bold())
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    let status_line = match &app.screen {
        Screen::Editing { field, buffer } => {
            let label = match field {
                EditField::PlannedTime => "planned (HH:MM:SS)",
                EditField::SpeakerNote => "note",
            };
            Line::from(vec![
                Span::styled(format!("slide {} {label}: ", app.selected + 1), bold()),
                Span::raw(buffer.as_str()),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            ])
        }
        _ => Line::from(Span::styled(
            app.status.as_deref().unwrap_or_default(),
            Style::default().fg(Color::Yellow),
        )),
    };
    Paragraph::new(status_line).render(chunks[3], buf);

    let legend = match app.screen {
        Screen::Editing { .. } => "(enter) save / (esc) cancel",
        _ => "(↑↓) select / (e)dit time / (n)ote / (r)eset / (enter) rehearse / (s)peaker view / (q)uit",
    };
    Paragraph::new(Span::styled(
        legend,
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[4], buf);
}

fn render_rehearsal(view: &SessionView, area: Rect, buf: &mut Buffer) {
    let note_height = if view.speaker_view { 5 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1),           // position
            Constraint::Length(1),           // image
            Constraint::Length(3),           // clock
            Constraint::Length(note_height), // speaker note
            Constraint::Min(3),              // table
            Constraint::Length(1),           // legend
        ])
        .split(area);

    let position = match view.current_index {
        Some(i) => format!("{}   slide {} / {}", view.title, i + 1, view.slide_count),
        None => view.title.clone(),
    };
    Paragraph::new(Span::styled(position, bold()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    Paragraph::new(Span::styled(
        view.current_image.as_deref().unwrap_or_default(),
        Style::default().add_modifier(Modifier::DIM),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let planned = view
        .current_index
        .and_then(|i| view.rows.get(i))
        .map(|row| row.planned.as_str())
        .unwrap_or_default();
    let clock_style = if view.is_warning {
        bold().fg(Color::Black).bg(Color::Yellow)
    } else {
        bold()
    };
    Paragraph::new(vec![
        Line::from(Span::styled(view.elapsed.as_str(), clock_style)),
        Line::from(Span::styled(
            format!("of {planned}"),
            Style::default().add_modifier(Modifier::DIM),
        )),
    ])
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    if view.speaker_view {
        Paragraph::new(view.speaker_note.as_deref().unwrap_or_default())
            .block(Block::default().borders(Borders::ALL).title("Notes"))
            .wrap(Wrap { trim: true })
            .render(chunks[3], buf);
    }

    timing_table(&view.rows, |_| None, view.current_index)
        .block(Block::default().borders(Borders::ALL).title("Timing"))
        .render(chunks[4], buf);

    Paragraph::new(Span::styled(
        "(→) next / (←) previous / (home/end) first/last / (esc) end rehearsal",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[5], buf);
}
