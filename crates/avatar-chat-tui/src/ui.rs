use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use avatar_chat_core::{ChatRole, EntryOutcome};
use crate::app::{App, VoiceStatus};
use crate::transcript::LogEntry;

const FACE_WIDTH: u16 = 17;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, input, footer
    let [header_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let [face_area, chat_area] = Layout::horizontal([
        Constraint::Length(FACE_WIDTH),
        Constraint::Min(0),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    render_face(app, frame, face_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (voice_text, voice_color) = match app.voice_status() {
        VoiceStatus::On => (
            format!("voice: {}", app.speaker_label().unwrap_or_default()),
            Color::Green,
        ),
        VoiceStatus::NoSpeaker => ("voice: no speaker".to_string(), Color::Yellow),
        VoiceStatus::Off => ("voice: off".to_string(), Color::Gray),
        VoiceStatus::NotConfigured => ("voice: not configured".to_string(), Color::Gray),
    };
    let persona = app
        .persona()
        .map(|preset| preset.display_name())
        .unwrap_or("Default");

    let title = Line::from(vec![
        Span::styled(" Avatar Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("│ "),
        Span::styled(app.session.model().to_string(), Style::default().fg(Color::Magenta)),
        Span::raw(" │ "),
        Span::styled(voice_text, Style::default().fg(voice_color)),
        Span::raw(" │ "),
        Span::styled(format!("persona: {}", persona), Style::default().fg(Color::Gray)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_face(app: &App, frame: &mut Frame, area: Rect) {
    let color = if app.face.is_talking() { Color::Yellow } else { Color::Cyan };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Avatar ");

    let mut lines: Vec<Line> = vec![Line::default()];
    lines.extend(
        app.face
            .lines()
            .into_iter()
            .map(|line| Line::from(Span::styled(line, Style::default().fg(color)))),
    );

    let face = Paragraph::new(Text::from(lines))
        .block(block)
        .alignment(ratatui::layout::Alignment::Center);
    frame.render_widget(face, area);
}

fn entry_lines(entry: &LogEntry, frame_no: u8) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match entry.role {
        ChatRole::User => lines.push(Line::from(Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))),
        _ => lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))),
    }

    if entry.is_pending() && entry.text.is_empty() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((frame_no % 3) as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else {
        let style = match entry.outcome {
            Some(EntryOutcome::Failed) => Style::default().fg(Color::Red),
            Some(EntryOutcome::Stopped) => Style::default().fg(Color::Gray),
            _ => Style::default(),
        };
        for line in entry.text.lines() {
            lines.push(Line::from(Span::styled(line.to_string(), style)));
        }
    }

    lines.push(Line::default());
    lines
}

/// Rows the lines occupy once wrapped to `width` columns.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let border_color = if app.is_busy() { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat (PgUp/PgDn to scroll) ");

    let frame_no = app.face.frame();
    let lines: Vec<Line> = app
        .log
        .entries()
        .iter()
        .flat_map(|entry| entry_lines(entry, frame_no))
        .collect();

    app.chat_height = area.height.saturating_sub(2);
    let total = wrapped_height(&lines, area.width.saturating_sub(2));
    app.clamp_scroll(total);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Message (Enter to send) ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Cursor column counts display width so wide characters line up.
    let before_cursor: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(cursor_pos - scroll_offset)
        .collect();
    let cursor_x = Line::from(before_cursor).width() as u16;
    frame.set_cursor_position((
        area.x + cursor_x.min(area.width.saturating_sub(2)) + 1,
        area.y + 1,
    ));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = if app.is_busy() {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    };
    let mode_text = if app.is_busy() { " STREAMING " } else { " READY " };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    match &app.status {
        Some(status) => spans.push(Span::styled(status.clone(), Style::default().fg(Color::White))),
        None => {
            let hints = [
                ("Esc", "stop"),
                ("^V", "voice"),
                ("^S", "speaker"),
                ("^R", "reload speakers"),
                ("^P", "persona"),
                ("^L", "clear"),
                ("^C", "quit"),
            ];
            for (key, action) in hints {
                spans.push(Span::styled(key, Style::default().fg(Color::Cyan).bold()));
                spans.push(Span::styled(format!(" {}  ", action), Style::default().fg(Color::Gray)));
            }
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
