use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};

use crate::app::{App, FocusPane, InputField, InputMode, Screen, ANSWER_PLACEHOLDER};

/// Convert `**bold**` markers in a line to styled spans. A line with an odd
/// set of markers is left untouched.
fn styled_line(text: &str) -> Line<'static> {
    if let Some(heading) = text.strip_prefix('#') {
        let heading = heading.trim_start_matches('#').trim_start();
        return Line::from(Span::styled(
            heading.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }

    if !text.contains("**") {
        return Line::from(text.to_string());
    }

    let parts: Vec<&str> = text.split("**").collect();
    if parts.len() % 2 == 0 {
        // Unbalanced markers, render literally
        return Line::from(text.to_string());
    }

    let mut spans = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i % 2 == 1 {
            spans.push(Span::styled(
                part.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::raw(part.to_string()));
        }
    }
    Line::from(spans)
}

/// Estimate how many rows a text occupies once wrapped to `width` columns.
fn wrapped_line_count(text: &str, width: u16) -> u16 {
    let width = width.max(1) as usize;
    text.lines()
        .map(|line| {
            let chars = line.chars().count();
            (chars.max(1) + width - 1) / width
        })
        .sum::<usize>()
        .min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Vision => render_vision_screen(app, frame, body_area),
        Screen::Brochure => render_brochure_screen(app, frame, body_area),
        Screen::Summary => render_summary_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        " charla ",
        Style::default().fg(Color::Cyan).bold(),
    )];

    for (idx, screen) in [
        Screen::Chat,
        Screen::Vision,
        Screen::Brochure,
        Screen::Summary,
    ]
    .iter()
    .enumerate()
    {
        let label = format!(" {} {} ", idx + 1, screen.title());
        let style = if *screen == app.screen {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(label, style));
    }

    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("[{}]", app.current_model()),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, status_area, output_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    render_input(app, frame, input_area, FocusPane::Input, " Question ");
    render_status(app, frame, status_area);

    let answer = app.chat_answer.clone();
    let dimmed = answer == ANSWER_PLACEHOLDER;
    render_output(app, frame, output_area, " Answer ", &answer, dimmed);
}

fn render_vision_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [path_area, input_area, status_area, output_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    let path_title = if app.vision_image.is_some() {
        " Image path (loaded) "
    } else {
        " Image path (Enter to load) "
    };
    render_input(app, frame, path_area, FocusPane::Source, path_title);
    render_input(app, frame, input_area, FocusPane::Input, " Ask about the image ");
    render_status(app, frame, status_area);

    let (transcript, dimmed) = if app.vision_transcript.is_empty() {
        (
            "Load an image, then ask a question about it.".to_string(),
            true,
        )
    } else {
        (app.vision_transcript.clone(), false)
    };
    render_output(app, frame, output_area, " Conversation ", &transcript, dimmed);
}

fn render_brochure_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [company_area, url_area, status_area, output_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    render_input(app, frame, company_area, FocusPane::Source, " Company name ");
    render_input(app, frame, url_area, FocusPane::Input, " Website URL ");
    render_status(app, frame, status_area);

    let (output, dimmed) = if app.brochure_output.is_empty() {
        (
            "Enter a company name and URL, then press Enter.".to_string(),
            true,
        )
    } else {
        (app.brochure_output.clone(), false)
    };
    render_output(app, frame, output_area, " Brochure ", &output, dimmed);
}

fn render_summary_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, status_area, output_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    render_input(app, frame, input_area, FocusPane::Input, " Website URL ");
    render_status(app, frame, status_area);

    let (output, dimmed) = if app.summary_output.is_empty() {
        ("Enter a URL, then press Enter.".to_string(), true)
    } else {
        (app.summary_output.clone(), false)
    };
    render_output(app, frame, output_area, " Summary ", &output, dimmed);
}

fn render_input(app: &mut App, frame: &mut Frame, area: Rect, pane: FocusPane, title: &str) {
    let focused = app.focus == pane;
    let editing = focused && app.input_mode == InputMode::Editing;

    let border_color = if editing {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let field = field_for(app, pane).clone();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Horizontal scroll keeps the cursor visible in a single-line field
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || field.cursor < inner_width {
        0
    } else {
        field.cursor - inner_width + 1
    };

    let visible_text: String = field
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_style = if app.busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    let input = Paragraph::new(visible_text).style(text_style).block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (field.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn field_for<'a>(app: &'a App, pane: FocusPane) -> &'a InputField {
    match (app.screen, pane) {
        (Screen::Chat, _) => &app.chat_input,
        (Screen::Vision, FocusPane::Source) => &app.image_path_input,
        (Screen::Vision, _) => &app.vision_input,
        (Screen::Brochure, FocusPane::Source) => &app.company_input,
        (Screen::Brochure, _) => &app.brochure_url_input,
        (Screen::Summary, _) => &app.summary_url_input,
    }
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let style = if app.busy {
        Style::default().fg(Color::Yellow)
    } else if app.status.starts_with("Error") || app.status.starts_with("Failed") {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let status = Paragraph::new(format!(" {}", app.status)).style(style);
    frame.render_widget(status, area);
}

fn render_output(
    app: &mut App,
    frame: &mut Frame,
    area: Rect,
    title: &str,
    content: &str,
    dimmed: bool,
) {
    let focused = app.focus == FocusPane::Output;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);

    let mut lines: Vec<Line> = if dimmed {
        content
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::DarkGray))))
            .collect()
    } else {
        content.lines().map(styled_line).collect()
    };

    let streaming_here = app.busy && app.stream_screen == app.screen;
    if streaming_here {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let total_lines = wrapped_line_count(content, inner_width)
        .saturating_add(if streaming_here { 1 } else { 0 });
    let max_scroll = total_lines.saturating_sub(inner_height);

    // Follow the tail while a response is streaming in
    let scroll = app.output_scroll_mut();
    if streaming_here {
        *scroll = max_scroll;
    } else {
        *scroll = (*scroll).min(max_scroll);
    }
    let scroll = *scroll;

    app.output_area = Some(area);
    app.output_height = inner_height;
    app.output_lines = total_lines;

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .scroll((scroll, 0))
        .block(block);
    frame.render_widget(paragraph, area);

    if total_lines > inner_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));
        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(scroll as usize);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" 1-4 ", key_style),
                Span::styled(" screen ", label_style),
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" edit ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
            ];
            hints.extend(vec![
                Span::styled(" M ", key_style),
                Span::styled(" model ", label_style),
                Span::styled(" R ", key_style),
                Span::styled(" reset ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
        InputMode::Editing => {
            let submit_label = match (app.screen, app.focus) {
                (Screen::Vision, FocusPane::Source) => " load image ",
                _ => " submit ",
            };
            vec![
                Span::styled(" Enter ", key_style),
                Span::styled(submit_label, label_style),
                Span::styled(" Tab ", key_style),
                Span::styled(" next field ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" normal ", label_style),
            ]
        }
    };

    let footer = Paragraph::new(Line::from(hints));
    frame.render_widget(footer, area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_width = 40.min(area.width.saturating_sub(4));
    let popup_height = (app.available_models.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let current = app.current_model().to_string();
    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if *model == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markers_become_styled_spans() {
        let line = styled_line("plain **bold** tail");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "bold");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unbalanced_markers_render_literally() {
        let line = styled_line("broken **bold");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "broken **bold");
    }

    #[test]
    fn headings_are_highlighted() {
        let line = styled_line("## Company Overview");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "Company Overview");
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn wrapped_line_count_accounts_for_width() {
        assert_eq!(wrapped_line_count("short", 80), 1);
        assert_eq!(wrapped_line_count("a".repeat(100).as_str(), 40), 3);
        assert_eq!(wrapped_line_count("one\ntwo\nthree", 80), 3);
    }
}
