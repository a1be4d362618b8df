use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::transcript::{Message, Role};

/// Parse a line of text and convert **bold** and `code` markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next(); // consume second *
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else if c == '`' {
            // Inline code span
            let mut code_text = String::new();
            let mut found_close = false;

            for c in chars.by_ref() {
                if c == '`' {
                    found_close = true;
                    break;
                }
                code_text.push(c);
            }

            if found_close && !code_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(code_text, Style::default().fg(Color::Yellow)));
            } else {
                current_text.push('`');
                current_text.push_str(&code_text);
            }
        } else {
            current_text.push(c);
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Convert a markdown body into styled lines: fenced code blocks, headings,
/// bullets, and inline bold/code.
pub fn markdown_lines(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code_block = false;

    for raw in text.lines() {
        let trimmed = raw.trim_start();

        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(Line::from(Span::styled(
                raw.to_string(),
                Style::default().fg(Color::DarkGray),
            )));
        } else if in_code_block {
            lines.push(Line::from(Span::styled(
                raw.to_string(),
                Style::default().fg(Color::Yellow),
            )));
        } else if trimmed.starts_with('#') {
            lines.push(Line::from(Span::styled(
                raw.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
        } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* "))
        {
            let mut spans = vec![Span::styled("• ", Style::default().fg(Color::Cyan))];
            spans.extend(parse_markdown_line(rest).spans);
            lines.push(Line::from(spans));
        } else {
            lines.push(parse_markdown_line(raw));
        }
    }

    lines
}

/// Build the chat pane content. `partial` is the in-flight response text
/// (present exactly while a turn is awaiting the provider); every frame with
/// it carries the Thinking indicator, and the final frame never does.
pub fn build_chat_lines(
    turns: &[Message],
    partial: Option<&str>,
    thinking_dots: &str,
    status: Option<&str>,
    avatar: &str,
) -> Vec<Line<'static>> {
    if turns.is_empty() && partial.is_none() && status.is_none() {
        return vec![Line::from(Span::styled(
            "Send a message to start chatting...",
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines: Vec<Line> = Vec::new();

    for msg in turns {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    format!("{avatar}:"),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "🤖:",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
                lines.extend(markdown_lines(&msg.content));
                lines.push(Line::default());
            }
            Role::System => {}
        }
    }

    if let Some(partial) = partial {
        lines.push(Line::from(Span::styled(
            "🤖:",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        if !partial.is_empty() {
            lines.extend(markdown_lines(partial));
        }
        // Animated ellipsis: cycles through ".", "..", "..."
        lines.push(Line::from(Span::styled(
            format!("Thinking{thinking_dots}"),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    if let Some(status) = status {
        lines.push(Line::from(Span::styled(
            status.to_string(),
            Style::default().fg(Color::Red),
        )));
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);
    render_chat(app, frame, clamp_width(chat_area, app.width));
    render_input(app, frame, clamp_width(input_area, app.width));
    render_footer(app, frame, footer_area);
}

/// Apply the --width override, leaving the pane left-aligned.
fn clamp_width(area: Rect, width: u16) -> Rect {
    if width > 0 && area.width > width {
        Rect { width, ..area }
    } else {
        area
    }
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" llm-term ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            "chat with a language model from your terminal",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let lines = build_chat_lines(
        app.transcript.turns(),
        app.partial_response(),
        &app.thinking_dots(),
        app.status.as_deref(),
        &app.avatar,
    );
    let chat_text = Text::from(lines);

    if app.panel {
        let chat_block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(format!(" {}: {} ", app.provider.display_name(), app.model));
        let inner = chat_block.inner(area);
        app.chat_height = inner.height;
        app.chat_width = inner.width;

        let chat = Paragraph::new(chat_text)
            .block(chat_block)
            .wrap(Wrap { trim: false })
            .scroll((app.scroll, 0));
        frame.render_widget(chat, area);
    } else {
        // Borderless variant keeps terminal copy-paste clean
        app.chat_height = area.height;
        app.chat_width = area.width;

        let chat = Paragraph::new(chat_text)
            .wrap(Wrap { trim: false })
            .scroll((app.scroll, 0));
        frame.render_widget(chat, area);
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (border_color, title) = if app.is_busy() {
        (Color::DarkGray, " Waiting for response... ")
    } else {
        (Color::Cyan, " Message ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let input = Paragraph::new(app.input.as_str()).block(input_block);
    frame.render_widget(input, area);

    if !app.is_busy() {
        frame.set_cursor_position((area.x + app.cursor as u16 + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = if app.is_busy() {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    };
    let mode_text = if app.is_busy() { " WAIT " } else { " CHAT " };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    spans.extend(vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" ↑/↓ ", key_style),
        Span::styled(" history ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Ctrl-C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Message;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn lines_text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(line_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_bold_markdown_becomes_styled_span() {
        let line = parse_markdown_line("this is **important** text");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "important");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("dangling **marker");
        assert_eq!(line_text(&line), "dangling **marker");
    }

    #[test]
    fn test_inline_code_becomes_yellow_span() {
        let line = parse_markdown_line("run `cargo build` first");
        assert_eq!(line.spans[1].content, "cargo build");
        assert_eq!(line.spans[1].style.fg, Some(Color::Yellow));
    }

    #[test]
    fn test_code_fence_toggles_block_styling() {
        let lines = markdown_lines("before\n```rust\nlet x = 1;\n```\nafter");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2].spans[0].style.fg, Some(Color::Yellow));
        // Text outside the fence is not code-styled
        assert_eq!(lines[4].spans[0].style.fg, None);
    }

    #[test]
    fn test_heading_and_bullet_styling() {
        let lines = markdown_lines("# Title\n- item one");
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(lines[1].spans[0].content, "• ");
    }

    #[test]
    fn test_busy_indicator_present_in_intermediate_frames() {
        let turns = vec![Message::user("hi")];
        let lines = build_chat_lines(&turns, Some("partial answ"), "..", None, "🧑");
        let text = lines_text(&lines);
        assert!(text.contains("partial answ"));
        assert!(text.contains("Thinking.."));
    }

    #[test]
    fn test_busy_indicator_absent_in_final_frame() {
        let turns = vec![Message::user("hi"), Message::assistant("Hello, world")];
        let lines = build_chat_lines(&turns, None, ".", None, "🧑");
        let text = lines_text(&lines);
        assert!(text.contains("Hello, world"));
        assert!(!text.contains("Thinking"));
    }

    #[test]
    fn test_busy_only_frame_has_indicator_and_no_text() {
        // Non-streaming mode renders a busy-only frame while the call runs.
        let lines = build_chat_lines(&[], Some(""), ".", None, "🧑");
        let text = lines_text(&lines);
        assert!(text.contains("Thinking."));
        assert!(text.contains("🤖:"));
    }

    #[test]
    fn test_empty_transcript_shows_placeholder() {
        let lines = build_chat_lines(&[], None, ".", None, "🧑");
        assert_eq!(lines.len(), 1);
        assert!(line_text(&lines[0]).contains("Send a message"));
    }

    #[test]
    fn test_status_line_rendered_after_turns() {
        let turns = vec![Message::user("hi")];
        let lines = build_chat_lines(&turns, None, ".", Some("Error: boom"), "🧑");
        let text = lines_text(&lines);
        assert!(text.contains("Error: boom"));
    }

    #[test]
    fn test_system_message_never_rendered() {
        let turns = vec![Message::system("secret system prompt"), Message::user("hi")];
        let text = lines_text(&build_chat_lines(&turns, None, ".", None, "🧑"));
        assert!(!text.contains("secret system prompt"));
    }
}
