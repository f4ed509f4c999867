// Handles the rendering of widgets to the terminal frame.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub struct ServiceRow<'a> {
    pub label: &'static str,
    pub formula: &'a str,
    pub running: bool,
}

/// Main render function called every frame.
pub fn render(
    f: &mut Frame,
    rows: &[ServiceRow],
    list_state: &mut ListState,
    busy: bool,
    quitting: bool,
    spinner: usize,
    message: Option<&str>,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_service_list(f, chunks[0], rows, list_state, busy, spinner);
    render_message(f, chunks[1], message);
    render_footer(f, chunks[2], busy);

    if quitting {
        render_quitting(f);
    }
}

fn render_service_list(
    f: &mut Frame,
    area: Rect,
    rows: &[ServiceRow],
    state: &mut ListState,
    busy: bool,
    spinner: usize,
) {
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let (status_symbol, color, state) = if row.running {
                ("●", Color::Green, "started")
            } else {
                ("○", Color::DarkGray, "stopped")
            };

            let content = Line::from(vec![
                Span::styled(status_symbol, Style::default().fg(color)),
                Span::raw(format!(" {:<14}", row.label)),
                Span::raw(format!("{:<20}", row.formula)),
                Span::styled(format!("[{}]", state), Style::default().fg(Color::Gray)),
            ]);

            ListItem::new(content)
        })
        .collect();

    let title = if busy {
        format!(" Services {} working ", SPINNER[spinner % SPINNER.len()])
    } else {
        " Services ".to_string()
    };

    let highlight = if busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
            .add_modifier(Modifier::BOLD)
            .bg(Color::DarkGray)
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(highlight)
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, state);
}

fn render_message(f: &mut Frame, area: Rect, message: Option<&str>) {
    let paragraph = Paragraph::new(Line::from(message.unwrap_or("")))
        .block(Block::default().borders(Borders::ALL).title(" Status "));
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect, busy: bool) {
    // Batch keys are dimmed while a batch is running.
    let action_style = if busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    let help_text = Line::from(vec![
        Span::raw("Nav: "),
        Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("| Toggle: "),
        Span::styled("enter w(web) d(db) ", action_style),
        Span::raw("| All: "),
        Span::styled("a(start) x(stop) ", action_style),
        Span::raw("| "),
        Span::styled("r", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("efresh | Open: "),
        Span::styled("p(phpMyAdmin) o(webroot) ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("| Quit: "),
        Span::styled("q", Style::default().fg(Color::Red)),
    ]);

    let paragraph =
        Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Controls "));

    f.render_widget(paragraph, area);
}

fn render_quitting(f: &mut Frame) {
    let area = centered_rect(40, 20, f.area());

    f.render_widget(Clear, area);

    let paragraph = Paragraph::new(Line::from("Quitting..."))
        .block(Block::default().borders(Borders::ALL).title(" Stopping services "));

    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{Terminal, backend::TestBackend};

    fn draw(busy: bool, quitting: bool) -> String {
        let backend = TestBackend::new(100, 20);
        let mut terminal = Terminal::new(backend).unwrap();
        let rows = [
            ServiceRow {
                label: "Database",
                formula: "mariadb",
                running: true,
            },
            ServiceRow {
                label: "Web server",
                formula: "nginx",
                running: false,
            },
        ];
        let mut state = ListState::default();
        state.select(Some(0));

        terminal
            .draw(|f| render(f, &rows, &mut state, busy, quitting, 1, Some("Done")))
            .unwrap();

        let buffer = terminal.backend().buffer();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_render_shows_services_and_message() {
        let screen = draw(false, false);
        assert!(screen.contains("mariadb"));
        assert!(screen.contains("[started]"));
        assert!(screen.contains("[stopped]"));
        assert!(screen.contains("Done"));
        assert!(!screen.contains("working"));
    }

    #[test]
    fn test_render_busy_and_quitting() {
        let screen = draw(true, true);
        assert!(screen.contains("working"));
        assert!(screen.contains("Quitting..."));
    }
}
