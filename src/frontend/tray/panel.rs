//! Terminal status panel.
//!
//! Starts the proxy on a background thread as soon as it opens, then shows
//! both listen addresses, whether the proxy is still running, and the most
//! recent log lines until the user quits.

use std::io::{self, Stdout};
use std::panic;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tracing::{debug, error};

use super::{StartCallback, TrayDisplay, TrayError, TrayShell};
use crate::logging::LogBuffer;

const TICK_RATE: Duration = Duration::from_millis(200);

/// Proxy state as seen by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProxyState {
    Running,
    Stopped,
}

impl ProxyState {
    fn of(proxy: &JoinHandle<()>) -> Self {
        if proxy.is_finished() {
            ProxyState::Stopped
        } else {
            ProxyState::Running
        }
    }

    fn label(self) -> (&'static str, Color) {
        match self {
            ProxyState::Running => ("running", Color::Green),
            ProxyState::Stopped => ("stopped", Color::Red),
        }
    }
}

/// [`TrayShell`] rendering a full-screen status panel.
pub struct PanelShell {
    logs: LogBuffer,
}

impl PanelShell {
    /// Panel displaying lines from `logs`.
    pub fn new(logs: LogBuffer) -> Self {
        Self { logs }
    }
}

impl TrayShell for PanelShell {
    fn log_capture(&self) -> Option<LogBuffer> {
        Some(self.logs.clone())
    }

    fn run(&mut self, display: TrayDisplay, start: StartCallback) -> Result<(), TrayError> {
        let mut terminal = PanelTerminal::enter()?;

        let proxy = thread::Builder::new()
            .name("duoproxy-proxy".to_string())
            .spawn(start)?;
        let started_at = Local::now();

        loop {
            let state = ProxyState::of(&proxy);
            let logs = self.logs.tail(200);
            terminal
                .inner
                .draw(|frame| render_panel(frame, &display, state, started_at, &logs))?;

            if event::poll(TICK_RATE)?
                && let Event::Key(key) = event::read()?
                && is_quit(&key)
            {
                debug!("Panel closed by user");
                break;
            }
        }

        Ok(())
    }
}

/// Whether `key` closes the panel.
pub(crate) fn is_quit(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Draw the whole panel.
pub(crate) fn render_panel(
    frame: &mut Frame,
    display: &TrayDisplay,
    state: ProxyState,
    started_at: DateTime<Local>,
    logs: &[String],
) {
    let [header, log_area, footer] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let label_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let (state_text, state_color) = state.label();
    let status = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("SOCKS5  ", label_style),
            Span::raw(display.socks5_addr.as_str()),
        ]),
        Line::from(vec![
            Span::styled("HTTP    ", label_style),
            Span::raw(display.http_addr.as_str()),
        ]),
        Line::from(vec![
            Span::styled("State   ", label_style),
            Span::styled(state_text, Style::default().fg(state_color)),
            Span::styled(
                format!("  since {}", started_at.format("%Y-%m-%d %H:%M:%S")),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title(" duoproxy "));
    frame.render_widget(status, header);

    // Keep the newest lines visible.
    let visible = log_area.height.saturating_sub(2) as usize;
    let skip = logs.len().saturating_sub(visible);
    let lines: Vec<Line> = logs.iter().skip(skip).map(|l| Line::raw(l.as_str())).collect();
    let log_widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Logs "));
    frame.render_widget(log_widget, log_area);

    let key_style = Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let hint = Paragraph::new(Line::from(vec![
        Span::styled(" q ", key_style),
        Span::raw(" Quit and stop proxy"),
    ]));
    frame.render_widget(hint, footer);
}

/// Raw-mode alternate screen, restored on drop.
struct PanelTerminal {
    inner: Terminal<CrosstermBackend<Stdout>>,
}

impl PanelTerminal {
    fn enter() -> io::Result<Self> {
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            original_hook(panic_info);
        }));

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }

        let inner = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { inner })
    }

    fn restore(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.inner.backend_mut(), LeaveAlternateScreen)?;
        self.inner.show_cursor()
    }
}

impl Drop for PanelTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!("Failed to restore terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn display() -> TrayDisplay {
        TrayDisplay {
            socks5_addr: "127.0.0.1:1080".to_string(),
            http_addr: "0.0.0.0:8181".to_string(),
        }
    }

    #[test]
    fn test_panel_shows_addresses_and_state() {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        let logs = vec!["INFO SOCKS5 proxy listening".to_string()];

        terminal
            .draw(|frame| render_panel(frame, &display(), ProxyState::Running, Local::now(), &logs))
            .unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("127.0.0.1:1080"));
        assert!(text.contains("0.0.0.0:8181"));
        assert!(text.contains("running"));
        assert!(text.contains("SOCKS5 proxy listening"));
    }

    #[test]
    fn test_panel_shows_newest_logs() {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let logs: Vec<String> = (0..50).map(|i| format!("entry-{i:02}")).collect();

        terminal
            .draw(|frame| render_panel(frame, &display(), ProxyState::Stopped, Local::now(), &logs))
            .unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("entry-49"));
        assert!(!text.contains("entry-00"));
        assert!(text.contains("stopped"));
    }

    #[test]
    fn test_quit_keys() {
        let press = |code, modifiers| KeyEvent::new(code, modifiers);
        assert!(is_quit(&press(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit(&press(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit(&press(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit(&press(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn test_state_follows_thread() {
        let handle = thread::spawn(|| {});
        while !handle.is_finished() {
            thread::yield_now();
        }
        assert_eq!(ProxyState::of(&handle), ProxyState::Stopped);
    }
}
