use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use super::app::App;

pub(crate) type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Input poll timeout. Each loop iteration also ticks the projection session.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Switch the terminal into raw alternate-screen mode.
pub(crate) fn init_terminal() -> Result<Tui> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed to create terminal backend")
}

pub(crate) fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal
        .show_cursor()
        .context("failed to restore cursor visibility")
}

/// Spin up the terminal backend, enter the draw loop, and keep processing input
/// until the user quits.
pub fn run_app(app: &mut App) -> Result<()> {
    let mut terminal = init_terminal()?;

    let result = loop {
        app.tick(Instant::now());

        if let Err(err) = terminal.draw(|frame| app.draw(frame)) {
            break Err(err).context("failed to draw frame");
        }

        match event::poll(INPUT_POLL).context("event polling failed") {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break Err(err),
        }
        match event::read().context("failed to read event") {
            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                match app.handle_key(key_event.code) {
                    Ok(true) => break Ok(()),
                    Ok(false) => {}
                    Err(err) => break Err(err),
                }
            }
            Ok(_) => {}
            Err(err) => break Err(err),
        }
    };

    app.shutdown();
    restore_terminal(&mut terminal)?;
    result
}
