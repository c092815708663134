use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app;
mod brochure;
mod config;
mod handler;
mod ollama;
mod scrape;
mod session;
mod stream;
mod summary;
mod tui;
mod ui;
mod vision;

use app::App;
use tui::EventHandler;

/// Log to a file; the terminal itself is owned by the UI. Logging is best
/// effort and any setup failure leaves it disabled.
fn init_logging() {
    let Some(dir) = dirs::config_dir().map(|d| d.join("charla")) else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::File::create(dir.join("charla.log")) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

async fn run(terminal: &mut tui::Tui) -> Result<()> {
    let mut app = App::new()?;
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event)?;
        }

        app.drain_stream_updates();
        app.drain_model_list();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    tui::install_panic_hook();

    let mut terminal = tui::init()?;
    let result = run(&mut terminal).await;
    tui::restore()?;

    result
}
