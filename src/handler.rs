use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::{mpsc, oneshot};

use crate::app::{App, FocusPane, InputMode, Screen};
use crate::brochure;
use crate::stream;
use crate::summary;
use crate::tui::AppEvent;
use crate::vision;

/// Capacity of the worker -> UI update channel.
const STREAM_CHANNEL_CAPACITY: usize = 64;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key)?,
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_model_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.model_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.model_picker_nav_up();
        }
        KeyCode::Enter => {
            app.select_model();
        }
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Screen switching
        KeyCode::Char('1') => app.switch_screen(Screen::Chat),
        KeyCode::Char('2') => app.switch_screen(Screen::Vision),
        KeyCode::Char('3') => app.switch_screen(Screen::Brochure),
        KeyCode::Char('4') => app.switch_screen(Screen::Summary),

        KeyCode::Tab => app.cycle_focus(),

        // Enter editing on the focused field
        KeyCode::Char('i') | KeyCode::Enter => {
            if app.active_field_mut().is_some() {
                app.input_mode = InputMode::Editing;
                if let Some(field) = app.active_field_mut() {
                    field.end();
                }
            }
        }

        // Clear conversation and surfaces for this screen
        KeyCode::Char('R') => app.reset_current_screen(),

        // Open model picker
        KeyCode::Char('M') => open_model_picker(app),

        // Output scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        _ => {}
    }
    Ok(())
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => {
            // Move to the next pane; keep editing while it is an input
            app.cycle_focus();
            if app.active_field_mut().is_none() {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Enter => submit(app),
        KeyCode::Backspace => {
            if let Some(field) = app.active_field_mut() {
                field.backspace();
            }
        }
        KeyCode::Delete => {
            if let Some(field) = app.active_field_mut() {
                field.delete();
            }
        }
        KeyCode::Left => {
            if let Some(field) = app.active_field_mut() {
                field.left();
            }
        }
        KeyCode::Right => {
            if let Some(field) = app.active_field_mut() {
                field.right();
            }
        }
        KeyCode::Home => {
            if let Some(field) = app.active_field_mut() {
                field.home();
            }
        }
        KeyCode::End => {
            if let Some(field) = app.active_field_mut() {
                field.end();
            }
        }
        KeyCode::Char(c) => {
            if let Some(field) = app.active_field_mut() {
                field.insert(c);
            }
        }
        _ => {}
    }
}

fn submit(app: &mut App) {
    match (app.screen, app.focus) {
        (Screen::Chat, _) => submit_chat(app),
        // Enter on the image path field loads and validates the image
        (Screen::Vision, FocusPane::Source) => load_vision_image(app),
        (Screen::Vision, _) => submit_vision(app),
        (Screen::Brochure, _) => submit_brochure(app),
        (Screen::Summary, _) => submit_summary(app),
    }
}

/// One request at a time: submissions while a stream is in flight are
/// refused rather than interleaved.
fn reject_if_busy(app: &mut App) -> bool {
    if app.busy {
        app.status = "Still streaming a response. Please wait.".to_string();
        return true;
    }
    false
}

fn submit_chat(app: &mut App) {
    if reject_if_busy(app) {
        return;
    }

    let question = app.chat_input.trimmed();
    if question.is_empty() {
        app.chat_answer = "Please enter a question.".to_string();
        app.status.clear();
        return;
    }

    app.session.push_user(&question);
    app.chat_input.clear();
    app.chat_answer.clear();
    app.chat_scroll = 0;
    app.status = "Looking for an answer...".to_string();
    app.input_mode = InputMode::Normal;

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    app.begin_stream(Screen::Chat, rx);

    let client = app.ollama.clone();
    let model = app.config.chat_model().to_string();
    let messages = app.session.messages().to_vec();
    let filter = app.think_filter.clone();
    tokio::spawn(async move {
        client.ensure_model(&model).await;
        stream::run_chat_stream(client, model, messages, move |delta| filter.apply(delta), tx)
            .await;
    });
}

fn load_vision_image(app: &mut App) {
    let path = app.image_path_input.trimmed();
    if path.is_empty() {
        app.status = "Enter the path to an image file.".to_string();
        return;
    }

    match vision::load_image(&path) {
        Ok(image) => {
            app.vision_image = Some(image);
            app.status = "Image loaded successfully.".to_string();
            app.focus = FocusPane::Input;
        }
        Err(e) => {
            app.vision_image = None;
            app.status = format!("Error: {}", e);
        }
    }
}

fn submit_vision(app: &mut App) {
    if reject_if_busy(app) {
        return;
    }

    let query = app.vision_input.trimmed();
    if query.is_empty() {
        return;
    }

    let Some(image) = app.vision_image.clone() else {
        app.status = "Please upload an image first.".to_string();
        return;
    };

    app.vision_session
        .push_user_with_images(&query, vec![image.encoded]);
    if !app.vision_transcript.is_empty() {
        app.vision_transcript.push_str("\n\n");
    }
    app.vision_transcript.push_str(&format!("You: {}\nAI: ", query));
    app.vision_input.clear();
    app.status = "Sending request to model...".to_string();
    app.input_mode = InputMode::Normal;

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    app.begin_stream(Screen::Vision, rx);

    let client = app.ollama.clone();
    let model = app.config.vision_model().to_string();
    let messages = app.vision_session.messages().to_vec();
    tokio::spawn(async move {
        client.ensure_model(&model).await;
        stream::run_chat_stream(client, model, messages, |delta| delta.to_string(), tx).await;
    });
}

fn submit_brochure(app: &mut App) {
    if reject_if_busy(app) {
        return;
    }

    let company = app.company_input.trimmed();
    let url = app.brochure_url_input.trimmed();
    if url.is_empty() {
        app.brochure_output = "Please enter a valid URL.".to_string();
        app.status.clear();
        return;
    }
    if company.is_empty() {
        app.brochure_output = "Please enter a company name.".to_string();
        app.status.clear();
        return;
    }

    app.brochure_output.clear();
    app.brochure_scroll = 0;
    app.status = "Generating brochure...".to_string();
    app.input_mode = InputMode::Normal;

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    app.begin_stream(Screen::Brochure, rx);

    let model = app.config.web_model().to_string();
    tokio::spawn(brochure::generate(
        app.ollama.clone(),
        app.http.clone(),
        model,
        company,
        url,
        tx,
    ));
}

fn submit_summary(app: &mut App) {
    if reject_if_busy(app) {
        return;
    }

    let url = app.summary_url_input.trimmed();
    if url.is_empty() {
        app.summary_output = "Please enter a valid URL.".to_string();
        app.status.clear();
        return;
    }

    app.summary_output.clear();
    app.summary_scroll = 0;
    app.status = "Summarizing...".to_string();
    app.input_mode = InputMode::Normal;

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    app.begin_stream(Screen::Summary, rx);

    let model = app.config.web_model().to_string();
    tokio::spawn(summary::summarize(
        app.ollama.clone(),
        app.http.clone(),
        model,
        url,
        tx,
    ));
}

/// Kicks off a model list fetch on a worker task. The picker opens when
/// `App::drain_model_list` sees the result; the UI loop keeps running in
/// the meantime.
fn open_model_picker(app: &mut App) {
    if app.models_rx.is_some() {
        return;
    }
    app.status = "Loading models...".to_string();

    let (tx, rx) = oneshot::channel();
    app.models_rx = Some(rx);

    let client = app.ollama.clone();
    tokio::spawn(async move {
        let _ = tx.send(client.list_models().await);
    });
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_output = app
        .output_area
        .map(|r| {
            mouse.column >= r.x
                && mouse.column < r.x + r.width
                && mouse.row >= r.y
                && mouse.row < r.y + r.height
        })
        .unwrap_or(false);

    if !in_output {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
