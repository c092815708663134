use anyhow::Result;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::ollama::OllamaClient;
use crate::scrape;
use crate::session::Session;
use crate::stream::{StreamUpdate, ThinkFilter};
use crate::vision::LoadedImage;

pub const ANSWER_PLACEHOLDER: &str = "Your answer will appear here.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Vision,
    Brochure,
    Summary,
}

impl Screen {
    pub fn title(&self) -> &'static str {
        match self {
            Screen::Chat => "Chat",
            Screen::Vision => "Vision",
            Screen::Brochure => "Brochure",
            Screen::Summary => "Summary",
        }
    }

    /// Whether the screen has a secondary field above the main input
    /// (image path / company name).
    pub fn has_source_field(&self) -> bool {
        matches!(self, Screen::Vision | Screen::Brochure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    /// Secondary input: image path (Vision) or company name (Brochure).
    Source,
    /// Main input: question or URL.
    Input,
    Output,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// A single-line text field with a character-indexed cursor.
#[derive(Debug, Clone, Default)]
pub struct InputField {
    pub text: String,
    pub cursor: usize,
}

impl InputField {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn trimmed(&self) -> String {
        self.text.trim().to_string()
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Chat screen
    pub chat_input: InputField,
    pub chat_answer: String,
    pub chat_scroll: u16,
    pub session: Session,

    // Vision screen
    pub image_path_input: InputField,
    pub vision_input: InputField,
    pub vision_image: Option<LoadedImage>,
    pub vision_transcript: String,
    pub vision_scroll: u16,
    pub vision_session: Session,

    // Brochure screen
    pub company_input: InputField,
    pub brochure_url_input: InputField,
    pub brochure_output: String,
    pub brochure_scroll: u16,

    // Summary screen
    pub summary_url_input: InputField,
    pub summary_output: String,
    pub summary_scroll: u16,

    // In-flight request state
    pub busy: bool,
    pub status: String,
    pub animation_frame: u8,
    pub stream_rx: Option<mpsc::Receiver<StreamUpdate>>,
    pub stream_screen: Screen,
    // Sink length at stream start; on failure the sink is truncated back
    // to this point before the error string is inserted
    pub response_anchor: usize,

    // Output pane geometry (updated during render)
    pub output_height: u16,
    pub output_lines: u16,
    pub output_area: Option<Rect>,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,
    /// In-flight model list fetch; resolved by `drain_model_list`.
    pub models_rx: Option<oneshot::Receiver<Result<Vec<String>>>>,

    // Clients and config
    pub ollama: OllamaClient,
    pub http: reqwest::Client,
    pub think_filter: ThinkFilter,
    pub config: Config,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load().unwrap_or_else(|_| Config::new());
        let ollama = OllamaClient::new(config.base_url());
        let http = scrape::http_client()?;
        let think_filter = ThinkFilter::new()?;

        Ok(Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Normal,
            focus: FocusPane::Input,

            chat_input: InputField::default(),
            chat_answer: ANSWER_PLACEHOLDER.to_string(),
            chat_scroll: 0,
            session: Session::new(),

            image_path_input: InputField::default(),
            vision_input: InputField::default(),
            vision_image: None,
            vision_transcript: String::new(),
            vision_scroll: 0,
            vision_session: Session::new(),

            company_input: InputField::default(),
            brochure_url_input: InputField::default(),
            brochure_output: String::new(),
            brochure_scroll: 0,

            summary_url_input: InputField::default(),
            summary_output: String::new(),
            summary_scroll: 0,

            busy: false,
            status: String::new(),
            animation_frame: 0,
            stream_rx: None,
            stream_screen: Screen::Chat,
            response_anchor: 0,

            output_height: 0,
            output_lines: 0,
            output_area: None,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),
            models_rx: None,

            ollama,
            http,
            think_filter,
            config,
        })
    }

    // Screen switching

    pub fn switch_screen(&mut self, screen: Screen) {
        self.screen = screen;
        self.input_mode = InputMode::Normal;
        self.focus = if screen.has_source_field() {
            FocusPane::Source
        } else {
            FocusPane::Input
        };
    }

    /// Tab order: Source (if present) -> Input -> Output -> back.
    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Source => FocusPane::Input,
            FocusPane::Input => FocusPane::Output,
            FocusPane::Output => {
                if self.screen.has_source_field() {
                    FocusPane::Source
                } else {
                    FocusPane::Input
                }
            }
        };
    }

    /// The input field under the cursor, if focus is on one.
    pub fn active_field_mut(&mut self) -> Option<&mut InputField> {
        match (self.screen, self.focus) {
            (Screen::Chat, FocusPane::Input) => Some(&mut self.chat_input),
            (Screen::Vision, FocusPane::Source) => Some(&mut self.image_path_input),
            (Screen::Vision, FocusPane::Input) => Some(&mut self.vision_input),
            (Screen::Brochure, FocusPane::Source) => Some(&mut self.company_input),
            (Screen::Brochure, FocusPane::Input) => Some(&mut self.brochure_url_input),
            (Screen::Summary, FocusPane::Input) => Some(&mut self.summary_url_input),
            _ => None,
        }
    }

    // Streaming

    /// Arms the update channel for a freshly spawned worker. The response
    /// anchor is the current end of the sink: deltas append after it and a
    /// failure truncates back to it.
    pub fn begin_stream(&mut self, screen: Screen, rx: mpsc::Receiver<StreamUpdate>) {
        self.stream_screen = screen;
        self.response_anchor = self.sink(screen).len();
        self.stream_rx = Some(rx);
        self.busy = true;
    }

    fn sink(&self, screen: Screen) -> &String {
        match screen {
            Screen::Chat => &self.chat_answer,
            Screen::Vision => &self.vision_transcript,
            Screen::Brochure => &self.brochure_output,
            Screen::Summary => &self.summary_output,
        }
    }

    fn sink_mut(&mut self, screen: Screen) -> &mut String {
        match screen {
            Screen::Chat => &mut self.chat_answer,
            Screen::Vision => &mut self.vision_transcript,
            Screen::Brochure => &mut self.brochure_output,
            Screen::Summary => &mut self.summary_output,
        }
    }

    /// Applies pending worker updates. Called once per UI loop iteration.
    /// The receiver is taken out of `self` for the duration of the drain and
    /// re-armed only while the stream is still live.
    pub fn drain_stream_updates(&mut self) {
        let Some(mut rx) = self.stream_rx.take() else {
            return;
        };

        let mut finished = false;
        loop {
            match rx.try_recv() {
                Ok(StreamUpdate::Delta(delta)) => {
                    let screen = self.stream_screen;
                    self.sink_mut(screen).push_str(&delta);
                }
                Ok(StreamUpdate::Done(full)) => {
                    self.finish_response(full);
                    finished = true;
                }
                Ok(StreamUpdate::Failed(error)) => {
                    self.fail_response(error);
                    finished = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Worker died without a terminal update; never leave the
                    // input locked
                    if !finished {
                        self.fail_response("Error: response stream ended unexpectedly.".to_string());
                    }
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            self.stream_rx = Some(rx);
        }
    }

    fn finish_response(&mut self, full: String) {
        match self.stream_screen {
            Screen::Chat => {
                self.session.push_assistant(&full);
                self.status = "Answered".to_string();
            }
            Screen::Vision => {
                self.vision_session.push_assistant(&full);
                self.status = "Response complete.".to_string();
            }
            Screen::Brochure | Screen::Summary => {
                self.status = "Done.".to_string();
            }
        }
        self.busy = false;
    }

    /// The sink shows only the error string, never error appended to
    /// partial content. No assistant message is recorded.
    fn fail_response(&mut self, error: String) {
        let screen = self.stream_screen;
        let anchor = self.response_anchor;
        let sink = self.sink_mut(screen);
        sink.truncate(anchor);
        sink.push_str(&error);

        self.status = match screen {
            Screen::Vision => "Failed to get response.".to_string(),
            _ => "Error".to_string(),
        };
        self.busy = false;
    }

    // Reset

    /// Clears the current screen's conversation state, inputs, outputs,
    /// and status. Idempotent.
    pub fn reset_current_screen(&mut self) {
        match self.screen {
            Screen::Chat => {
                self.session.reset();
                self.chat_input.clear();
                self.chat_answer = ANSWER_PLACEHOLDER.to_string();
                self.chat_scroll = 0;
            }
            Screen::Vision => {
                self.vision_session.reset();
                self.image_path_input.clear();
                self.vision_input.clear();
                self.vision_image = None;
                self.vision_transcript.clear();
                self.vision_scroll = 0;
            }
            Screen::Brochure => {
                self.company_input.clear();
                self.brochure_url_input.clear();
                self.brochure_output.clear();
                self.brochure_scroll = 0;
            }
            Screen::Summary => {
                self.summary_url_input.clear();
                self.summary_output.clear();
                self.summary_scroll = 0;
            }
        }
        self.status.clear();
    }

    // Models

    pub fn current_model(&self) -> &str {
        match self.screen {
            Screen::Chat => self.config.chat_model(),
            Screen::Vision => self.config.vision_model(),
            Screen::Brochure | Screen::Summary => self.config.web_model(),
        }
    }

    pub fn set_current_model(&mut self, model: String) {
        match self.screen {
            Screen::Chat => self.config.chat_model = Some(model),
            Screen::Vision => self.config.vision_model = Some(model),
            Screen::Brochure | Screen::Summary => self.config.web_model = Some(model),
        }
        if let Err(e) = self.config.save() {
            tracing::warn!("failed to save config: {}", e);
        }
    }

    /// Applies a finished model list fetch, if one resolved. The fetch runs
    /// on a worker task so an unresponsive host never stalls the UI loop.
    pub fn drain_model_list(&mut self) {
        let Some(mut rx) = self.models_rx.take() else {
            return;
        };

        match rx.try_recv() {
            Ok(Ok(models)) if !models.is_empty() => {
                let current_idx = models
                    .iter()
                    .position(|m| m == self.current_model())
                    .unwrap_or(0);
                self.available_models = models;
                self.model_picker_state.select(Some(current_idx));
                self.show_model_picker = true;
                self.status.clear();
            }
            Ok(Ok(_)) => {
                self.status =
                    "No models found. Pull one with: ollama pull gemma3:1b".to_string();
            }
            Ok(Err(e)) => {
                self.status = format!("Error: {}", e);
            }
            Err(oneshot::error::TryRecvError::Empty) => {
                self.models_rx = Some(rx);
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                self.status = "Error: could not load the model list.".to_string();
            }
        }
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i).cloned() {
                self.set_current_model(model);
            }
        }
        self.show_model_picker = false;
    }

    // Output scrolling

    pub fn output_scroll_mut(&mut self) -> &mut u16 {
        match self.screen {
            Screen::Chat => &mut self.chat_scroll,
            Screen::Vision => &mut self.vision_scroll,
            Screen::Brochure => &mut self.brochure_scroll,
            Screen::Summary => &mut self.summary_scroll,
        }
    }

    pub fn scroll_down(&mut self, amount: u16) {
        let max_scroll = self.output_lines.saturating_sub(self.output_height);
        let scroll = self.output_scroll_mut();
        *scroll = scroll.saturating_add(amount).min(max_scroll);
    }

    pub fn scroll_up(&mut self, amount: u16) {
        let scroll = self.output_scroll_mut();
        *scroll = scroll.saturating_sub(amount);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down(self.output_height / 2);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up(self.output_height / 2);
    }

    pub fn scroll_to_top(&mut self) {
        *self.output_scroll_mut() = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        let max_scroll = self.output_lines.saturating_sub(self.output_height);
        *self.output_scroll_mut() = max_scroll;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new().unwrap()
    }

    fn channel() -> (mpsc::Sender<StreamUpdate>, mpsc::Receiver<StreamUpdate>) {
        mpsc::channel(16)
    }

    #[tokio::test]
    async fn deltas_append_to_the_armed_sink_and_done_records_the_turn() {
        let mut app = app();
        app.session.push_user("hi");
        app.chat_answer.clear();

        let (tx, rx) = channel();
        app.begin_stream(Screen::Chat, rx);
        assert!(app.busy);

        tx.send(StreamUpdate::Delta("Hel".into())).await.unwrap();
        tx.send(StreamUpdate::Delta("lo".into())).await.unwrap();
        tx.send(StreamUpdate::Done("Hello".into())).await.unwrap();

        app.drain_stream_updates();
        assert_eq!(app.chat_answer, "Hello");
        assert!(!app.busy);
        assert!(app.stream_rx.is_none());
        assert_eq!(app.status, "Answered");
        // Exactly one user and one assistant message
        assert_eq!(app.session.len(), 2);
    }

    #[tokio::test]
    async fn failure_replaces_partial_content_and_appends_no_assistant_turn() {
        let mut app = app();
        app.session.push_user("hi");
        app.chat_answer.clear();

        let (tx, rx) = channel();
        app.begin_stream(Screen::Chat, rx);

        tx.send(StreamUpdate::Delta("partial answer".into()))
            .await
            .unwrap();
        tx.send(StreamUpdate::Failed("Error: connection refused".into()))
            .await
            .unwrap();

        app.drain_stream_updates();
        assert_eq!(app.chat_answer, "Error: connection refused");
        assert_eq!(app.session.len(), 1);
        assert!(!app.busy);
    }

    #[tokio::test]
    async fn failure_on_vision_keeps_text_before_the_anchor() {
        let mut app = app();
        app.vision_transcript = "You: what is this?\nAI: ".to_string();

        let (tx, rx) = channel();
        app.begin_stream(Screen::Vision, rx);

        tx.send(StreamUpdate::Delta("a cat, maybe".into())).await.unwrap();
        tx.send(StreamUpdate::Failed("Error: timed out".into()))
            .await
            .unwrap();

        app.drain_stream_updates();
        assert_eq!(app.vision_transcript, "You: what is this?\nAI: Error: timed out");
        assert_eq!(app.status, "Failed to get response.");
    }

    #[tokio::test]
    async fn partial_drain_keeps_the_channel_armed_for_later_updates() {
        let mut app = app();
        app.chat_answer.clear();

        let (tx, rx) = channel();
        app.begin_stream(Screen::Chat, rx);

        tx.send(StreamUpdate::Delta("Hel".into())).await.unwrap();
        app.drain_stream_updates();
        assert_eq!(app.chat_answer, "Hel");
        assert!(app.busy);
        assert!(app.stream_rx.is_some());

        tx.send(StreamUpdate::Delta("lo".into())).await.unwrap();
        tx.send(StreamUpdate::Done("Hello".into())).await.unwrap();
        app.drain_stream_updates();
        assert_eq!(app.chat_answer, "Hello");
        assert!(!app.busy);
        assert!(app.stream_rx.is_none());
    }

    #[tokio::test]
    async fn model_list_fetch_resolves_without_blocking_the_drain() {
        let mut app = app();
        app.config.chat_model = Some("gemma3:1b".to_string());

        let (tx, rx) = oneshot::channel();
        app.models_rx = Some(rx);

        // Nothing arrived yet; the fetch stays pending
        app.drain_model_list();
        assert!(app.models_rx.is_some());
        assert!(!app.show_model_picker);

        tx.send(Ok(vec!["llava".to_string(), "gemma3:1b".to_string()]))
            .unwrap();
        app.drain_model_list();
        assert!(app.show_model_picker);
        assert_eq!(app.available_models.len(), 2);
        assert_eq!(app.model_picker_state.selected(), Some(1));
        assert!(app.models_rx.is_none());
    }

    #[tokio::test]
    async fn failed_model_list_fetch_reports_on_the_status_line() {
        let mut app = app();
        let (tx, rx) = oneshot::channel();
        app.models_rx = Some(rx);
        tx.send(Err(anyhow::anyhow!("connection refused"))).unwrap();

        app.drain_model_list();
        assert_eq!(app.status, "Error: connection refused");
        assert!(!app.show_model_picker);
        assert!(app.models_rx.is_none());
    }

    #[tokio::test]
    async fn dropped_worker_without_terminal_update_clears_busy() {
        let mut app = app();
        app.chat_answer.clear();

        let (tx, rx) = channel();
        app.begin_stream(Screen::Chat, rx);
        drop(tx);

        app.drain_stream_updates();
        assert!(!app.busy);
        assert!(app.chat_answer.starts_with("Error:"));
    }

    #[test]
    fn reset_clears_session_surfaces_and_status() {
        let mut app = app();
        app.session.push_user("q");
        app.session.push_assistant("a");
        app.chat_input.text = "typed".into();
        app.chat_answer = "old answer".into();
        app.status = "Answered".into();

        app.reset_current_screen();
        assert!(app.session.is_empty());
        assert!(app.chat_input.text.is_empty());
        assert_eq!(app.chat_answer, ANSWER_PLACEHOLDER);
        assert!(app.status.is_empty());

        // Idempotent
        app.reset_current_screen();
        assert!(app.session.is_empty());
    }

    #[test]
    fn focus_cycle_includes_source_field_only_where_one_exists() {
        let mut app = app();
        app.switch_screen(Screen::Chat);
        assert_eq!(app.focus, FocusPane::Input);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Output);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Input);

        app.switch_screen(Screen::Vision);
        assert_eq!(app.focus, FocusPane::Source);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Input);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Output);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Source);
    }

    #[test]
    fn input_field_edits_are_utf8_safe() {
        let mut field = InputField::default();
        for c in "héllo".chars() {
            field.insert(c);
        }
        assert_eq!(field.text, "héllo");
        assert_eq!(field.cursor, 5);

        field.left();
        field.left();
        field.left();
        field.left();
        field.backspace();
        assert_eq!(field.text, "éllo");
        assert_eq!(field.cursor, 0);

        field.delete();
        assert_eq!(field.text, "llo");
        field.end();
        assert_eq!(field.cursor, 3);
    }
}
