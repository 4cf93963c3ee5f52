use std::io::{self, Stderr};
use anyhow::Result;
use avatar_chat_core::{StreamEvent, StreamEvents};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind, MouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::app::{SpeakerEvents, SpeakersLoaded};
use crate::face::FaceEvent;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    /// Progress of the chat exchange in flight
    Chat(StreamEvent),
    /// Mouth signals from the session and the speech queue
    Face(FaceEvent),
    /// A background speaker list fetch finished
    Speakers(SpeakersLoaded),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    _tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventHandler {
    /// Merges terminal input, the animation tick, chat stream events, face
    /// signals and speaker list results into one ordered event channel.
    pub fn new(
        mut chat_events: StreamEvents,
        mut face_events: mpsc::UnboundedReceiver<FaceEvent>,
        mut speaker_events: SpeakerEvents,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _tx = tx.clone();

        // Spawn event reader task
        let tx_events = tx.clone();
        tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            while let Some(evt) = reader.next().await {
                let Ok(evt) = evt else { continue };
                let app_event = match evt {
                    // Only handle key press events, not release
                    Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
                    Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
                    Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
                    _ => None,
                };

                if let Some(event) = app_event {
                    if tx_events.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        let tx_chat = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = chat_events.recv().await {
                if tx_chat.send(AppEvent::Chat(event)).is_err() {
                    break;
                }
            }
        });

        let tx_face = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = face_events.recv().await {
                if tx_face.send(AppEvent::Face(event)).is_err() {
                    break;
                }
            }
        });

        let tx_speakers = tx.clone();
        tokio::spawn(async move {
            while let Some(loaded) = speaker_events.recv().await {
                if tx_speakers.send(AppEvent::Speakers(loaded)).is_err() {
                    break;
                }
            }
        });

        // Tick timer for the mouth animation (150ms interval)
        let tx_tick = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(150));
            loop {
                interval.tick().await;
                if tx_tick.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx, _tx }
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    // Mouse capture for transcript scrolling
    execute!(io::stderr(), EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stderr()))?)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), DisableMouseCapture, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Puts the terminal back before the default hook prints the panic.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}
