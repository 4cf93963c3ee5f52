//! The text-mode avatar whose mouth follows speech and streamed text.

use avatar_chat_core::Avatar;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceEvent {
    Talking(bool),
    Chunk(usize),
}

/// Forwards avatar signals to the UI task. Safe to call from any task.
pub struct ChannelAvatar {
    tx: mpsc::UnboundedSender<FaceEvent>,
}

impl ChannelAvatar {
    pub fn new(tx: mpsc::UnboundedSender<FaceEvent>) -> Self {
        Self { tx }
    }
}

impl Avatar for ChannelAvatar {
    fn set_talking(&self, talking: bool) {
        let _ = self.tx.send(FaceEvent::Talking(talking));
    }

    fn on_assistant_chunk(&self, len: usize) {
        let _ = self.tx.send(FaceEvent::Chunk(len));
    }
}

const ENERGY_PER_CHAR: f32 = 0.08;
const ENERGY_DECAY: f32 = 0.6;

#[derive(Debug, Default)]
pub struct Face {
    talking: bool,
    energy: f32,
    frame: u8,
}

impl Face {
    pub fn apply(&mut self, event: FaceEvent) {
        match event {
            FaceEvent::Talking(talking) => {
                self.talking = talking;
                if !talking {
                    self.energy = 0.0;
                }
            }
            FaceEvent::Chunk(len) => {
                self.energy = (self.energy + len as f32 * ENERGY_PER_CHAR).min(1.0);
            }
        }
    }

    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        self.energy *= ENERGY_DECAY;
        if self.energy < 0.01 {
            self.energy = 0.0;
        }
    }

    pub fn is_talking(&self) -> bool {
        self.talking
    }

    pub fn frame(&self) -> u8 {
        self.frame
    }

    pub fn mouth(&self) -> &'static str {
        if !self.talking {
            return if self.energy > 0.3 { "o" } else { "‿" };
        }
        // Alternate open and closed so the mouth flaps while audio plays.
        match (self.frame % 2, self.energy > 0.5) {
            (0, true) => "O",
            (0, false) => "o",
            _ => "-",
        }
    }

    pub fn eyes(&self) -> &'static str {
        // Blink once every few seconds.
        if self.frame % 24 == 23 {
            "–   –"
        } else {
            "●   ●"
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            "╭─────────╮".to_string(),
            format!("│  {}  │", self.eyes()),
            format!("│    {}    │", self.mouth()),
            "╰─────────╯".to_string(),
        ]
    }
}
