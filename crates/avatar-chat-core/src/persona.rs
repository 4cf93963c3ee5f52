use std::str::FromStr;

/// System prompt used when no persona has been saved.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "フレンドリーに、簡潔に答えてください。絵文字は控えめに。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaPreset {
    Friendly,
    Cute,
    Serious,
}

impl PersonaPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaPreset::Friendly => "friendly",
            PersonaPreset::Cute => "cute",
            PersonaPreset::Serious => "serious",
        }
    }

    pub fn all() -> Vec<PersonaPreset> {
        vec![PersonaPreset::Friendly, PersonaPreset::Cute, PersonaPreset::Serious]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PersonaPreset::Friendly => "Friendly",
            PersonaPreset::Cute => "Cute",
            PersonaPreset::Serious => "Serious",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            PersonaPreset::Friendly => DEFAULT_SYSTEM_PROMPT,
            PersonaPreset::Cute => "やわらかい口調で、励ましを多めに。絵文字は少なめに。",
            PersonaPreset::Serious => "落ち着いた丁寧語で要点を簡潔に。絵文字は不要。",
        }
    }

    /// Next preset in display order, wrapping around.
    pub fn next(&self) -> Self {
        let all = Self::all();
        let idx = all.iter().position(|p| p == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }
}

/// Picks the effective system prompt: explicit text wins, then the preset,
/// then the default.
pub fn resolve_system_prompt(text: Option<&str>, preset: Option<PersonaPreset>) -> String {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => text.to_string(),
        None => preset
            .map(|p| p.prompt())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string(),
    }
}

impl FromStr for PersonaPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "friendly" => Ok(PersonaPreset::Friendly),
            "cute" => Ok(PersonaPreset::Cute),
            "serious" => Ok(PersonaPreset::Serious),
            other => Err(format!("Unknown persona preset: {}", other)),
        }
    }
}
