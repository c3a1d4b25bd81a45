#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpenAIModel {
    #[default]
    Gpt4Turbo,
    Gpt4o,
    Gpt4oMini,
    Gpt41,
    Gpt41Mini,
    Override(String),
}

impl OpenAIModel {
    pub fn id(&self) -> &str {
        match self {
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt41 => "gpt-4.1",
            Self::Gpt41Mini => "gpt-4.1-mini",
            Self::Override(s) => s.as_str(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Gpt4Turbo => "OpenAI GPT-4 Turbo",
            Self::Gpt4o => "OpenAI GPT-4o",
            Self::Gpt4oMini => "OpenAI GPT-4o Mini",
            Self::Gpt41 => "OpenAI GPT-4.1",
            Self::Gpt41Mini => "OpenAI GPT-4.1 Mini",
            Self::Override(_) => "OpenAI (override)",
        }
    }

    /// Map a model id to a known variant, keeping unknown ids as overrides.
    pub fn from_id(id: &str) -> Self {
        match id {
            "gpt-4-turbo" => Self::Gpt4Turbo,
            "gpt-4o" => Self::Gpt4o,
            "gpt-4o-mini" => Self::Gpt4oMini,
            "gpt-4.1" => Self::Gpt41,
            "gpt-4.1-mini" => Self::Gpt41Mini,
            other => Self::Override(other.to_string()),
        }
    }
}
