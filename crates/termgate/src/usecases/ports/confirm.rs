#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAnswer {
    Yes,
    No,
    /// The prompt went away without an explicit answer.
    Dismissed,
}

pub trait ConfirmPrompt: Send {
    fn ask(&mut self, message: &str) -> ConfirmAnswer;
}

/// Prompt whose answer was decided by the requester up front (`termgate close --yes`).
#[derive(Debug, Clone, Copy)]
pub struct PresetAnswer(pub ConfirmAnswer);

impl PresetAnswer {
    pub fn from_flag(confirmed: Option<bool>) -> Self {
        match confirmed {
            Some(true) => Self(ConfirmAnswer::Yes),
            Some(false) => Self(ConfirmAnswer::No),
            None => Self(ConfirmAnswer::Dismissed),
        }
    }
}

impl ConfirmPrompt for PresetAnswer {
    fn ask(&mut self, _message: &str) -> ConfirmAnswer {
        self.0
    }
}
