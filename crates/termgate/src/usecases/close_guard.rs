//! Confirmation gate for user-initiated window closes.

use crate::domain::WindowId;
use crate::usecases::ports::{ConfirmAnswer, ConfirmPrompt, TerminalHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Proceed,
    Cancel,
}

pub struct CloseGuard;

impl CloseGuard {
    /// Counts the window's open sub-sessions and asks only when more than one
    /// would be destroyed. Anything but an explicit yes cancels.
    pub fn confirm_close<H: TerminalHost>(
        host: &H,
        window: WindowId,
        prompt: &mut dyn ConfirmPrompt,
    ) -> CloseDecision {
        let open = host.sub_session_count(window);
        if open <= 1 {
            return CloseDecision::Proceed;
        }
        let message =
            format!("Close this window? {open} sessions are still running and will be ended.");
        match prompt.ask(&message) {
            ConfirmAnswer::Yes => CloseDecision::Proceed,
            ConfirmAnswer::No | ConfirmAnswer::Dismissed => CloseDecision::Cancel,
        }
    }
}
