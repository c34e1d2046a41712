use serde::Serialize;

use crate::core::pipeline::DeckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeckProgress {
    pub completed: usize,
    pub total: usize,
}

impl DeckProgress {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f32 * 100.0 / self.total as f32
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeckJobUpdate {
    Progress(DeckProgress),
    Complete(Result<DeckResult, String>),
    Cancelled,
}

impl DeckJobUpdate {
    pub fn update_type(&self) -> &'static str {
        match self {
            DeckJobUpdate::Progress(_) => "deck_progress",
            DeckJobUpdate::Complete(Ok(_)) => "deck_complete",
            DeckJobUpdate::Complete(Err(_)) => "deck_failed",
            DeckJobUpdate::Cancelled => "deck_cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeckJobUpdate::Progress(_))
    }
}
