use serde::{Deserialize, Serialize};

use crate::domain::{
    Assignment, Congruency, ItemId, ItemRole, PageNumber, ParticipantId, SessionId, VideoItem,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub total_pages: usize,
    pub last_page: PageNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageItemView {
    #[serde(flatten)]
    pub item: VideoItem,
    pub role: ItemRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Everything a host needs to draw the current choice screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub page: PageNumber,
    /// 1-based position of `page` in the walk.
    pub position: usize,
    pub total_pages: usize,
    pub last_page: PageNumber,
    pub items: Vec<PageItemView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<ItemId>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub page: PageNumber,
    pub item_id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub page: PageNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<ItemId>,
    /// False when the request was ignored (foreign item, stale page, finished session).
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub page: PageNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Advanced {
        logged: bool,
        next_page: PageNumber,
    },
    Completed {
        logged: bool,
    },
    /// The page was already advanced past; nothing changed.
    AlreadyAdvanced {
        current_page: PageNumber,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    pub page: PageNumber,
    pub item_id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub page_index: usize,
    pub current_page: PageNumber,
    pub completed: bool,
    pub selections: Vec<PageSelection>,
    pub logged_pages: Vec<PageNumber>,
}

/// One logged choice. Field names are the column/JSON names the log consumers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    pub timestamp_et: String,
    pub participant_id: ParticipantId,
    pub page: PageNumber,
    pub chosen_internal_id: ItemId,
    pub chosen_title: String,
    pub chosen_vid_id: String,
    pub control_internal_id: Option<ItemId>,
    pub control_vid_id: Option<String>,
    pub treated_internal_id: Option<ItemId>,
    pub treated_vid_id: Option<String>,
    pub treated_image_congruency: Option<Congruency>,
    pub treated_text_congruency: Option<Congruency>,
}
