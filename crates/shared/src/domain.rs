use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder recorded when a participant arrives without a `pid`.
pub const UNKNOWN_PARTICIPANT: &str = "unknown";

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_newtype!(ItemId);
string_newtype!(ParticipantId);

impl ParticipantId {
    /// Participant ids are not validated; a missing or blank id becomes the placeholder.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if !value.trim().is_empty() => Self(value.to_string()),
            _ => Self(UNKNOWN_PARTICIPANT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageNumber(pub u32);

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Congruency {
    More,
    Less,
}

impl Congruency {
    pub fn as_str(self) -> &'static str {
        match self {
            Congruency::More => "more",
            Congruency::Less => "less",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRole {
    Control,
    Treated,
    None,
}

/// Control/treatment split for one page, drawn once on first visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub control: ItemId,
    pub treated: ItemId,
    pub image_congruency: Congruency,
    pub text_congruency: Congruency,
}

impl Assignment {
    pub fn role_of(&self, item_id: &ItemId) -> ItemRole {
        if &self.control == item_id {
            ItemRole::Control
        } else if &self.treated == item_id {
            ItemRole::Treated
        } else {
            ItemRole::None
        }
    }
}

/// One video choice as loaded from the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    pub id: ItemId,
    pub page: PageNumber,
    pub vid_id: String,
    pub title: String,
    pub channel: String,
    pub duration: String,
    pub views: String,
    pub years: String,
    pub profile: String,
}
