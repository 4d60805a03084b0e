use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Winner,
    Testing,
    Loser,
    Paused,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Winner => "winner",
            Self::Testing => "testing",
            Self::Loser => "loser",
            Self::Paused => "paused",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "winner" => Some(Self::Winner),
            "testing" => Some(Self::Testing),
            "loser" => Some(Self::Loser),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Tofu,
    Mofu,
    Bofu,
}

impl FunnelStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tofu => "tofu",
            Self::Mofu => "mofu",
            Self::Bofu => "bofu",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tofu" => Some(Self::Tofu),
            "mofu" => Some(Self::Mofu),
            "bofu" => Some(Self::Bofu),
            _ => None,
        }
    }
}

/// User notes attached to one ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAnnotation {
    pub ad_id: String,
    pub notes: String,
    pub hook: String,
    pub verdict: Option<Verdict>,
    pub funnel_stage: Option<FunnelStage>,
    /// SQLite `datetime('now')`, UTC.
    pub updated_at: String,
}

/// Fields to write. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationUpdate {
    pub notes: Option<String>,
    pub hook: Option<String>,
    pub verdict: Option<Option<Verdict>>,
    pub funnel_stage: Option<Option<FunnelStage>>,
}

impl AnnotationUpdate {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none()
            && self.hook.is_none()
            && self.verdict.is_none()
            && self.funnel_stage.is_none()
    }
}
