use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SessionToken);
id_newtype!(EffectTicket);
id_newtype!(ElementId);

impl SessionToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Where a load session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Idle,
    Requesting,
    Loaded,
    Failed,
    /// Neither signal arrived inside the fallback window.
    TimedOut,
}

impl LoadPhase {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Loaded | Self::Failed | Self::TimedOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Recurring,
    OneShot,
    Subscription,
    Element,
}

impl EffectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::OneShot => "one_shot",
            Self::Subscription => "subscription",
            Self::Element => "element",
        }
    }
}
