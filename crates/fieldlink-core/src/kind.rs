use serde::{Deserialize, Serialize};

/// Resource kinds tracked by the client replica.
///
/// The wire names (topic segments, snapshot tags) are the variant names
/// verbatim, e.g. `FarmEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Device,
    Sequence,
    Regimen,
    FarmEvent,
    PinBinding,
    BootConfig,
    Folder,
    Log,
    Point,
    EnvVar,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        Self::Device,
        Self::Sequence,
        Self::Regimen,
        Self::FarmEvent,
        Self::PinBinding,
        Self::BootConfig,
        Self::Folder,
        Self::Log,
        Self::Point,
        Self::EnvVar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::Sequence => "Sequence",
            Self::Regimen => "Regimen",
            Self::FarmEvent => "FarmEvent",
            Self::PinBinding => "PinBinding",
            Self::BootConfig => "BootConfig",
            Self::Folder => "Folder",
            Self::Log => "Log",
            Self::Point => "Point",
            Self::EnvVar => "EnvVar",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "Device" => Some(Self::Device),
            "Sequence" => Some(Self::Sequence),
            "Regimen" => Some(Self::Regimen),
            "FarmEvent" => Some(Self::FarmEvent),
            "PinBinding" => Some(Self::PinBinding),
            "BootConfig" => Some(Self::BootConfig),
            "Folder" => Some(Self::Folder),
            "Log" => Some(Self::Log),
            "Point" => Some(Self::Point),
            "EnvVar" => Some(Self::EnvVar),
            _ => None,
        }
    }

    /// Whether updates for this kind are accepted from the push channel.
    ///
    /// `EnvVar` is device-internal data the server also happens to broadcast;
    /// the router short-circuits it before decoding the payload and the index
    /// never tracks it.
    pub fn channel_synced(&self) -> bool {
        !matches!(self, Self::EnvVar)
    }

    /// Whether resources of this kind carry a folder assignment and therefore
    /// trigger a folder-tree rebuild when they change.
    pub fn folder_member(&self) -> bool {
        matches!(self, Self::Sequence)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
