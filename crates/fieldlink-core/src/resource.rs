use crate::constants::NO_SERVER_ID;
use crate::error::ChannelError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned numeric identifier. Absent (`None` on the resource) until
/// the first successful save; [`NO_SERVER_ID`] is the reverse-index sentinel.
pub type ResourceId = i64;

/// Folder identifiers are ordinary server ids of `Folder` resources.
pub type FolderId = ResourceId;

/// Local-vs-server agreement for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialStatus {
    /// Matches the server's persisted state.
    #[default]
    Saved,
    /// A local edit is pending.
    Dirty,
    /// A save or destroy request is in flight.
    Saving,
}

/// A normalized, kind-tagged domain object.
///
/// The UUID is client-generated, immutable, and unique within the index for
/// the resource's client-side lifetime; the server id may be absent pre-save
/// and must stay stable once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uuid: Uuid,
    pub id: Option<ResourceId>,
    pub body: ResourceBody,
    pub special_status: SpecialStatus,
}

impl Resource {
    /// A locally-created resource: fresh UUID, no server id, dirty.
    pub fn local(body: ResourceBody) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: None,
            body,
            special_status: SpecialStatus::Dirty,
        }
    }

    /// A resource synthesized from a push-channel update: fresh UUID, saved.
    /// An external change is by definition not locally dirty.
    pub fn remote(id: ResourceId, body: ResourceBody) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: Some(id),
            body,
            special_status: SpecialStatus::Saved,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.body.kind()
    }

    pub fn server_id_or_sentinel(&self) -> ResourceId {
        self.id.unwrap_or(NO_SERVER_ID)
    }
}

/// Kind-specific resource fields. The variant determines the resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum ResourceBody {
    Device(DeviceBody),
    Sequence(SequenceBody),
    Regimen(RegimenBody),
    FarmEvent(FarmEventBody),
    PinBinding(PinBindingBody),
    BootConfig(BootConfigBody),
    Folder(FolderBody),
    Log(LogBody),
    Point(PointBody),
    EnvVar(EnvVarBody),
}

impl ResourceBody {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Device(_) => ResourceKind::Device,
            Self::Sequence(_) => ResourceKind::Sequence,
            Self::Regimen(_) => ResourceKind::Regimen,
            Self::FarmEvent(_) => ResourceKind::FarmEvent,
            Self::PinBinding(_) => ResourceKind::PinBinding,
            Self::BootConfig(_) => ResourceKind::BootConfig,
            Self::Folder(_) => ResourceKind::Folder,
            Self::Log(_) => ResourceKind::Log,
            Self::Point(_) => ResourceKind::Point,
            Self::EnvVar(_) => ResourceKind::EnvVar,
        }
    }

    /// Decode the kind-specific fields of a push-channel `body` document.
    ///
    /// The kind comes from the topic, not the payload, so this dispatches on
    /// the closed enumeration rather than inspecting the document.
    pub fn from_wire(
        kind: ResourceKind,
        value: serde_json::Value,
    ) -> std::result::Result<Self, ChannelError> {
        fn decode<T: serde::de::DeserializeOwned>(
            kind: ResourceKind,
            value: serde_json::Value,
        ) -> std::result::Result<T, ChannelError> {
            serde_json::from_value(value).map_err(|e| ChannelError::BodyDecode {
                kind,
                reason: e.to_string(),
            })
        }
        match kind {
            ResourceKind::Device => decode(kind, value).map(Self::Device),
            ResourceKind::Sequence => decode(kind, value).map(Self::Sequence),
            ResourceKind::Regimen => decode(kind, value).map(Self::Regimen),
            ResourceKind::FarmEvent => decode(kind, value).map(Self::FarmEvent),
            ResourceKind::PinBinding => decode(kind, value).map(Self::PinBinding),
            ResourceKind::BootConfig => decode(kind, value).map(Self::BootConfig),
            ResourceKind::Folder => decode(kind, value).map(Self::Folder),
            ResourceKind::Log => decode(kind, value).map(Self::Log),
            ResourceKind::Point => decode(kind, value).map(Self::Point),
            ResourceKind::EnvVar => decode(kind, value).map(Self::EnvVar),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A declared sequence variable, bindable by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub label: String,
    #[serde(default)]
    pub data_type: Option<String>,
}

/// One executable step inside a sequence body.
///
/// Steps form a tree: conditional branches may carry a nested step, so a
/// call (`Execute`) can sit arbitrarily deep inside `If` arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Execute {
        sequence_id: ResourceId,
    },
    If {
        lhs: String,
        #[serde(rename = "operator")]
        op: String,
        rhs: i64,
        #[serde(default)]
        on_true: Option<Box<Step>>,
        #[serde(default)]
        on_false: Option<Box<Step>>,
    },
    Wait {
        milliseconds: u64,
    },
    WritePin {
        pin: u8,
        value: i64,
    },
    EmitLog {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequenceBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    #[serde(default)]
    pub args: Vec<VariableDecl>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimenItem {
    pub time_offset_ms: i64,
    pub sequence_id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimenBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub regimen_items: Vec<RegimenItem>,
}

/// What a farm event runs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Executable {
    Sequence(ResourceId),
    Regimen(ResourceId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmEventBody {
    pub executable: Executable,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub repeat: Option<i64>,
    #[serde(default)]
    pub time_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PinBindingBody {
    pub pin_num: u8,
    #[serde(default)]
    pub sequence_id: Option<ResourceId>,
    #[serde(default)]
    pub special_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BootConfigBody {
    #[serde(default)]
    pub boot_sequence_id: Option<ResourceId>,
    #[serde(default)]
    pub os_auto_update: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FolderBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub verbosity: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub pointer_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvVarBody {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_resource_starts_dirty_without_server_id() {
        let r = Resource::local(ResourceBody::Sequence(SequenceBody {
            name: "water all".into(),
            ..Default::default()
        }));
        assert_eq!(r.id, None);
        assert_eq!(r.special_status, SpecialStatus::Dirty);
        assert_eq!(r.kind(), ResourceKind::Sequence);
        assert_eq!(r.server_id_or_sentinel(), NO_SERVER_ID);
    }

    #[test]
    fn remote_resource_starts_saved() {
        let r = Resource::remote(9, ResourceBody::Point(PointBody::default()));
        assert_eq!(r.id, Some(9));
        assert_eq!(r.special_status, SpecialStatus::Saved);
        assert_eq!(r.server_id_or_sentinel(), 9);
    }

    #[test]
    fn wire_decode_dispatches_on_kind() {
        let body = ResourceBody::from_wire(
            ResourceKind::Regimen,
            json!({
                "name": "spring",
                "regimen_items": [{"time_offset_ms": 1000, "sequence_id": 4}],
            }),
        )
        .unwrap();
        match body {
            ResourceBody::Regimen(r) => {
                assert_eq!(r.name, "spring");
                assert_eq!(r.regimen_items[0].sequence_id, 4);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn wire_decode_rejects_shape_mismatch() {
        // PinBinding requires pin_num; an array is not even an object
        let err = ResourceBody::from_wire(ResourceKind::PinBinding, json!([1, 2, 3])).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::BodyDecode {
                kind: ResourceKind::PinBinding,
                ..
            }
        ));
    }

    #[test]
    fn nested_steps_roundtrip_through_serde() {
        let step = Step::If {
            lhs: "pin23".into(),
            op: "is".into(),
            rhs: 1,
            on_true: Some(Box::new(Step::Execute { sequence_id: 7 })),
            on_false: None,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["op"], "if");
        assert_eq!(json["on_true"]["op"], "execute");
        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn body_kind_matches_variant() {
        assert_eq!(
            ResourceBody::BootConfig(BootConfigBody::default()).kind(),
            ResourceKind::BootConfig
        );
        assert_eq!(
            ResourceBody::EnvVar(EnvVarBody::default()).kind(),
            ResourceKind::EnvVar
        );
    }
}
