use enum_iterator::Sequence;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Resources the dispenser can deliver. The discriminant is the wire code, and the peripheral firmware
/// hardcodes this mapping: never renumber or insert entries.
#[repr(u8)]
#[derive(
    Copy, Clone, Debug, PartialEq, PartialOrd, IntoPrimitive, TryFromPrimitive, Eq, Hash, Sequence,
)]
pub enum ResourceType {
    Corn = 0,
    Wheat = 1,
    Barley = 2,
}

impl Default for ResourceType {
    fn default() -> Self {
        ResourceType::Corn
    }
}

impl ResourceType {
    /// Maps a raw selection index onto a [`ResourceType`], degrading to the default resource for anything
    /// that isn't a known code.
    pub fn from_selection(index: i64) -> Self {
        u8::try_from(index)
            .ok()
            .and_then(|code| ResourceType::try_from(code).ok())
            .unwrap_or_default()
    }

    /// The wire code for this resource.
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceType::Corn => "corn",
            ResourceType::Wheat => "wheat",
            ResourceType::Barley => "barley",
        }
    }

    /// All resources, ordered by wire code.
    pub fn all() -> impl Iterator<Item = ResourceType> {
        enum_iterator::all::<ResourceType>()
    }
}
