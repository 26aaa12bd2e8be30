use std::fmt;

macro_rules! index_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub usize);

            impl $name {
                #[inline]
                pub fn index(self) -> usize {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<usize> for $name {
                fn from(value: usize) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

index_type! {
    /// Index of a region; `RegionId(0)` is always the room.
    RegionId,
    MaterialId,
    /// Index of a scorer within the region that owns it.
    ScorerId,
    /// Index of a treatment field grouping pencil beams.
    FieldId,
    BeamId,
    RayId,
}

impl RegionId {
    pub const ROOM: RegionId = RegionId(0);
}
