//! Identifier newtypes shared across the quiver engine.
//!
//! Every durable object in the catalog is addressed by one of these ids.
//! They are deliberately plain tuple structs so that storage code can read
//! and write them without conversion ceremony.

use std::fmt;

/// Defines a transparent newtype over an integer id.
macro_rules! id_newtype {
    ($(#[$attr:meta])* $name:ident($prim:ty)) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub $prim);

        impl $name {
            /// Sentinel meaning "no such object".
            pub const INVALID: $name = $name(<$prim>::MAX);

            #[inline]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }

            #[inline]
            pub fn idx(self) -> usize {
                self.0 as usize
            }
        }

        impl From<$prim> for $name {
            fn from(value: $prim) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $prim {
            fn from(value: $name) -> $prim {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifies a table in the catalog. Assigned monotonically, never reused.
    TableId(u64)
);

id_newtype!(
    /// Identifies a property within one table. Assigned from a per-table
    /// counter, never reused even after the property is dropped.
    PropertyId(u32)
);

/// A row position within a table.
pub type Offset = u64;

/// Sentinel row position meaning "no row" / "empty table".
pub const INVALID_OFFSET: Offset = u64::MAX;

/// Direction of a relationship as seen from one of its endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RelDirection {
    Fwd,
    Bwd,
}

impl RelDirection {
    pub const ALL: [RelDirection; 2] = [RelDirection::Fwd, RelDirection::Bwd];

    #[inline]
    pub fn reverse(self) -> RelDirection {
        match self {
            RelDirection::Fwd => RelDirection::Bwd,
            RelDirection::Bwd => RelDirection::Fwd,
        }
    }
}

impl fmt::Display for RelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelDirection::Fwd => write!(f, "fwd"),
            RelDirection::Bwd => write!(f, "bwd"),
        }
    }
}
