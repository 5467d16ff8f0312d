//! PropertyFlags - per-property bit set driving the graph walker and the
//! cascade policies of session operations.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit set attached to each mapped property.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyFlags(u16);

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags(0);
    /// Property is never read or walked.
    pub const IGNORED: PropertyFlags = PropertyFlags(1 << 0);
    pub const CASCADE_SAVE: PropertyFlags = PropertyFlags(1 << 1);
    pub const CASCADE_REMOVE: PropertyFlags = PropertyFlags(1 << 2);
    pub const CASCADE_DETACH: PropertyFlags = PropertyFlags(1 << 3);
    pub const CASCADE_REFRESH: PropertyFlags = PropertyFlags(1 << 4);
    pub const CASCADE_MERGE: PropertyFlags = PropertyFlags(1 << 5);
    pub const INVERSE_SIDE: PropertyFlags = PropertyFlags(1 << 6);
    pub const NULLABLE: PropertyFlags = PropertyFlags(1 << 7);
    pub const ORPHAN_REMOVAL: PropertyFlags = PropertyFlags(1 << 8);
    /// Follow the edge when loading the removal set.
    pub const DEREFERENCE: PropertyFlags = PropertyFlags(1 << 9);

    pub const CASCADE_ALL: PropertyFlags = PropertyFlags(
        Self::CASCADE_SAVE.0
            | Self::CASCADE_REMOVE.0
            | Self::CASCADE_DETACH.0
            | Self::CASCADE_REFRESH.0
            | Self::CASCADE_MERGE.0,
    );

    pub const fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: PropertyFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for PropertyFlags {
    type Output = PropertyFlags;

    fn bitor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PropertyFlags {
    fn bitor_assign(&mut self, rhs: PropertyFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PropertyFlags {
    type Output = PropertyFlags;

    fn bitand(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for PropertyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(PropertyFlags, &str); 10] = [
            (PropertyFlags::IGNORED, "Ignored"),
            (PropertyFlags::CASCADE_SAVE, "CascadeSave"),
            (PropertyFlags::CASCADE_REMOVE, "CascadeRemove"),
            (PropertyFlags::CASCADE_DETACH, "CascadeDetach"),
            (PropertyFlags::CASCADE_REFRESH, "CascadeRefresh"),
            (PropertyFlags::CASCADE_MERGE, "CascadeMerge"),
            (PropertyFlags::INVERSE_SIDE, "InverseSide"),
            (PropertyFlags::NULLABLE, "Nullable"),
            (PropertyFlags::ORPHAN_REMOVAL, "OrphanRemoval"),
            (PropertyFlags::DEREFERENCE, "Dereference"),
        ];

        if self.is_empty() {
            return f.write_str("None");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
