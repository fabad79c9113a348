//! Page protection and sharing modes of a mapping request.
use bitflags::bitflags;
use core::fmt::Display;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Requested or granted page protection.
    ///
    /// `NONE` is a distinguished value rather than the empty set: it asks for
    /// a mapping on which every access faults, and it must not be combined
    /// with any other flag.
    pub struct ProtectionSet: u32 {
        /// Allow reading from the mapped region.
        const READ = 1;

        /// Allow writing to the mapped region.
        const WRITE = 1 << 1;

        /// Allow executing code from the mapped region.
        const EXEC = 1 << 2;

        /// No access at all.
        const NONE = 1 << 3;
    }
}

impl ProtectionSet {
    /// Read and write.
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);
    /// Read and execute.
    pub const READ_EXEC: Self = Self::READ.union(Self::EXEC);
    /// Read, write and execute.
    pub const READ_WRITE_EXEC: Self = Self::READ.union(Self::WRITE).union(Self::EXEC);

    /// Every set the negotiation table can be asked about, well-formed or not.
    pub fn every() -> impl Iterator<Item = ProtectionSet> {
        (0..=Self::all().bits()).map(Self::from_bits_truncate)
    }

    /// Whether this is the distinguished no-access value on its own.
    #[inline]
    pub fn is_none_access(self) -> bool {
        self == Self::NONE
    }

    /// `NONE` mixed with other flags, or no flag at all.
    #[inline]
    pub fn is_malformed(self) -> bool {
        self.is_empty() || (self.contains(Self::NONE) && self != Self::NONE)
    }

    /// Write or execute without read. Page tables on every supported
    /// platform imply read for these, so they cannot be enforced exactly.
    #[inline]
    pub(crate) fn lacks_implied_read(self) -> bool {
        self.intersects(Self::WRITE | Self::EXEC) && !self.contains(Self::READ)
    }
}

impl Display for ProtectionSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// Copy-on-write isolation of a mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SharingMode {
    /// Writes reach the backing resource and every other shared mapping of it.
    #[default]
    Shared,
    /// Writes stay inside this mapping only.
    Private,
}

impl Display for SharingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SharingMode::Shared => f.write_str("shared"),
            SharingMode::Private => f.write_str("private"),
        }
    }
}
