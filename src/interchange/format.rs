//! Common trait for unit encodings.

use super::InterchangeError;
use super::snapshot::UnitSnapshot;

/// Capabilities supported by a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCapability {
    /// Can decode units.
    pub read: bool,
    /// Can encode units.
    pub write: bool,
    /// Keeps every feature value, including unknown ones on re-save.
    pub lossless: bool,
}

impl FormatCapability {
    /// Full capability (read, write, lossless).
    pub const FULL: Self = Self {
        read: true,
        write: true,
        lossless: true,
    };

    /// Read-only capability.
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
        lossless: true,
    };
}

/// Byte encoding of one physical storage unit.
///
/// The format works on [`UnitSnapshot`]s, not on the live graph, so it can
/// be exercised without an editing domain. The domain converts between the
/// graph and snapshots in [`codec`](super::codec).
pub trait ResourceFormat: Send + Sync {
    /// Human-readable name of the format.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> FormatCapability;

    /// Decode one unit.
    fn read(&self, input: &[u8]) -> Result<UnitSnapshot, InterchangeError>;

    /// Encode one unit.
    fn write(&self, unit: &UnitSnapshot) -> Result<Vec<u8>, InterchangeError>;

    /// Cheap well-formedness check that does not build a snapshot.
    fn validate(&self, input: &[u8]) -> Result<(), InterchangeError> {
        let _ = input;
        Ok(())
    }
}
