//! Persisting resources as physical storage units.
//!
//! ```text
//! ┌──────────────┐  encode_resource   ┌──────────────┐  ResourceFormat  ┌──────────────┐
//! │  ModelState  │ ─────────────────► │ UnitSnapshot │ ───────────────► │    bytes     │
//! │  (resource)  │ ◄───────────────── │  (per unit)  │ ◄─────────────── │ ResourceStore│
//! └──────────────┘    decode_unit     └──────────────┘                  └──────────────┘
//! ```
//!
//! Formats work on standalone [`UnitSnapshot`]s so they can be tested and
//! composed without an editing domain. Stores move bytes and know nothing
//! about formats.

pub mod codec;
mod error;
mod format;
mod json;
mod snapshot;
mod store;

pub use codec::{DecodedUnit, EncodedUnit, Stub, decode_unit, encode_resource};
pub use error::InterchangeError;
pub use format::{FormatCapability, ResourceFormat};
pub use json::JsonFormat;
pub use snapshot::{ChildRecord, ObjectRecord, SlotRecord, UnitSnapshot, ValueRecord};
pub use store::{FileStore, MemoryStore, ResourceStore};
