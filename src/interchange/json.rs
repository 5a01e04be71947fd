//! JSON encoding of storage units.
//!
//! ```json
//! {
//!   "uri": "mem:/model.json",
//!   "roots": [
//!     {
//!       "id": "root",
//!       "class": "Node",
//!       "slots": [
//!         { "feature": "name", "value": { "kind": "string", "value": "R" } },
//!         { "feature": "children", "value": { "kind": "list", "value": [
//!           { "kind": "child", "value": { "storage": "unit", "id": "a",
//!             "class": "Node", "uri": "mem:/model_a.json" } }
//!         ] } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use super::snapshot::UnitSnapshot;
use super::{FormatCapability, InterchangeError, ResourceFormat};

/// JSON format handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl ResourceFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn capabilities(&self) -> FormatCapability {
        FormatCapability::FULL
    }

    fn read(&self, input: &[u8]) -> Result<UnitSnapshot, InterchangeError> {
        #[cfg(feature = "interchange")]
        {
            serde_json::from_slice(input)
                .map_err(|e| InterchangeError::format(format!("parse error: {e}")))
        }
        #[cfg(not(feature = "interchange"))]
        {
            let _ = input;
            Err(InterchangeError::Unsupported(
                "JSON reading requires the 'interchange' feature".to_string(),
            ))
        }
    }

    fn write(&self, unit: &UnitSnapshot) -> Result<Vec<u8>, InterchangeError> {
        #[cfg(feature = "interchange")]
        {
            serde_json::to_vec_pretty(unit)
                .map_err(|e| InterchangeError::format(format!("serialization error: {e}")))
        }
        #[cfg(not(feature = "interchange"))]
        {
            let _ = unit;
            Err(InterchangeError::Unsupported(
                "JSON writing requires the 'interchange' feature".to_string(),
            ))
        }
    }

    fn validate(&self, input: &[u8]) -> Result<(), InterchangeError> {
        let start = input.iter().find(|b| !b.is_ascii_whitespace());
        match start {
            Some(b'{') => Ok(()),
            _ => Err(InterchangeError::format("expected a JSON object")),
        }
    }
}

#[cfg(all(test, feature = "interchange"))]
mod tests {
    use super::*;
    use crate::interchange::snapshot::{ChildRecord, ObjectRecord, SlotRecord, ValueRecord};

    #[test]
    fn test_write_then_read_preserves_stub() {
        let unit = UnitSnapshot {
            uri: "mem:/m.json".into(),
            roots: vec![ObjectRecord {
                id: "root".into(),
                class: "Node".into(),
                slots: vec![
                    SlotRecord {
                        feature: "name".into(),
                        value: ValueRecord::String("R".into()),
                    },
                    SlotRecord {
                        feature: "child".into(),
                        value: ValueRecord::Child(ChildRecord::Unit {
                            id: "a".into(),
                            class: "Node".into(),
                            uri: "mem:/m_a.json".into(),
                        }),
                    },
                ],
            }],
        };
        let bytes = JsonFormat.write(&unit).unwrap();
        assert!(JsonFormat.validate(&bytes).is_ok());
        assert_eq!(JsonFormat.read(&bytes).unwrap(), unit);
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(matches!(
            JsonFormat.read(b"not json"),
            Err(InterchangeError::Format(_))
        ));
        assert!(JsonFormat.validate(b"[1, 2]").is_err());
    }
}
