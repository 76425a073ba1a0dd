//! Decoded result of reading one statistic.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::source::Descriptor;
use crate::value::Value;

/// Outcome of the snapshot and decode steps for one statistic.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The statistic could not be read; carries the OS error text.
    Error(String),
    /// The statistic was read and decoded.
    Data {
        snaptime: u64,
        crtime: u64,
        data: Value,
    },
}

/// One statistic as returned by a read.
///
/// Serializes as `{class, module, name, instance, snaptime?, crtime?, error?, data?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub module: String,
    pub class: String,
    pub name: String,
    pub instance: i32,
    pub payload: Payload,
}

impl Record {
    pub(crate) fn new(desc: &Descriptor, payload: Payload) -> Self {
        Self {
            module: desc.module.clone(),
            class: desc.class.clone(),
            name: desc.name.clone(),
            instance: desc.instance,
            payload,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            Payload::Error(e) => Some(e),
            Payload::Data { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Data { data, .. } => Some(data),
            Payload::Error(_) => None,
        }
    }

    pub fn snaptime(&self) -> Option<u64> {
        match self.payload {
            Payload::Data { snaptime, .. } => Some(snaptime),
            Payload::Error(_) => None,
        }
    }

    pub fn crtime(&self) -> Option<u64> {
        match self.payload {
            Payload::Data { crtime, .. } => Some(crtime),
            Payload::Error(_) => None,
        }
    }

    /// Looks up a top-level field of the decoded data.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data()?.as_map()?.get(key)
    }

    /// `module:instance:name` identity, as printed by `kstat(1M)`.
    pub fn ident(&self) -> String {
        format!("{}:{}:{}", self.module, self.instance, self.name)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("class", &self.class)?;
        map.serialize_entry("module", &self.module)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("instance", &self.instance)?;
        match &self.payload {
            Payload::Error(e) => {
                map.serialize_entry("error", e)?;
            }
            Payload::Data {
                snaptime,
                crtime,
                data,
            } => {
                map.serialize_entry("snaptime", snaptime)?;
                map.serialize_entry("crtime", crtime)?;
                map.serialize_entry("data", data)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{StatHandle, StatKind};
    use crate::value::ValueMap;

    fn descriptor() -> Descriptor {
        Descriptor {
            module: "cpu".into(),
            class: "misc".into(),
            name: "sys".into(),
            instance: 0,
            kind: StatKind::Named,
            data_size: 0,
            handle: StatHandle::new(1, 0),
        }
    }

    #[test]
    fn test_serialize_error_record() {
        let record = Record::new(&descriptor(), Payload::Error("I/O error".into()));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "class": "misc",
                "module": "cpu",
                "name": "sys",
                "instance": 0,
                "error": "I/O error",
            })
        );
    }

    #[test]
    fn test_serialize_data_record() {
        let data: ValueMap = [("a", Value::I32(5))].into_iter().collect();
        let record = Record::new(
            &descriptor(),
            Payload::Data {
                snaptime: 20,
                crtime: 10,
                data: Value::Map(data),
            },
        );
        let json = serde_json::to_string(&record).unwrap();

        assert_eq!(
            json,
            r#"{"class":"misc","module":"cpu","name":"sys","instance":0,"snaptime":20,"crtime":10,"data":{"a":5}}"#
        );
        assert_eq!(record.field("a"), Some(&Value::I32(5)));
        assert_eq!(record.error(), None);
        assert_eq!(record.ident(), "cpu:0:sys");
    }
}
