//! Module/class/name/instance predicate over statistic descriptors.

use std::fmt;

use serde_json::{Map, Value as JsonValue};

use crate::error::KstatError;
use crate::source::Descriptor;

const FIELDS: [&str; 4] = ["module", "class", "name", "instance"];

/// Immutable filter; `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    module: Option<String>,
    class: Option<String>,
    name: Option<String>,
    instance: Option<i32>,
    /// Set when a combination constrained one field to two different values.
    disjoint: bool,
}

impl Filter {
    /// A filter that matches every statistic.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn instance(mut self, instance: i32) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Builds a filter from loosely typed call arguments.
    ///
    /// Accepts no argument or exactly one object with any of the keys
    /// `module`, `class`, `name` (strings) and `instance` (integer).
    pub fn from_args(args: &[JsonValue]) -> Result<Self, KstatError> {
        match args {
            [] => Ok(Self::any()),
            [arg] => match arg {
                JsonValue::Object(map) => Self::from_object(map),
                _ => Err(KstatError::NotAnObject),
            },
            _ => Err(KstatError::SpuriousArgument("positional".to_string())),
        }
    }

    fn from_object(map: &Map<String, JsonValue>) -> Result<Self, KstatError> {
        if let Some(key) = map.keys().find(|k| !FIELDS.contains(&k.as_str())) {
            return Err(KstatError::SpuriousArgument(key.clone()));
        }

        Ok(Self {
            module: string_field(map, "module")?,
            class: string_field(map, "class")?,
            name: string_field(map, "name")?,
            instance: instance_field(map)?,
            disjoint: false,
        })
    }

    pub fn module_filter(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn class_filter(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn name_filter(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn instance_filter(&self) -> Option<i32> {
        self.instance
    }

    /// True when no field is constrained.
    pub fn is_any(&self) -> bool {
        !self.disjoint
            && self.module.is_none()
            && self.class.is_none()
            && self.name.is_none()
            && self.instance.is_none()
    }

    /// True iff every constrained field equals the descriptor's field.
    pub fn matches(&self, desc: &Descriptor) -> bool {
        !self.disjoint
            && field_matches(&self.module, &desc.module)
            && field_matches(&self.class, &desc.class)
            && field_matches(&self.name, &desc.name)
            && self.instance.is_none_or(|i| i == desc.instance)
    }

    /// Field-wise conjunction of two filters.
    ///
    /// Where both constrain the same field with different values the result
    /// matches nothing.
    pub fn combined(&self, other: &Filter) -> Filter {
        let mut disjoint = self.disjoint || other.disjoint;
        let module = merge(&self.module, &other.module, &mut disjoint);
        let class = merge(&self.class, &other.class, &mut disjoint);
        let name = merge(&self.name, &other.name, &mut disjoint);
        let instance = merge(&self.instance, &other.instance, &mut disjoint);

        Filter {
            module,
            class,
            name,
            instance,
            disjoint,
        }
    }
}

fn merge<T: Clone + PartialEq>(a: &Option<T>, b: &Option<T>, disjoint: &mut bool) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if x != y {
                *disjoint = true;
            }
            Some(x.clone())
        }
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (None, None) => None,
    }
}

fn field_matches(want: &Option<String>, have: &str) -> bool {
    want.as_deref().is_none_or(|w| w == have)
}

fn string_field(
    map: &Map<String, JsonValue>,
    key: &'static str,
) -> Result<Option<String>, KstatError> {
    match map.get(key) {
        None => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(KstatError::InvalidFilterField(key)),
    }
}

fn instance_field(map: &Map<String, JsonValue>) -> Result<Option<i32>, KstatError> {
    let Some(value) = map.get("instance") else {
        return Ok(None);
    };
    let invalid = || KstatError::InvalidFilterField("instance");

    let JsonValue::Number(n) = value else {
        return Err(invalid());
    };
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map(Some).map_err(|_| invalid());
    }
    // Integral floats such as 1.0 are accepted.
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX) => {
            Ok(Some(f as i32))
        }
        _ => Err(invalid()),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disjoint {
            return f.write_str("(nothing)");
        }
        let instance = self
            .instance
            .map(|i| i.to_string())
            .unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{}:{}:{}",
            self.module.as_deref().unwrap_or("*"),
            instance,
            self.name.as_deref().unwrap_or("*"),
        )?;
        if let Some(class) = &self.class {
            write!(f, " (class {})", class)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{StatHandle, StatKind};
    use serde_json::json;

    fn desc(module: &str, class: &str, name: &str, instance: i32) -> Descriptor {
        Descriptor {
            module: module.into(),
            class: class.into(),
            name: name.into(),
            instance,
            kind: StatKind::Named,
            data_size: 0,
            handle: StatHandle::new(0, 0),
        }
    }

    fn sample_descriptors() -> Vec<Descriptor> {
        vec![
            desc("cpu", "misc", "sys", 0),
            desc("cpu", "misc", "sys", 1),
            desc("cpu", "misc", "vm", 0),
            desc("unix", "misc", "system_misc", 0),
            desc("tcp", "mib2", "tcp", 0),
            desc("Cpu", "misc", "sys", 0),
        ]
    }

    #[test]
    fn test_any_matches_everything() {
        let filter = Filter::any();
        assert!(filter.is_any());
        assert!(sample_descriptors().iter().all(|d| filter.matches(d)));
    }

    #[test]
    fn test_matches_is_exact_and_case_sensitive() {
        let filter = Filter::any().module("cpu");
        let matched: Vec<_> = sample_descriptors()
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        assert_eq!(matched.len(), 3);
        assert!(matched.iter().all(|d| d.module == "cpu"));

        assert!(!Filter::any().name("sy").matches(&desc("cpu", "misc", "sys", 0)));
        assert!(Filter::any().instance(1).matches(&desc("cpu", "misc", "sys", 1)));
        assert!(!Filter::any().instance(1).matches(&desc("cpu", "misc", "sys", 0)));
        assert!(!Filter::any().class("MISC").matches(&desc("cpu", "misc", "sys", 0)));
    }

    #[test]
    fn test_combined_is_conjunction() {
        let filters = [
            Filter::any(),
            Filter::any().module("cpu"),
            Filter::any().instance(0),
            Filter::any().module("cpu").name("vm"),
            Filter::any().class("mib2"),
            Filter::any().module("unix").instance(1),
        ];

        for f1 in &filters {
            for f2 in &filters {
                for d in &sample_descriptors() {
                    assert_eq!(
                        f1.combined(f2).matches(d),
                        f1.matches(d) && f2.matches(d),
                        "{} / {} / {:?}",
                        f1,
                        f2,
                        d
                    );
                }
            }
        }
    }

    #[test]
    fn test_combined_conflicting_fields_match_nothing() {
        let f1 = Filter::any().module("cpu");
        let f2 = Filter::any().module("unix");
        let both = f1.combined(&f2);
        assert!(!both.is_any());
        assert!(sample_descriptors().iter().all(|d| !both.matches(d)));
        assert_eq!(both.to_string(), "(nothing)");

        // Stays empty when combined further.
        assert!(sample_descriptors().iter().all(|d| !both.combined(&Filter::any()).matches(d)));
    }

    #[test]
    fn test_combined_merges_fields() {
        let f = Filter::any()
            .module("cpu")
            .combined(&Filter::any().instance(0).module("cpu"));
        assert_eq!(f, Filter::any().module("cpu").instance(0));
        assert_eq!(Filter::any().combined(&Filter::any()), Filter::any());
    }

    #[test]
    fn test_from_args_valid() {
        assert_eq!(Filter::from_args(&[]).unwrap(), Filter::any());
        assert_eq!(Filter::from_args(&[json!({})]).unwrap(), Filter::any());

        let filter = Filter::from_args(&[json!({
            "module": "cpu",
            "class": "misc",
            "name": "sys",
            "instance": 3,
        })])
        .unwrap();
        assert_eq!(
            filter,
            Filter::any().module("cpu").class("misc").name("sys").instance(3)
        );

        let filter = Filter::from_args(&[json!({ "instance": 2.0 })]).unwrap();
        assert_eq!(filter.instance_filter(), Some(2));
    }

    #[test]
    fn test_from_args_rejects_bad_specifiers() {
        let cases = [
            (vec![JsonValue::Null], "expected object"),
            (vec![json!("fooey")], "expected object"),
            (vec![json!({ "class": 1234 })], "class"),
            (vec![json!({ "module": -1 })], "module"),
            (vec![json!({ "name": false })], "name"),
            (vec![json!({ "instance": "doogle" })], "instance"),
            (vec![json!({ "instance": 1.5 })], "instance"),
            (vec![json!({ "instance": 1u64 << 40 })], "instance"),
            (vec![json!({ "class": "foo" }), json!(123)], "positional"),
            (vec![json!({ "zone": "global" })], "zone"),
        ];

        for (args, needle) in cases {
            let err = Filter::from_args(&args).unwrap_err();
            assert!(err.is_invalid_specifier(), "{:?}", args);
            let msg = err.to_string();
            assert!(msg.starts_with("illegal kstat specifier"), "{}", msg);
            assert!(msg.contains(needle), "{} does not mention {}", msg, needle);
        }
    }

    #[test]
    fn test_from_args_error_variants() {
        assert!(matches!(
            Filter::from_args(&[json!({ "instance": "x" })]),
            Err(KstatError::InvalidFilterField("instance"))
        ));
        assert!(matches!(
            Filter::from_args(&[json!({}), json!({})]),
            Err(KstatError::SpuriousArgument(_))
        ));
        assert!(matches!(
            Filter::from_args(&[json!([1, 2])]),
            Err(KstatError::NotAnObject)
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Filter::any().to_string(), "*:*:*");
        assert_eq!(
            Filter::any().module("cpu").instance(0).class("misc").to_string(),
            "cpu:0:* (class misc)"
        );
    }
}
