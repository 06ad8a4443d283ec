//! The structured invoice record produced by one extraction.
//!
//! The backend is asked for a flat JSON object with a fixed set of keys.
//! Values are deliberately kept as [`serde_json::Value`] rather than typed
//! fields: models return amounts sometimes as strings (`"1 210,00"`),
//! sometimes as numbers (`1210.0`), and the record's job is to carry what
//! was extracted, not to reinterpret it. Key *presence* is validated
//! strictly; value *shape* is not.
//!
//! Serialisation always emits the twelve keys in one canonical order, so
//! re-running the pipeline on the same input produces byte-identical JSON.
//! Keys the backend invented beyond the schema are dropped on output.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The eleven keys the extraction backend must return.
///
/// Order here is the canonical output order.
pub const EXTRACTED_FIELDS: [&str; 11] = [
    "supplier_name",
    "vat_number",
    "invoice_number",
    "date_of_sale",
    "due_date",
    "duzp",
    "amount_without_VAT_21",
    "VAT_21",
    "amount_without_VAT_12",
    "VAT_12",
    "total_amount_with_VAT",
];

/// The twelfth key, set by the orchestrator after the VAT registry check.
///
/// The parser tolerates its absence in backend output — models frequently
/// omit it since the prompt tells them it will be filled in later.
pub const RELIABILITY_FIELD: &str = "reliable_VAT_payer";

/// One extracted invoice, keyed by the twelve schema fields.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    fields: Map<String, Value>,
}

impl InvoiceRecord {
    /// Build a record from a parsed backend response.
    ///
    /// Validates that the response is a JSON object containing every key in
    /// [`EXTRACTED_FIELDS`]. [`RELIABILITY_FIELD`] may be absent.
    ///
    /// # Errors
    /// Returns a human-readable description of the first violation; the
    /// caller wraps it into a `MalformedResponse` together with the raw text.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                ))
            }
        };

        for field in EXTRACTED_FIELDS {
            if !fields.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }

        Ok(Self { fields })
    }

    /// Value of one of the twelve schema fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The extracted VAT number, if present and non-empty.
    ///
    /// Returns `None` for a missing key, a non-string value, or a string
    /// that is empty after trimming — all of which mean "no VAT number
    /// found" for verification purposes.
    pub fn vat_number(&self) -> Option<&str> {
        match self.fields.get("vat_number") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Set the reliability field. Called exactly once per record, by the
    /// orchestrator, after the registry check.
    pub fn set_reliability(&mut self, value: Value) {
        self.fields.insert(RELIABILITY_FIELD.to_string(), value);
    }

    /// Current reliability value, if set.
    pub fn reliability(&self) -> Option<&Value> {
        self.fields.get(RELIABILITY_FIELD)
    }

    /// Pretty-printed JSON with the canonical key order, a trailing
    /// newline, and non-ASCII characters preserved unescaped.
    pub fn to_pretty_json(&self) -> String {
        // serde_json never escapes non-ASCII and our Serialize impl fixes
        // the key order, so this is deterministic byte-for-byte.
        let mut out = serde_json::to_string_pretty(self)
            .expect("InvoiceRecord serialisation is infallible");
        out.push('\n');
        out
    }
}

impl Serialize for InvoiceRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(EXTRACTED_FIELDS.len() + 1))?;
        for field in EXTRACTED_FIELDS {
            map.serialize_entry(field, self.fields.get(field).unwrap_or(&Value::Null))?;
        }
        let unset = Value::String(String::new());
        map.serialize_entry(
            RELIABILITY_FIELD,
            self.fields.get(RELIABILITY_FIELD).unwrap_or(&unset),
        )?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for InvoiceRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        InvoiceRecord::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_value() -> Value {
        json!({
            "supplier_name": "Žlutý kůň s.r.o.",
            "vat_number": "CZ12345678",
            "invoice_number": "20240042",
            "date_of_sale": "05.03.2024",
            "due_date": "19.03.2024",
            "duzp": "05.03.2024",
            "amount_without_VAT_21": "1000",
            "VAT_21": "210",
            "amount_without_VAT_12": 0,
            "VAT_12": 0,
            "total_amount_with_VAT": "1210",
        })
    }

    #[test]
    fn accepts_complete_object_without_reliability() {
        let record = InvoiceRecord::from_value(complete_value()).expect("valid record");
        assert_eq!(record.vat_number(), Some("CZ12345678"));
        assert!(record.reliability().is_none());
    }

    #[test]
    fn rejects_missing_field() {
        let mut value = complete_value();
        value.as_object_mut().unwrap().remove("duzp");
        let err = InvoiceRecord::from_value(value).unwrap_err();
        assert!(err.contains("duzp"), "got: {err}");
    }

    #[test]
    fn rejects_non_object() {
        let err = InvoiceRecord::from_value(json!(["not", "a", "map"])).unwrap_err();
        assert!(err.contains("array"), "got: {err}");
    }

    #[test]
    fn output_has_exactly_twelve_keys_in_canonical_order() {
        let mut record = InvoiceRecord::from_value(complete_value()).unwrap();
        record.set_reliability(json!(true));

        let json = record.to_pretty_json();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 12);

        // Order must be asserted on the serialized text itself.
        let mut expected: Vec<&str> = EXTRACTED_FIELDS.to_vec();
        expected.push(RELIABILITY_FIELD);
        let mut last = 0;
        for field in expected {
            let needle = format!("\"{field}\"");
            let pos = json.find(&needle).unwrap_or_else(|| panic!("missing {needle}"));
            assert!(pos > last, "'{field}' out of canonical order");
            last = pos;
        }
    }

    #[test]
    fn extra_backend_keys_are_dropped_on_output() {
        let mut value = complete_value();
        value
            .as_object_mut()
            .unwrap()
            .insert("confidence".into(), json!(0.97));
        let record = InvoiceRecord::from_value(value).unwrap();

        let out: Value = serde_json::from_str(&record.to_pretty_json()).unwrap();
        assert!(out.get("confidence").is_none());
        assert_eq!(out.as_object().unwrap().len(), 12);
    }

    #[test]
    fn empty_vat_number_counts_as_absent() {
        let mut value = complete_value();
        value
            .as_object_mut()
            .unwrap()
            .insert("vat_number".into(), json!("  "));
        let record = InvoiceRecord::from_value(value).unwrap();
        assert_eq!(record.vat_number(), None);
    }

    #[test]
    fn serialisation_is_idempotent() {
        let mut record = InvoiceRecord::from_value(complete_value()).unwrap();
        record.set_reliability(json!("Unable to verify"));
        assert_eq!(record.to_pretty_json(), record.to_pretty_json());
    }

    #[test]
    fn non_ascii_preserved_unescaped() {
        let record = InvoiceRecord::from_value(complete_value()).unwrap();
        let json = record.to_pretty_json();
        assert!(json.contains("Žlutý kůň"), "got: {json}");
        assert!(!json.contains("\\u"), "non-ASCII must not be escaped");
    }

    #[test]
    fn round_trips_through_deserialize() {
        let mut record = InvoiceRecord::from_value(complete_value()).unwrap();
        record.set_reliability(json!(false));
        let json = record.to_pretty_json();
        let back: InvoiceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
