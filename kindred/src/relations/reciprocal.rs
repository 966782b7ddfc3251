//! Reciprocal inference and edge validation

use serde::Serialize;

use super::labels::{self, Gender};
use crate::people::person::{PersonRecord, RelationshipEdge};
use crate::types::{EdgeFieldErrors, FieldErrors};

pub const MSG_CHOOSE_PERSON: &str = "Please choose a person.";
pub const MSG_SELECT_RELATION: &str = "Please select a relation from the list.";
pub const MSG_SPECIFY_RECIPROCAL: &str = "Please specify my relation to them.";

/// Outcome of inferring "my relation to them" from "their relation to me"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "labels", rename_all = "lowercase")]
pub enum Reciprocal {
    /// The inverse is determined
    Auto(&'static str),
    /// Recognized, but the user has to pick one of these
    Manual(Vec<&'static str>),
    Unrecognized,
}

impl Reciprocal {
    pub fn auto(&self) -> Option<&'static str> {
        match self {
            Reciprocal::Auto(label) => Some(label),
            _ => None,
        }
    }
}

/// Infer my relation to them, given their relation to me and my gender
pub fn infer_reciprocal(their_relation: &str, my_gender: Gender) -> Reciprocal {
    let Some(entry) = labels::lookup(their_relation) else {
        return Reciprocal::Unrecognized;
    };
    let inv = entry.inverse;
    match my_gender {
        Gender::Male => Reciprocal::Auto(inv.male),
        Gender::Female => Reciprocal::Auto(inv.female),
        Gender::Unknown => match inv.neutral {
            Some(neutral) => Reciprocal::Auto(neutral),
            None if inv.male == inv.female => Reciprocal::Auto(inv.male),
            None => Reciprocal::Manual(vec![inv.male, inv.female]),
        },
    }
}

/// Every inverse form offered for a label
pub fn suggestions(their_relation: &str) -> Vec<&'static str> {
    let Some(entry) = labels::lookup(their_relation) else {
        return Vec::new();
    };
    let inv = entry.inverse;
    let mut out = vec![inv.male];
    if inv.female != inv.male {
        out.push(inv.female);
    }
    if let Some(neutral) = inv.neutral {
        if !out.contains(&neutral) {
            out.push(neutral);
        }
    }
    out
}

/// Field errors for a single edge
pub fn validate_edge(edge: &RelationshipEdge, my_gender: Gender) -> EdgeFieldErrors {
    let mut errors = EdgeFieldErrors::default();
    if edge.value.trim().is_empty() && edge.person_id.is_none() {
        errors.person = Some(MSG_CHOOSE_PERSON.to_string());
    }
    let inferred = infer_reciprocal(&edge.value2, my_gender);
    if inferred == Reciprocal::Unrecognized {
        errors.relation_type = Some(MSG_SELECT_RELATION.to_string());
    }
    if edge.value3.trim().is_empty() && matches!(inferred, Reciprocal::Manual(_)) {
        errors.reciprocal = Some(MSG_SPECIFY_RECIPROCAL.to_string());
    }
    errors
}

/// Validate every relationship attribute of a record
pub fn validate_record(record: &PersonRecord, my_gender: Gender) -> FieldErrors {
    let mut errors = FieldErrors::default();
    for (key, edge) in record.relationships() {
        errors.insert(key.clone(), validate_edge(edge, my_gender));
    }
    errors
}

/// Fill empty reciprocal labels that can be inferred. Returns how many were filled.
pub fn fill_reciprocals(record: &mut PersonRecord, my_gender: Gender) -> usize {
    let keys: Vec<String> = record
        .relationships()
        .filter(|(_, e)| e.value3.trim().is_empty())
        .map(|(k, _)| k.clone())
        .collect();

    let mut filled = 0;
    for key in keys {
        if let Some(edge) = record.edge_mut(&key) {
            if let Some(label) = infer_reciprocal(&edge.value2, my_gender).auto() {
                edge.value3 = label.to_string();
                filled += 1;
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_by_gender() {
        assert_eq!(infer_reciprocal("Father", Gender::Male), Reciprocal::Auto("Son"));
        assert_eq!(infer_reciprocal(" father", Gender::Female), Reciprocal::Auto("Daughter"));
        assert_eq!(infer_reciprocal("FATHER", Gender::Unknown), Reciprocal::Auto("Child"));
        assert_eq!(infer_reciprocal("Wife", Gender::Male), Reciprocal::Auto("Husband"));
    }

    #[test]
    fn test_infer_manual_without_neutral_form() {
        assert_eq!(
            infer_reciprocal("Uncle", Gender::Unknown),
            Reciprocal::Manual(vec!["Nephew", "Niece"])
        );
        assert_eq!(infer_reciprocal("Uncle", Gender::Female), Reciprocal::Auto("Niece"));
    }

    #[test]
    fn test_infer_unrecognized() {
        assert_eq!(infer_reciprocal("Dad", Gender::Male), Reciprocal::Unrecognized);
        assert!(suggestions("Dad").is_empty());
        assert_eq!(suggestions("Cousin"), vec!["Cousin"]);
        assert_eq!(suggestions("Mother"), vec!["Son", "Daughter", "Child"]);
    }

    #[test]
    fn test_validate_record() {
        let record = PersonRecord::from_json(json!({
            "Name": "A",
            "ok": { "value": "B", "value2": "Father", "value3": "" },
            "bad": { "value": "", "value2": "Dad", "value3": "" },
            "manual": { "value": "C", "value2": "Aunt", "value3": "" }
        }))
        .unwrap();
        let errors = validate_record(&record, Gender::Unknown);
        assert_eq!(errors.len(), 2);

        let bad = errors.get("bad").unwrap();
        assert_eq!(bad.person.as_deref(), Some(MSG_CHOOSE_PERSON));
        assert_eq!(bad.relation_type.as_deref(), Some(MSG_SELECT_RELATION));
        assert_eq!(bad.reciprocal, None);

        let manual = errors.get("manual").unwrap();
        assert_eq!(manual.reciprocal.as_deref(), Some(MSG_SPECIFY_RECIPROCAL));
    }

    #[test]
    fn test_fill_reciprocals() {
        let mut record = PersonRecord::from_json(json!({
            "a": { "value": "B", "value2": "Mother", "value3": "" },
            "b": { "value": "C", "value2": "Aunt", "value3": "" },
            "c": { "value": "D", "value2": "Brother", "value3": "Sister" }
        }))
        .unwrap();
        assert_eq!(fill_reciprocals(&mut record, Gender::Male), 2);
        assert_eq!(record.edge_mut("a").unwrap().value3, "Son");
        assert_eq!(record.edge_mut("b").unwrap().value3, "Nephew");
        assert_eq!(record.edge_mut("c").unwrap().value3, "Sister");
    }
}
