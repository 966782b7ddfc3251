//! Gender resolution for people in the directory

use std::collections::HashMap;

use super::labels::{self, Gender};
use crate::people::person::{Person, PersonId};

/// Folds gender evidence; contradicting evidence resolves to unknown
#[derive(Debug, Default, Clone, Copy)]
struct Evidence {
    male: bool,
    female: bool,
}

impl Evidence {
    fn add(&mut self, gender: Gender) {
        match gender {
            Gender::Male => self.male = true,
            Gender::Female => self.female = true,
            Gender::Unknown => {}
        }
    }

    fn resolve(self) -> Gender {
        match (self.male, self.female) {
            (true, false) => Gender::Male,
            (false, true) => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    fn is_empty(self) -> bool {
        !self.male && !self.female
    }
}

/// Resolve one person's gender.
///
/// Sources, first conclusive one wins: the explicit `Gender` attribute, the
/// labels the person uses for themselves on their own edges (`value3`), and
/// the labels other people use for them (`value2`).
pub fn resolve_gender(person: &Person, people: &[Person]) -> Gender {
    let declared = person.record.declared_gender();
    if declared.is_known() {
        return declared;
    }

    let mut own = Evidence::default();
    for (_, edge) in person.record.relationships() {
        own.add(labels::classify(&edge.value3).1);
    }
    if !own.is_empty() {
        return own.resolve();
    }

    let mut others = Evidence::default();
    for other in people.iter().filter(|p| p.id != person.id) {
        for (_, edge) in other.record.relationships() {
            if edge.points_to(&person.id, person.name()) {
                others.add(labels::classify(&edge.value2).1);
            }
        }
    }
    others.resolve()
}

/// Resolve every person's gender at once
pub fn resolve_all(people: &[Person]) -> HashMap<PersonId, Gender> {
    people
        .iter()
        .map(|p| (p.id.clone(), resolve_gender(p, people)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::person::PersonRecord;
    use serde_json::json;

    fn person(id: &str, body: serde_json::Value) -> Person {
        Person::new(id, PersonRecord::from_json(body).unwrap())
    }

    #[test]
    fn test_declared_gender_wins() {
        let p = person("a", json!({
            "Name": "A",
            "Gender": "male",
            "r": { "value": "B", "value2": "Mother", "value3": "Daughter" }
        }));
        assert_eq!(resolve_gender(&p, &[]), Gender::Male);
    }

    #[test]
    fn test_own_reciprocal_labels() {
        let p = person("a", json!({
            "Name": "A",
            "r": { "value": "B", "value2": "Mother", "value3": "Daughter" }
        }));
        assert_eq!(resolve_gender(&p, &[]), Gender::Female);
    }

    #[test]
    fn test_labels_used_by_others() {
        let c = person("c", json!({ "Name": "C" }));
        let s = person("s", json!({
            "Name": "S",
            "r": { "value": "C", "value2": "Daughter", "value3": "Mother", "personId": "c" }
        }));
        let people = vec![c.clone(), s];
        assert_eq!(resolve_gender(&c, &people), Gender::Female);
    }

    #[test]
    fn test_conflicting_evidence_is_unknown() {
        let p = person("a", json!({
            "Name": "A",
            "r1": { "value": "B", "value2": "Father", "value3": "Son" },
            "r2": { "value": "C", "value2": "Father", "value3": "Daughter" }
        }));
        assert_eq!(resolve_gender(&p, &[]), Gender::Unknown);
    }

    #[test]
    fn test_neutral_labels_are_not_evidence() {
        let p = person("a", json!({
            "Name": "A",
            "r": { "value": "S", "value2": "Spouse", "value3": "Spouse" }
        }));
        assert_eq!(resolve_gender(&p, &[]), Gender::Unknown);
    }
}
