//! Relation vocabulary and classification
//!
//! A static table of the relation labels the directory understands. Each
//! label maps to a coarse family category, the gender it implies for the
//! person it describes, and its inverse. Lookups trim and ignore case; there
//! is no abbreviation or fuzzy matching.

use serde::Serialize;
use std::fmt;

/// Coarse family category of a relation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Parent,
    Child,
    Spouse,
    Sibling,
    /// Recognized or not, the label takes no part in family closure
    None,
}

impl Category {
    /// Category seen from the other end of the edge
    pub fn inverse(self) -> Self {
        match self {
            Category::Parent => Category::Child,
            Category::Child => Category::Parent,
            Category::Spouse => Category::Spouse,
            Category::Sibling => Category::Sibling,
            Category::None => Category::None,
        }
    }

    /// Gendered label for this category
    pub fn label_for(self, gender: Gender) -> Option<&'static str> {
        let (male, female, neutral) = match self {
            Category::Parent => ("Father", "Mother", "Parent"),
            Category::Child => ("Son", "Daughter", "Child"),
            Category::Spouse => ("Husband", "Wife", "Spouse"),
            Category::Sibling => ("Brother", "Sister", "Sibling"),
            Category::None => return None,
        };
        Some(match gender {
            Gender::Male => male,
            Gender::Female => female,
            Gender::Unknown => neutral,
        })
    }
}

/// Gender implied by a label, or resolved for a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    /// Parse a free-text gender value ("male", "F", ...)
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "male" | "m" | "man" => Gender::Male,
            "female" | "f" | "woman" => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Gender::Unknown
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Unknown => write!(f, "unknown"),
        }
    }
}

/// Inverse labels of a relation, picked by the gender of the other person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Inverse {
    pub male: &'static str,
    pub female: &'static str,
    /// Gender-neutral inverse, when the vocabulary has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neutral: Option<&'static str>,
}

/// One recognized relation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationLabel {
    pub name: &'static str,
    pub category: Category,
    /// Gender of the person the label describes
    pub gender: Gender,
    pub inverse: Inverse,
}

const fn label(
    name: &'static str,
    category: Category,
    gender: Gender,
    male: &'static str,
    female: &'static str,
    neutral: Option<&'static str>,
) -> RelationLabel {
    RelationLabel {
        name,
        category,
        gender,
        inverse: Inverse { male, female, neutral },
    }
}

use self::Category as C;
use self::Gender as G;

/// Every label the directory recognizes, in suggestion order
pub static RELATIONS: &[RelationLabel] = &[
    label("Father", C::Parent, G::Male, "Son", "Daughter", Some("Child")),
    label("Mother", C::Parent, G::Female, "Son", "Daughter", Some("Child")),
    label("Parent", C::Parent, G::Unknown, "Son", "Daughter", Some("Child")),
    label("Son", C::Child, G::Male, "Father", "Mother", Some("Parent")),
    label("Daughter", C::Child, G::Female, "Father", "Mother", Some("Parent")),
    label("Child", C::Child, G::Unknown, "Father", "Mother", Some("Parent")),
    label("Husband", C::Spouse, G::Male, "Husband", "Wife", Some("Spouse")),
    label("Wife", C::Spouse, G::Female, "Husband", "Wife", Some("Spouse")),
    label("Spouse", C::Spouse, G::Unknown, "Husband", "Wife", Some("Spouse")),
    label("Brother", C::Sibling, G::Male, "Brother", "Sister", Some("Sibling")),
    label("Sister", C::Sibling, G::Female, "Brother", "Sister", Some("Sibling")),
    label("Sibling", C::Sibling, G::Unknown, "Brother", "Sister", Some("Sibling")),
    label("Grandfather", C::None, G::Male, "Grandson", "Granddaughter", Some("Grandchild")),
    label("Grandmother", C::None, G::Female, "Grandson", "Granddaughter", Some("Grandchild")),
    label("Grandparent", C::None, G::Unknown, "Grandson", "Granddaughter", Some("Grandchild")),
    label("Grandson", C::None, G::Male, "Grandfather", "Grandmother", Some("Grandparent")),
    label("Granddaughter", C::None, G::Female, "Grandfather", "Grandmother", Some("Grandparent")),
    label("Grandchild", C::None, G::Unknown, "Grandfather", "Grandmother", Some("Grandparent")),
    label("Uncle", C::None, G::Male, "Nephew", "Niece", None),
    label("Aunt", C::None, G::Female, "Nephew", "Niece", None),
    label("Nephew", C::None, G::Male, "Uncle", "Aunt", None),
    label("Niece", C::None, G::Female, "Uncle", "Aunt", None),
    label("Cousin", C::None, G::Unknown, "Cousin", "Cousin", Some("Cousin")),
    label("Father-in-law", C::None, G::Male, "Son-in-law", "Daughter-in-law", None),
    label("Mother-in-law", C::None, G::Female, "Son-in-law", "Daughter-in-law", None),
    label("Son-in-law", C::None, G::Male, "Father-in-law", "Mother-in-law", None),
    label("Daughter-in-law", C::None, G::Female, "Father-in-law", "Mother-in-law", None),
    label("Brother-in-law", C::None, G::Male, "Brother-in-law", "Sister-in-law", None),
    label("Sister-in-law", C::None, G::Female, "Brother-in-law", "Sister-in-law", None),
    label("Stepfather", C::None, G::Male, "Stepson", "Stepdaughter", None),
    label("Stepmother", C::None, G::Female, "Stepson", "Stepdaughter", None),
    label("Stepson", C::None, G::Male, "Stepfather", "Stepmother", None),
    label("Stepdaughter", C::None, G::Female, "Stepfather", "Stepmother", None),
    label("Godfather", C::None, G::Male, "Godson", "Goddaughter", None),
    label("Godmother", C::None, G::Female, "Godson", "Goddaughter", None),
    label("Godson", C::None, G::Male, "Godfather", "Godmother", None),
    label("Goddaughter", C::None, G::Female, "Godfather", "Godmother", None),
    label("Guardian", C::None, G::Unknown, "Ward", "Ward", Some("Ward")),
    label("Ward", C::None, G::Unknown, "Guardian", "Guardian", Some("Guardian")),
    label("Friend", C::None, G::Unknown, "Friend", "Friend", Some("Friend")),
    label("Colleague", C::None, G::Unknown, "Colleague", "Colleague", Some("Colleague")),
    label("Neighbour", C::None, G::Unknown, "Neighbour", "Neighbour", Some("Neighbour")),
];

/// Trim and lowercase a label for comparison
pub fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Find the vocabulary entry for a label
pub fn lookup(label: &str) -> Option<&'static RelationLabel> {
    let wanted = normalize(label);
    if wanted.is_empty() {
        return None;
    }
    RELATIONS.iter().find(|r| r.name.to_lowercase() == wanted)
}

/// Whether the label is in the vocabulary
pub fn is_recognized(label: &str) -> bool {
    lookup(label).is_some()
}

/// Classify a label into (category, gender of the described person).
///
/// Unrecognized labels classify as `(Category::None, Gender::Unknown)`.
pub fn classify(label: &str) -> (Category, Gender) {
    match lookup(label) {
        Some(r) => (r.category, r.gender),
        None => (Category::None, Gender::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_ignores_case_and_whitespace() {
        for raw in ["father", " Father ", "FATHER", "\tfAtHeR\n"] {
            assert_eq!(classify(raw), (Category::Parent, Gender::Male), "{raw:?}");
        }
        assert_eq!(classify("daughter"), (Category::Child, Gender::Female));
        assert_eq!(classify("Spouse"), (Category::Spouse, Gender::Unknown));
        assert_eq!(classify("sister "), (Category::Sibling, Gender::Female));
    }

    #[test]
    fn test_unrecognized_labels() {
        assert_eq!(classify("Dad"), (Category::None, Gender::Unknown));
        assert_eq!(classify(""), (Category::None, Gender::Unknown));
        assert!(!is_recognized("Fath"));
        assert!(is_recognized("Aunt"));
        assert_eq!(classify("Aunt"), (Category::None, Gender::Female));
    }

    #[test]
    fn test_every_inverse_is_recognized() {
        for r in RELATIONS {
            assert!(is_recognized(r.inverse.male), "{}", r.inverse.male);
            assert!(is_recognized(r.inverse.female), "{}", r.inverse.female);
            if let Some(neutral) = r.inverse.neutral {
                assert!(is_recognized(neutral), "{neutral}");
            }
        }
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::Sibling.label_for(Gender::Female), Some("Sister"));
        assert_eq!(Category::Parent.label_for(Gender::Unknown), Some("Parent"));
        assert_eq!(Category::Child.inverse(), Category::Parent);
        assert_eq!(Category::None.label_for(Gender::Male), None);
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse(" Female"), Gender::Female);
        assert_eq!(Gender::parse("M"), Gender::Male);
        assert_eq!(Gender::parse("other"), Gender::Unknown);
    }
}
