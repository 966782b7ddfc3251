//! Relationship vocabulary, reciprocal inference and propagation

pub mod gender;
pub mod labels;
pub mod propagate;
pub mod reciprocal;

pub use gender::{resolve_all, resolve_gender};
pub use labels::{classify, Category, Gender, RelationLabel, RELATIONS};
pub use propagate::{
    plan_detach, plan_propagation, PersonUpdate, PropagationInput, PropagationPlan, SkipReason,
    SkippedEdge,
};
pub use reciprocal::{fill_reciprocals, infer_reciprocal, validate_record, Reciprocal};
