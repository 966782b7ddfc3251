//! GET /relations: the relation vocabulary with reciprocal suggestions

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, FullBody};
use crate::relations::labels::{Category, Gender, RELATIONS};
use crate::relations::reciprocal::{infer_reciprocal, suggestions, Reciprocal};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationEntry {
    name: &'static str,
    category: Category,
    gender: Gender,
    reciprocals: Vec<&'static str>,
    /// Inference when the editing person's gender is unknown
    default_reciprocal: Reciprocal,
}

pub fn handle_relations() -> Response<FullBody> {
    let entries: Vec<RelationEntry> = RELATIONS
        .iter()
        .map(|r| RelationEntry {
            name: r.name,
            category: r.category,
            gender: r.gender,
            reciprocals: suggestions(r.name),
            default_reciprocal: infer_reciprocal(r.name, Gender::Unknown),
        })
        .collect();
    json_response(StatusCode::OK, &entries)
}
