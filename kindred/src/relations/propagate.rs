//! Reciprocal relationship propagation
//!
//! Given the edited subject, the subject's previously stored record and the
//! full set of people, [`plan_propagation`] computes the consolidated patches
//! that keep reciprocal and derived family edges consistent. Planning is pure:
//! nothing is written here, and every affected person ends up with at most one
//! [`PersonUpdate`] carrying their rebuilt attribute set.
//!
//! Family closure only looks one hop past the edges the subject states.
//! Grandparent, cousin and in-law links are never derived.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

use super::gender;
use super::labels::{self, Category, Gender};
use super::reciprocal::infer_reciprocal;
use crate::people::person::{
    names_match, Attribute, Person, PersonId, PersonPatch, PersonRecord, RelationshipEdge,
};

/// Everything the planner needs; no ambient state is consulted
#[derive(Debug, Clone, Copy)]
pub struct PropagationInput<'a> {
    /// Subject as just written
    pub subject: &'a Person,
    /// Subject record as stored before the edit (empty for a new person)
    pub prior: &'a PersonRecord,
    /// Every known person; a stale copy of the subject is replaced by `subject`
    pub people: &'a [Person],
    /// Timestamp used for new edge keys
    pub stamp: i64,
}

/// One consolidated write for an affected person
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonUpdate {
    pub id: PersonId,
    pub name: String,
    #[serde(skip)]
    pub patch: PersonPatch,
    /// Record after the patch is applied
    #[serde(skip)]
    pub record: PersonRecord,
    pub edges_written: usize,
    pub edges_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No person matches the edge target
    Unresolved,
    /// Several people share the target name and the edge carries no id
    Ambiguous,
    /// The edge points at its own owner
    SelfReference,
    /// The reciprocal label could not be inferred
    NoReciprocal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEdge {
    pub owner: PersonId,
    pub key: String,
    pub target: String,
    pub reason: SkipReason,
}

/// Pending per-person patches, keyed by person id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropagationPlan {
    pub updates: Vec<PersonUpdate>,
    pub skipped: Vec<SkippedEdge>,
}

impl PropagationPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn update_for(&self, id: &str) -> Option<&PersonUpdate> {
        self.updates.iter().find(|u| u.id == id)
    }

    /// Apply the plan to an in-memory people set
    pub fn apply_to(&self, people: &mut [Person]) {
        for update in &self.updates {
            if let Some(person) = people.iter_mut().find(|p| p.id == update.id) {
                person.record = update.record.clone();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Stated by the user: labels replace whatever is there
    Overwrite,
    /// Inferred: insert when missing, otherwise only refine neutral labels
    Derived,
}

/// Compute the patches needed after `input.subject` changed
pub fn plan_propagation(input: PropagationInput<'_>) -> PropagationPlan {
    let mut ws = Workspace::new(&input);
    let subject_id = input.subject.id.clone();

    ws.detach_removed(&subject_id, input.prior);
    ws.write_reciprocals(&subject_id);
    ws.close_family(&subject_id);

    ws.finish()
}

/// Compute the patches that detach everyone from a deleted person.
///
/// Edges naming the deleted person without an id are only removed when no
/// remaining person shares that name.
pub fn plan_detach(deleted: &Person, people: &[Person]) -> PropagationPlan {
    let empty = PersonRecord::default();
    let mut ws = Workspace::new(&PropagationInput {
        subject: deleted,
        prior: &empty,
        people,
        stamp: 0,
    });

    let name_shared = people
        .iter()
        .any(|p| p.id != deleted.id && names_match(p.name(), deleted.name()));
    let owners: Vec<PersonId> = ws
        .working
        .keys()
        .filter(|id| **id != deleted.id)
        .cloned()
        .collect();
    for owner in owners {
        ws.remove_edges_to(&owner, &deleted.id, !name_shared);
    }

    ws.working.remove(&deleted.id);
    ws.finish()
}

/// Working copies of every person plus the bookkeeping of one pass
struct Workspace {
    before: BTreeMap<PersonId, Person>,
    working: BTreeMap<PersonId, Person>,
    genders: HashMap<PersonId, Gender>,
    subject: PersonId,
    /// Former name of the subject, for name-only back edges
    prior_name: Option<(PersonId, String)>,
    /// People the subject pointed at before the edit
    prior_targets: BTreeSet<PersonId>,
    /// People whose link with the subject was removed in this pass
    detached: BTreeSet<PersonId>,
    stamp: i64,
    next_index: usize,
    written: HashMap<PersonId, usize>,
    removed: HashMap<PersonId, usize>,
    skipped: Vec<SkippedEdge>,
}

impl Workspace {
    fn new(input: &PropagationInput<'_>) -> Self {
        let mut people: Vec<Person> = input
            .people
            .iter()
            .filter(|p| p.id != input.subject.id)
            .cloned()
            .collect();
        people.push(input.subject.clone());

        let genders = gender::resolve_all(&people);
        let working: BTreeMap<PersonId, Person> =
            people.into_iter().map(|p| (p.id.clone(), p)).collect();

        let prior_name = input
            .prior
            .name
            .as_ref()
            .filter(|old| !names_match(old, input.subject.name()))
            .map(|old| (input.subject.id.clone(), old.clone()));

        Self {
            before: working.clone(),
            working,
            genders,
            subject: input.subject.id.clone(),
            prior_name,
            prior_targets: BTreeSet::new(),
            detached: BTreeSet::new(),
            stamp: input.stamp,
            next_index: 0,
            written: HashMap::new(),
            removed: HashMap::new(),
            skipped: Vec::new(),
        }
    }

    fn gender_of(&self, id: &str) -> Gender {
        self.genders.get(id).copied().unwrap_or_default()
    }

    fn name_of(&self, id: &str) -> String {
        self.working
            .get(id)
            .map(|p| p.name().to_string())
            .unwrap_or_default()
    }

    /// Whether `edge` refers to person `id`, under current or former name
    fn edge_targets(&self, edge: &RelationshipEdge, id: &str) -> bool {
        if edge.points_to(id, &self.name_of(id)) {
            return true;
        }
        match (&self.prior_name, &edge.person_id) {
            (Some((pid, old)), None) if pid == id => names_match(&edge.value, old),
            _ => false,
        }
    }

    /// Resolve an edge target: by id first, then by a unique name match
    fn resolve(&self, edge: &RelationshipEdge) -> Result<PersonId, SkipReason> {
        if let Some(id) = &edge.person_id {
            return if self.working.contains_key(id) {
                Ok(id.clone())
            } else {
                Err(SkipReason::Unresolved)
            };
        }
        let mut matches = self
            .working
            .values()
            .filter(|p| names_match(&edge.value, p.name()));
        match (matches.next(), matches.next()) {
            (Some(p), None) => Ok(p.id.clone()),
            (Some(_), Some(_)) => Err(SkipReason::Ambiguous),
            (None, _) => Err(SkipReason::Unresolved),
        }
    }

    fn skip(&mut self, owner: &str, key: &str, edge: &RelationshipEdge, reason: SkipReason) {
        match reason {
            SkipReason::Ambiguous => warn!(
                owner = %owner, key = %key, target = %edge.value,
                "Relationship target name is ambiguous, skipping"
            ),
            _ => debug!(
                owner = %owner, key = %key, target = %edge.value, reason = ?reason,
                "Skipping relationship edge"
            ),
        }
        self.skipped.push(SkippedEdge {
            owner: owner.to_string(),
            key: key.to_string(),
            target: edge.value.clone(),
            reason,
        });
    }

    /// Resolved edges of a person: (attribute key, edge, target id)
    fn resolved_edges(&self, owner: &str) -> Vec<(String, RelationshipEdge, PersonId)> {
        let Some(person) = self.working.get(owner) else {
            return Vec::new();
        };
        person
            .record
            .relationships()
            .filter_map(|(k, e)| {
                self.resolve(e)
                    .ok()
                    .filter(|t| t != owner)
                    .map(|t| (k.clone(), e.clone(), t))
            })
            .collect()
    }

    /// Targets of `owner`'s edges whose `value2` falls in `category`
    fn related(&self, owner: &str, category: Category) -> BTreeSet<PersonId> {
        self.resolved_edges(owner)
            .into_iter()
            .filter(|(_, e, _)| labels::classify(&e.value2).0 == category)
            .map(|(_, _, t)| t)
            .collect()
    }

    /// Step 1: drop back edges for targets the subject no longer points at
    fn detach_removed(&mut self, subject_id: &str, prior: &PersonRecord) {
        let current: BTreeSet<PersonId> = self
            .resolved_edges(subject_id)
            .into_iter()
            .map(|(_, _, t)| t)
            .collect();

        let mut gone = BTreeSet::new();
        for (_, edge) in prior.relationships() {
            if let Ok(target) = self.resolve(edge) {
                if target == subject_id {
                    continue;
                }
                if !current.contains(&target) {
                    gone.insert(target.clone());
                }
                self.prior_targets.insert(target);
            }
        }

        for target in &gone {
            self.remove_edges_to(target, subject_id, true);
        }
        self.detached = gone;
    }

    /// Remove every edge on `owner` that points at `other`
    fn remove_edges_to(&mut self, owner: &str, other: &str, by_name: bool) {
        let keys: Vec<String> = match self.working.get(owner) {
            Some(p) => p
                .record
                .relationships()
                .filter(|(_, e)| match &e.person_id {
                    Some(pid) => pid == other,
                    None => by_name && self.edge_targets(e, other),
                })
                .map(|(k, _)| k.clone())
                .collect(),
            None => return,
        };
        if keys.is_empty() {
            return;
        }
        if let Some(p) = self.working.get_mut(owner) {
            for key in &keys {
                p.record.attributes.remove(key);
            }
        }
        *self.removed.entry(owner.to_string()).or_default() += keys.len();
    }

    /// Step 2: mirror every subject edge onto its target
    fn write_reciprocals(&mut self, subject_id: &str) {
        let subject_gender = self.gender_of(subject_id);
        let edges: Vec<(String, RelationshipEdge)> = match self.working.get(subject_id) {
            Some(p) => p
                .record
                .relationships()
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
            None => return,
        };

        for (key, edge) in edges {
            let target = match self.resolve(&edge) {
                Ok(t) if t == subject_id => {
                    self.skip(subject_id, &key, &edge, SkipReason::SelfReference);
                    continue;
                }
                Ok(t) => t,
                Err(reason) => {
                    self.skip(subject_id, &key, &edge, reason);
                    continue;
                }
            };

            let my_relation = if edge.value3.trim().is_empty() {
                match infer_reciprocal(&edge.value2, subject_gender).auto() {
                    Some(label) => label.to_string(),
                    None => {
                        self.skip(subject_id, &key, &edge, SkipReason::NoReciprocal);
                        continue;
                    }
                }
            } else {
                edge.value3.clone()
            };

            self.backfill_target(subject_id, &key, &target);
            self.upsert(&target, subject_id, &my_relation, &edge.value2, Mode::Overwrite);
        }
    }

    /// Record the resolved id on a subject edge that only had a name
    fn backfill_target(&mut self, owner: &str, key: &str, target: &str) {
        let name = self.name_of(target);
        if let Some(edge) = self.working.get_mut(owner).and_then(|p| p.record.edge_mut(key)) {
            if edge.person_id.is_none() {
                edge.person_id = Some(target.to_string());
                if edge.value.trim().is_empty() {
                    edge.value = name;
                }
            }
        }
    }

    /// Step 3: one-hop family closure around the subject
    fn close_family(&mut self, subject_id: &str) {
        let parents = self.related(subject_id, Category::Parent);
        let spouses = self.related(subject_id, Category::Spouse);
        let mut children = self.related(subject_id, Category::Child);
        let mut siblings = self.related(subject_id, Category::Sibling);

        // only a newly linked spouse brings their existing children along
        for spouse in spouses.iter().filter(|s| !self.prior_targets.contains(*s)) {
            children.extend(self.related(spouse, Category::Child));
        }
        for parent in &parents {
            siblings.extend(self.related(parent, Category::Child));
        }
        children.remove(subject_id);
        siblings.remove(subject_id);
        for spouse in &spouses {
            children.remove(spouse);
        }

        let kids: Vec<PersonId> = children.into_iter().collect();
        for (i, a) in kids.iter().enumerate() {
            for b in &kids[i + 1..] {
                self.link_siblings(a, b);
            }
        }
        for child in &kids {
            for spouse in &spouses {
                self.link_parent(spouse, child);
            }
            self.link_parent(subject_id, child);
        }

        if parents.is_empty() {
            return;
        }
        let mut group: Vec<PersonId> = siblings.into_iter().filter(|s| !parents.contains(s)).collect();
        for parent in &parents {
            self.link_parent(parent, subject_id);
            for sibling in &group {
                self.link_parent(parent, sibling);
            }
        }
        group.push(subject_id.to_string());
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                self.link_siblings(a, b);
            }
        }
    }

    fn link_parent(&mut self, parent: &str, child: &str) {
        if parent == child {
            return;
        }
        let as_parent = Category::Parent.label_for(self.gender_of(parent)).unwrap_or("Parent");
        let as_child = Category::Child.label_for(self.gender_of(child)).unwrap_or("Child");
        self.upsert(parent, child, as_child, as_parent, Mode::Derived);
        self.upsert(child, parent, as_parent, as_child, Mode::Derived);
    }

    fn link_siblings(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        let label_a = Category::Sibling.label_for(self.gender_of(a)).unwrap_or("Sibling");
        let label_b = Category::Sibling.label_for(self.gender_of(b)).unwrap_or("Sibling");
        self.upsert(a, b, label_b, label_a, Mode::Derived);
        self.upsert(b, a, label_a, label_b, Mode::Derived);
    }

    /// Whether `a` and `b` are the subject and someone it was just detached from
    fn severed(&self, a: &str, b: &str) -> bool {
        (a == self.subject && self.detached.contains(b))
            || (b == self.subject && self.detached.contains(a))
    }

    /// Insert or update the edge on `owner` that points at `other`.
    ///
    /// `their` is other's relation to owner, `mine` is owner's relation to other.
    fn upsert(&mut self, owner: &str, other: &str, their: &str, mine: &str, mode: Mode) {
        if owner == other {
            return;
        }
        if mode == Mode::Derived && self.severed(owner, other) {
            debug!(owner = %owner, other = %other, "Not re-deriving a link removed in this edit");
            return;
        }
        let other_name = self.name_of(other);
        let existing = self.working.get(owner).and_then(|p| {
            p.record
                .relationships()
                .find(|(_, e)| self.edge_targets(e, other))
                .map(|(k, _)| k.clone())
        });

        let Some(person) = self.working.get_mut(owner) else {
            return;
        };

        let changed = match existing {
            Some(key) => match person.record.edge_mut(&key) {
                Some(edge) => update_edge(edge, other, &other_name, their, mine, mode),
                None => false,
            },
            None => {
                let key = person.record.next_edge_key(self.stamp, self.next_index);
                self.next_index += 1;
                person.record.attributes.insert(
                    key,
                    Attribute::Relationship(RelationshipEdge {
                        value: other_name,
                        value2: their.to_string(),
                        value3: mine.to_string(),
                        person_id: Some(other.to_string()),
                    }),
                );
                true
            }
        };

        if changed {
            *self.written.entry(owner.to_string()).or_default() += 1;
        }
    }

    /// Step 4: one consolidated update per person whose record changed
    fn finish(self) -> PropagationPlan {
        let mut updates = Vec::new();
        for (id, after) in &self.working {
            let Some(before) = self.before.get(id) else {
                continue;
            };
            if before.record == after.record {
                continue;
            }
            updates.push(PersonUpdate {
                id: id.clone(),
                name: after.name().to_string(),
                patch: PersonPatch::rebuild_attributes(&before.record, &after.record),
                record: after.record.clone(),
                edges_written: self.written.get(id).copied().unwrap_or(0),
                edges_removed: self.removed.get(id).copied().unwrap_or(0),
            });
        }
        PropagationPlan {
            updates,
            skipped: self.skipped,
        }
    }
}

fn update_edge(
    edge: &mut RelationshipEdge,
    other: &str,
    other_name: &str,
    their: &str,
    mine: &str,
    mode: Mode,
) -> bool {
    let mut changed = false;
    if edge.person_id.as_deref() != Some(other) {
        edge.person_id = Some(other.to_string());
        changed = true;
    }
    if !other_name.is_empty() && edge.value != other_name {
        edge.value = other_name.to_string();
        changed = true;
    }
    match mode {
        Mode::Overwrite => {
            if edge.value2 != their {
                edge.value2 = their.to_string();
                changed = true;
            }
            if edge.value3 != mine {
                edge.value3 = mine.to_string();
                changed = true;
            }
        }
        Mode::Derived => {
            changed |= refine_label(&mut edge.value2, their);
            changed |= refine_label(&mut edge.value3, mine);
        }
    }
    changed
}

/// Fill an empty label, or swap a neutral label for a gendered one of the same category
fn refine_label(current: &mut String, proposed: &str) -> bool {
    if current.trim().is_empty() {
        *current = proposed.to_string();
        return true;
    }
    let (have_cat, have_gender) = labels::classify(current);
    let (want_cat, want_gender) = labels::classify(proposed);
    if have_cat != Category::None
        && have_cat == want_cat
        && !have_gender.is_known()
        && want_gender.is_known()
    {
        *current = proposed.to_string();
        return true;
    }
    false
}
