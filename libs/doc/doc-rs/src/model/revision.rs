//! Tracked-change revisions layered over the content model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::tree::{DocumentTree, Node, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionKind {
    Insertion,
    Deletion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: Uuid,
    pub kind: RevisionKind,
    pub author: String,
    pub date: DateTime<Utc>,
}

/// Registry of active revisions. Runs reference revisions by id; the
/// registry is the source of truth for kind and authorship.
#[derive(Default)]
pub struct RevisionTracker {
    revisions: Vec<Revision>,
    pub track_changes: bool,
    pub current_author: String,
}

impl RevisionTracker {
    pub fn new(author: impl Into<String>) -> Self {
        Self { revisions: vec![], track_changes: false, current_author: author.into() }
    }

    pub fn begin(&mut self, kind: RevisionKind) -> Uuid {
        let revision = Revision {
            id: Uuid::new_v4(),
            kind,
            author: self.current_author.clone(),
            date: Utc::now(),
        };
        let id = revision.id;
        self.revisions.push(revision);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&Revision> {
        self.revisions.iter().find(|revision| revision.id == id)
    }

    pub fn remove(&mut self, id: Uuid) {
        self.revisions.retain(|revision| revision.id != id);
    }

    /// Re-registers a revision removed by accept/reject. Idempotent.
    pub fn restore(&mut self, revision: Revision) {
        if self.get(revision.id).is_none() {
            self.revisions.push(revision);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Whether the revision was authored by the acting user. Deleting one's
    /// own pending insertion is a hard delete, not a tracked deletion.
    pub fn owned_by_current_author(&self, id: Uuid) -> bool {
        self.get(id).map(|revision| revision.author == self.current_author).unwrap_or(false)
    }

    /// The newest insertion revision covering a run, if any.
    pub fn covering_insertion(&self, tree: &DocumentTree, run: NodeId) -> Option<&Revision> {
        let Some(Node::TextRun(text_run)) = tree.node(run) else { return None };
        text_run
            .revision_ids
            .iter()
            .rev()
            .filter_map(|&id| self.get(id))
            .find(|revision| revision.kind == RevisionKind::Insertion)
    }

    /// Whether the run carries the given revision. Used when extending a
    /// captured selection end over runs later merged into the revision.
    pub fn is_marked_for_revision(&self, tree: &DocumentTree, inline: NodeId, id: Uuid) -> bool {
        match tree.node(inline) {
            Some(Node::TextRun(run)) => run.revision_ids.contains(&id),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::format::CharacterFormat;

    #[test]
    fn authorship_check_matches_acting_user() {
        let mut tracker = RevisionTracker::new("ada");
        let id = tracker.begin(RevisionKind::Insertion);
        assert!(tracker.owned_by_current_author(id));

        tracker.current_author = "grace".into();
        assert!(!tracker.owned_by_current_author(id));
    }

    #[test]
    fn covering_insertion_prefers_newest() {
        let mut tree = DocumentTree::new();
        let mut tracker = RevisionTracker::new("ada");
        let older = tracker.begin(RevisionKind::Insertion);
        let newer = tracker.begin(RevisionKind::Insertion);

        let run = tree.new_text_run("x", CharacterFormat::default());
        if let Some(Node::TextRun(text_run)) = tree.node_mut(run) {
            text_run.revision_ids = vec![older, newer];
        }
        assert_eq!(tracker.covering_insertion(&tree, run).unwrap().id, newer);
    }
}
