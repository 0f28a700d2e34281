//! C1 — Scope resolver (spec §4.1).
//!
//! The classification and tree-walking logic is kept pure (operating over
//! already-fetched hierarchy rows) so it can be tested without a database,
//! the way `openmander`'s `Graph` is a plain CSR struct tested directly
//! against hand-built fixtures.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;

use crate::db::models::{BoothRow, HierarchyLevelRow, HierarchyNodeRow, VoterRow};
use crate::error::ScopeError;
use crate::types::{BoothId, ElectionId, NodeId, ScopeKind};

/// Case-insensitive substring match on the level name (spec §4.1 step 1).
pub fn classify_level_name(name: &str) -> Option<ScopeKind> {
    let lower = name.to_lowercase();
    if lower.contains("booth") || lower.contains("polling") {
        Some(ScopeKind::Booth)
    } else if lower.contains("assembly") || lower.contains("ac") {
        Some(ScopeKind::Constituency)
    } else {
        None
    }
}

/// Walk `parent_id` pointers downward from `root`, collecting every
/// descendant node id (inclusive) whose level matches `target_level`.
pub fn collect_booth_level_descendants(
    root: NodeId,
    nodes: &HashMap<NodeId, HierarchyNodeRow>,
    children: &HashMap<NodeId, Vec<NodeId>>,
    target_level: uuid::Uuid,
) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(node) = nodes.get(&id) {
            if node.level_id == target_level {
                out.push(id);
            }
        }
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().copied());
        }
    }
    out.sort();
    out
}

/// Walk `parent_id` pointers upward from `start` until a node whose level is
/// classified as `Constituency` is found.
pub fn find_constituency_ancestor(
    start: NodeId,
    nodes: &HashMap<NodeId, HierarchyNodeRow>,
    level_kind: &HashMap<uuid::Uuid, ScopeKind>,
) -> Option<NodeId> {
    let mut current = Some(start);
    while let Some(id) = current {
        let node = nodes.get(&id)?;
        if level_kind.get(&node.level_id) == Some(&ScopeKind::Constituency) {
            return Some(id);
        }
        current = node.parent_id;
    }
    None
}

pub struct ResolvedScope {
    pub kind: ScopeKind,
    pub booth_ids: Vec<BoothId>,
    pub voters: Vec<VoterRow>,
}

pub async fn resolve_scope(
    pool: &PgPool,
    election_id: ElectionId,
    node_id: NodeId,
) -> anyhow::Result<ResolvedScope> {
    let levels: Vec<HierarchyLevelRow> = sqlx::query_as(
        "select id, election_id, name, depth from hierarchy_levels where election_id = $1",
    )
    .bind(election_id)
    .fetch_all(pool)
    .await?;
    let level_kind: HashMap<uuid::Uuid, ScopeKind> = levels
        .iter()
        .filter_map(|l| classify_level_name(&l.name).map(|k| (l.id, k)))
        .collect();

    let node_rows: Vec<HierarchyNodeRow> = sqlx::query_as(
        "select id, election_id, level_id, parent_id from hierarchy_nodes where election_id = $1",
    )
    .bind(election_id)
    .fetch_all(pool)
    .await?;
    let nodes: HashMap<NodeId, HierarchyNodeRow> =
        node_rows.iter().cloned().map(|n| (n.id, n)).collect();

    let target_node = nodes.get(&node_id).ok_or(ScopeError::UnknownScope)?;
    let kind = *level_kind.get(&target_node.level_id).ok_or(ScopeError::UnknownScope)?;

    let booth_ids: Vec<BoothId> = match kind {
        ScopeKind::Booth => {
            let booths: Vec<BoothRow> =
                sqlx::query_as("select id, election_id, node_id, booth_number, latitude, longitude from booths where node_id = $1")
                    .bind(node_id)
                    .fetch_all(pool)
                    .await?;
            if booths.is_empty() {
                return Err(ScopeError::BoothNotFound.into());
            }
            booths.into_iter().map(|b| b.id).collect()
        }
        ScopeKind::Constituency => {
            let booth_level_id = levels
                .iter()
                .find(|l| classify_level_name(&l.name) == Some(ScopeKind::Booth))
                .map(|l| l.id)
                .ok_or(ScopeError::UnknownScope)?;

            let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
            for n in &node_rows {
                if let Some(parent) = n.parent_id {
                    children.entry(parent).or_default().push(n.id);
                }
            }

            let descendant_nodes =
                collect_booth_level_descendants(node_id, &nodes, &children, booth_level_id);
            if descendant_nodes.is_empty() {
                return Err(ScopeError::BoothNotFound.into());
            }

            let booths: Vec<BoothRow> = sqlx::query_as(
                "select id, election_id, node_id, booth_number, latitude, longitude from booths where node_id = any($1)",
            )
            .bind(&descendant_nodes)
            .fetch_all(pool)
            .await?;
            if booths.is_empty() {
                return Err(ScopeError::BoothNotFound.into());
            }
            booths.into_iter().map(|b| b.id).collect()
        }
    };

    // Single-constituency boundary assertion (spec §4.1 step 4): walk up
    // from every in-scope booth's node and require a single ancestor.
    let booth_nodes: Vec<HierarchyNodeRow> = sqlx::query_as(
        "select id, election_id, level_id, parent_id from hierarchy_nodes where id in (select node_id from booths where id = any($1))",
    )
    .bind(&booth_ids)
    .fetch_all(pool)
    .await?;
    let mut ancestors: HashSet<NodeId> = HashSet::new();
    for n in &booth_nodes {
        if let Some(anc) = find_constituency_ancestor(n.id, &nodes, &level_kind) {
            ancestors.insert(anc);
        }
    }
    if ancestors.len() > 1 {
        return Err(ScopeError::BoundaryViolation.into());
    }

    let voters: Vec<VoterRow> = sqlx::query_as(
        "select id, election_id, booth_id, family_id, full_name, epic_number, age, gender, latitude, longitude, address from voters where booth_id = any($1)",
    )
    .bind(&booth_ids)
    .fetch_all(pool)
    .await?;

    Ok(ResolvedScope { kind, booth_ids, voters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn classifies_booth_and_polling_and_assembly_and_ac() {
        assert_eq!(classify_level_name("Booth"), Some(ScopeKind::Booth));
        assert_eq!(classify_level_name("Polling Station"), Some(ScopeKind::Booth));
        assert_eq!(classify_level_name("Assembly Constituency"), Some(ScopeKind::Constituency));
        assert_eq!(classify_level_name("AC"), Some(ScopeKind::Constituency));
        assert_eq!(classify_level_name("District"), None);
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify_level_name("BOOTH"), Some(ScopeKind::Booth));
        assert_eq!(classify_level_name("ac"), Some(ScopeKind::Constituency));
    }

    fn node(id: Uuid, level_id: Uuid, parent: Option<Uuid>) -> HierarchyNodeRow {
        HierarchyNodeRow { id, election_id: Uuid::nil(), level_id, parent_id: parent }
    }

    #[test]
    fn collects_booth_level_descendants_through_multiple_generations() {
        let booth_level = Uuid::new_v4();
        let ac_level = Uuid::new_v4();
        let root = Uuid::new_v4();
        let mid = Uuid::new_v4();
        let leaf_a = Uuid::new_v4();
        let leaf_b = Uuid::new_v4();
        let unrelated = Uuid::new_v4();

        let mut nodes = HashMap::new();
        nodes.insert(root, node(root, ac_level, None));
        nodes.insert(mid, node(mid, ac_level, Some(root)));
        nodes.insert(leaf_a, node(leaf_a, booth_level, Some(mid)));
        nodes.insert(leaf_b, node(leaf_b, booth_level, Some(root)));
        nodes.insert(unrelated, node(unrelated, booth_level, None));

        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        children.insert(root, vec![mid, leaf_b]);
        children.insert(mid, vec![leaf_a]);

        let mut result = collect_booth_level_descendants(root, &nodes, &children, booth_level);
        result.sort();
        let mut expected = vec![leaf_a, leaf_b];
        expected.sort();
        assert_eq!(result, expected);
    }

    #[test]
    fn finds_constituency_ancestor_by_walking_up() {
        let booth_level = Uuid::new_v4();
        let ac_level = Uuid::new_v4();
        let mut level_kind = HashMap::new();
        level_kind.insert(booth_level, ScopeKind::Booth);
        level_kind.insert(ac_level, ScopeKind::Constituency);

        let root = Uuid::new_v4();
        let leaf = Uuid::new_v4();
        let mut nodes = HashMap::new();
        nodes.insert(root, node(root, ac_level, None));
        nodes.insert(leaf, node(leaf, booth_level, Some(root)));

        assert_eq!(find_constituency_ancestor(leaf, &nodes, &level_kind), Some(root));
    }

    #[test]
    fn no_constituency_ancestor_returns_none() {
        let booth_level = Uuid::new_v4();
        let mut level_kind = HashMap::new();
        level_kind.insert(booth_level, ScopeKind::Booth);

        let leaf = Uuid::new_v4();
        let mut nodes = HashMap::new();
        nodes.insert(leaf, node(leaf, booth_level, None));

        assert_eq!(find_constituency_ancestor(leaf, &nodes, &level_kind), None);
    }
}
