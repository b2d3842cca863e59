//! Post-traversal pass finding relations between people already in the network.
//!
//! The rooted walk only sees rows touching each level's frontier, so ties
//! between two nodes of the same level, or ties cut by a per-level cap, can
//! be missed. This pass asks the source once per relation type for rows with
//! both endpoints inside the discovered set.

use std::collections::HashSet;

use crate::error::Result;
use crate::network::model::{EdgeRow, PairKey, PersonId, RelationType};
use crate::network::query::{ExploreContext, ExploreQuery};
use crate::network::source::NetworkSource;

/// Why the pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRequested,
    SingleLevel,
    AboveCeiling { members: usize, ceiling: usize },
}

/// Decide whether the pass runs for `query` over `member_count` nodes.
pub fn should_detect(query: &ExploreQuery, member_count: usize) -> std::result::Result<(), SkipReason> {
    if !query.include_reciprocal {
        return Err(SkipReason::NotRequested);
    }
    if query.max_depth <= 1 {
        return Err(SkipReason::SingleLevel);
    }
    if member_count >= query.reciprocal_ceiling {
        return Err(SkipReason::AboveCeiling {
            members: member_count,
            ceiling: query.reciprocal_ceiling,
        });
    }
    Ok(())
}

/// Relations among `members` of the given types that are not in `known`.
///
/// Issues exactly one `fetch_edges_within` per relation type. Returned rows
/// are deduplicated by unordered pair and type, and rows with an endpoint
/// outside `members` are dropped even if the source returns them.
pub async fn detect_reciprocal(
    source: &dyn NetworkSource,
    members: &HashSet<PersonId>,
    relation_types: &[RelationType],
    known: impl Fn(&PairKey) -> bool,
    ctx: &ExploreContext,
) -> Result<Vec<EdgeRow>> {
    let mut found = Vec::new();
    let mut seen: HashSet<PairKey> = HashSet::new();

    for &relation in relation_types {
        ctx.check()?;
        let rows = source.fetch_edges_within(members, relation, ctx).await?;
        let returned = rows.len();
        for row in rows {
            if row.source == row.target
                || !members.contains(&row.source)
                || !members.contains(&row.target)
            {
                continue;
            }
            let key = row.pair_key();
            if known(&key) || !seen.insert(key) {
                continue;
            }
            found.push(row);
        }
        log::debug!(
            "Reciprocal pass: {} {} rows among {} members",
            returned,
            relation,
            members.len()
        );
    }

    Ok(found)
}
