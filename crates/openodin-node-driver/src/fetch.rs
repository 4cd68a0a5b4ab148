//! Fetch algorithm: permission-aware graph walk over the `nodes` table,
//! `match[]` application, ordering, cursor windowing, and embed expansion
//! (§4.2 "Fetch algorithm").
//!
//! `embed[]` names no field to resolve "the referenced embedded node"
//! against; the node model carries no dedicated field for it either. This
//! walk resolves an embed candidate through `copied_id1` — the one field
//! this core already reserves for "this node stands in for another stored
//! node" — rather than inventing a new field (recorded in DESIGN.md).

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Transaction};

use openodin_core::constants::{MAX_QUERY_LEVEL_LIMIT, MAX_QUERY_ROWS_LIMIT};
use openodin_core::{Error, Id, Node, Result, ZERO_ID};

use crate::cursor;
use crate::filters::all_filters_match;
use crate::permission::{is_visible, is_write_visible, FriendCertRow, LicenseRow};
use crate::rows::decode_node_from_row;
use crate::types::{FetchQuery, FetchedNode, PermissionContext, Seed};

pub struct FetchOutcome {
    pub nodes: Vec<FetchedNode>,
    pub embed: Vec<Node>,
    pub indexes: Vec<usize>,
}

struct WalkNode {
    node: Node,
    ancestors: Vec<Id>,
}

fn load_node(tx: &Transaction<'_>, id1: &Id) -> Result<Option<Node>> {
    let mut stmt = tx
        .prepare_cached("SELECT * FROM nodes WHERE id1 = ?1")
        .map_err(|e| Error::storage(format!("prepare load node: {e}")))?;
    let mut rows = stmt.query(params![id1.as_slice()]).map_err(|e| Error::storage(format!("query load node: {e}")))?;
    match rows.next().map_err(|e| Error::storage(format!("row next: {e}")))? {
        Some(row) => Ok(Some(decode_node_from_row(row).map_err(|e| Error::storage(format!("decode: {e}")))?)),
        None => Ok(None),
    }
}

fn load_children(tx: &Transaction<'_>, parent_id: &Id, limit: usize) -> Result<Vec<Node>> {
    let mut stmt = tx
        .prepare_cached("SELECT * FROM nodes WHERE parentid = ?1 LIMIT ?2")
        .map_err(|e| Error::storage(format!("prepare children: {e}")))?;
    let rows = stmt
        .query_map(params![parent_id.as_slice(), limit as i64], decode_node_from_row)
        .map_err(|e| Error::storage(format!("query children: {e}")))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::storage(format!("children row: {e}")))
}

/// §3 invariant 5: among nodes sharing `id2`, the active variant is the one
/// with the highest `creationTime` among those satisfying
/// `isOnlineIdValidated` (the one policy predicate this core models).
fn is_active_variant(tx: &Transaction<'_>, node: &Node) -> Result<bool> {
    let Some(id2) = node.id2 else {
        return Ok(true);
    };
    let predicate = |n: &Node| n.transient.is_online_id_validated.unwrap_or(n.flags.is_online_id_validated);
    if !predicate(node) {
        return Ok(false);
    }
    let mut stmt = tx
        .prepare_cached("SELECT * FROM nodes WHERE id2 = ?1")
        .map_err(|e| Error::storage(format!("prepare variants: {e}")))?;
    let rows = stmt
        .query_map(params![id2.as_slice()], decode_node_from_row)
        .map_err(|e| Error::storage(format!("query variants: {e}")))?;
    let siblings = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::storage(format!("variant row: {e}")))?;
    let best = siblings
        .iter()
        .filter(|n| predicate(n))
        .max_by_key(|n| (n.creation_time, n.id1));
    Ok(best.map(|n| n.id1) == Some(node.id1))
}

fn license_rows_for(tx: &Transaction<'_>, target_pathhash: &Id) -> Result<Vec<LicenseRow>> {
    let mut stmt = tx
        .prepare_cached(
            "SELECT target_public_key, max_distance, disallowretrolicensing,
                    restrictivemode_writer, restrictivemode_manager, license_id1
             FROM licensing_hashes WHERE parentpathhash = ?1",
        )
        .map_err(|e| Error::storage(format!("prepare licenses: {e}")))?;
    let rows = stmt
        .query_map(params![target_pathhash.as_slice()], |row| {
            let target_bytes: Vec<u8> = row.get(0)?;
            let max_distance: u32 = row.get(1)?;
            let disallow_retro: bool = row.get(2)?;
            let restrictive_writer: bool = row.get(3)?;
            let restrictive_manager: bool = row.get(4)?;
            let license_id1_bytes: Vec<u8> = row.get(5)?;
            Ok((target_bytes, max_distance, disallow_retro, restrictive_writer, restrictive_manager, license_id1_bytes))
        })
        .map_err(|e| Error::storage(format!("query licenses: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        let (target_bytes, max_distance, disallow_retro, restrictive_writer, restrictive_manager, license_id1_bytes) =
            row.map_err(|e| Error::storage(format!("license row: {e}")))?;
        let target_public_key = crate::rows::decode_public_key(&target_bytes)?;
        let mut license_id1 = ZERO_ID;
        license_id1.copy_from_slice(&license_id1_bytes);
        out.push(LicenseRow {
            license_id1,
            target_public_key,
            max_distance,
            disallow_retro_licensing: disallow_retro,
            restrictive_mode_writer: restrictive_writer,
            restrictive_mode_manager: restrictive_manager,
        });
    }
    Ok(out)
}

fn friend_certs_for(tx: &Transaction<'_>, owner: &openodin_core::PublicKey) -> Result<Vec<FriendCertRow>> {
    let owner_bytes = crate::rows::public_key_bytes(owner);
    let mut stmt = tx
        .prepare_cached("SELECT owner, other_owner FROM friend_certs WHERE owner = ?1 OR other_owner = ?1")
        .map_err(|e| Error::storage(format!("prepare friend certs: {e}")))?;
    let rows = stmt
        .query_map(params![owner_bytes], |row| {
            let a: Vec<u8> = row.get(0)?;
            let b: Vec<u8> = row.get(1)?;
            Ok((a, b))
        })
        .map_err(|e| Error::storage(format!("query friend certs: {e}")))?;
    let mut out = Vec::new();
    for row in rows {
        let (a, b) = row.map_err(|e| Error::storage(format!("friend cert row: {e}")))?;
        out.push(FriendCertRow {
            owner: crate::rows::decode_public_key(&a)?,
            other_owner: crate::rows::decode_public_key(&b)?,
        });
    }
    Ok(out)
}

fn node_permitted(tx: &Transaction<'_>, node: &Node, ancestors: &[Id], ctx: &PermissionContext) -> Result<bool> {
    if node.flags.is_public {
        return Ok(true);
    }
    if node.owner == ctx.target {
        return Ok(true);
    }
    let friends = friend_certs_for(tx, &node.owner)?;
    // parentpathhash is stored keyed on the licensing node's own parent_id;
    // a license covers `node` at ancestor distance `d` when `node`'s
    // ancestor chain at depth `d` equals that licensing node's parent_id.
    let mut candidates = Vec::new();
    for (depth, ancestor) in std::iter::once(&node.parent_id).chain(ancestors.iter()).enumerate() {
        for license in license_rows_for(tx, ancestor)? {
            let license_creation_time = load_node(tx, &license.license_id1)?.map_or(0, |n| n.creation_time);
            candidates.push((license, depth as u32, node.creation_time, license_creation_time));
        }
    }
    Ok(is_visible(&node.owner, false, ctx, &candidates, &friends))
}

/// Collects `(license, ancestor_distance, node_creation_time,
/// license_creation_time)` candidates for `node`, walking its parent chain
/// up to the root. Shared by the read-visibility and write-permission
/// checks (§4.2 step 2c, §4.1 WriteBlob).
fn license_candidates(tx: &Transaction<'_>, node: &Node) -> Result<Vec<(LicenseRow, u32, u64, u64)>> {
    let mut ancestors = Vec::new();
    let mut current = node.parent_id;
    while current != ZERO_ID {
        ancestors.push(current);
        match load_node(tx, &current)? {
            Some(parent) => current = parent.parent_id,
            None => break,
        }
    }
    let mut candidates = Vec::new();
    for (depth, ancestor) in std::iter::once(&node.parent_id).chain(ancestors.iter()).enumerate() {
        for license in license_rows_for(tx, ancestor)? {
            let license_creation_time = load_node(tx, &license.license_id1)?.map_or(0, |n| n.creation_time);
            candidates.push((license, depth as u32, node.creation_time, license_creation_time));
        }
    }
    Ok(candidates)
}

/// §4.1 WriteBlob "verifies the target node exists, is reachable with
/// write permission (owner, or licensed via a valid license chain)".
pub fn write_permitted(tx: &Transaction<'_>, node: &Node, ctx: &PermissionContext) -> Result<bool> {
    if node.owner == ctx.target {
        return Ok(true);
    }
    let friends = friend_certs_for(tx, &node.owner)?;
    let candidates = license_candidates(tx, node)?;
    Ok(is_write_visible(&node.owner, ctx, &candidates, &friends))
}

/// §4.1 ReadBlob "verifies read permission (owner, licensed, or
/// public-node public read)".
pub fn read_permitted(tx: &Transaction<'_>, node: &Node, ctx: &PermissionContext) -> Result<bool> {
    if node.flags.is_public || node.owner == ctx.target {
        return Ok(true);
    }
    let friends = friend_certs_for(tx, &node.owner)?;
    let candidates = license_candidates(tx, node)?;
    Ok(is_visible(&node.owner, false, ctx, &candidates, &friends))
}

struct MatchState {
    emitted: i64,
    field_totals: HashMap<String, i64>,
}

enum MatchOutcome {
    Include { bottom: bool },
    Discard { bottom: bool },
    NoMatch,
}

fn apply_matches(node: &Node, query: &FetchQuery, match_state: &mut [MatchState]) -> MatchOutcome {
    if query.matches.is_empty() {
        return MatchOutcome::Include { bottom: false };
    }
    for (i, spec) in query.matches.iter().enumerate() {
        if !spec.node_type.is_empty() && spec.node_type != node.node_type {
            continue;
        }
        if !all_filters_match(node, &spec.filters) {
            continue;
        }
        if let Some(required) = spec.require_id {
            if node.id1 != required && node.id2 != Some(required) {
                continue;
            }
        }
        let state = &mut match_state[i];
        if spec.limit >= 0 && state.emitted >= spec.limit {
            return MatchOutcome::Discard { bottom: spec.bottom };
        }
        if let Some(field) = &spec.limit_field {
            let total = state.field_totals.entry(field.clone()).or_insert(0);
            if spec.limit >= 0 && *total >= spec.limit {
                return MatchOutcome::Discard { bottom: spec.bottom };
            }
            *total += 1;
        }
        state.emitted += 1;
        return if spec.discard {
            MatchOutcome::Discard { bottom: spec.bottom }
        } else {
            MatchOutcome::Include { bottom: spec.bottom }
        };
    }
    MatchOutcome::NoMatch
}

fn sort_key(node: &Node, order_by_storage_time: bool) -> (u64, Id) {
    let time = if order_by_storage_time {
        node.transient.storage_time.unwrap_or(node.creation_time)
    } else {
        node.creation_time
    };
    (time, node.id1)
}

/// Runs the full graph walk described by `query`, returning the windowed,
/// permission-filtered, ordered result plus any embedded nodes.
pub fn fetch(tx: &Transaction<'_>, query: &FetchQuery, now_ms: u64, ctx: &PermissionContext) -> Result<FetchOutcome> {
    let mut rows_examined: usize = 0;
    let mut current_level: Vec<WalkNode> = Vec::new();
    let mut include_root_in_output = true;

    match &query.seed {
        Seed::RootNodeId1(id) => {
            if let Some(node) = load_node(tx, id)? {
                include_root_in_output = !query.discard_root;
                current_level.push(WalkNode { node, ancestors: Vec::new() });
            }
        }
        Seed::ParentId(parent) => {
            let children = load_children(tx, parent, MAX_QUERY_LEVEL_LIMIT)?;
            rows_examined += children.len();
            for node in children {
                current_level.push(WalkNode { node, ancestors: Vec::new() });
            }
        }
    }

    let mut match_state: Vec<MatchState> =
        query.matches.iter().map(|_| MatchState { emitted: 0, field_totals: HashMap::new() }).collect();

    let mut output: Vec<FetchedNode> = Vec::new();
    let mut depth_remaining = query.depth;
    let mut level_index = 0u32;

    loop {
        if current_level.is_empty() || rows_examined > MAX_QUERY_ROWS_LIMIT {
            break;
        }
        let this_level_is_root_seed = level_index == 0 && matches!(query.seed, Seed::RootNodeId1(_));
        let mut next_level: Vec<WalkNode> = Vec::new();

        for walked in current_level.drain(..) {
            let WalkNode { node, ancestors } = walked;
            let is_seed_root = this_level_is_root_seed;

            if node.is_expired(now_ms) {
                continue;
            }
            if let Some(region) = query.region {
                if node.region != Some(region) {
                    continue;
                }
            }
            if let Some(jurisdiction) = query.jurisdiction {
                if node.jurisdiction != Some(jurisdiction) {
                    continue;
                }
            }
            if let Some(cutoff) = query.cutoff_time {
                if node.creation_time < cutoff {
                    continue;
                }
            }
            if query.ignore_own && node.owner == ctx.source {
                continue;
            }
            if query.ignore_inactive && !is_active_variant(tx, &node)? {
                continue;
            }
            if !node_permitted(tx, &node, &ancestors, ctx)? {
                continue;
            }

            let mut descend = true;
            if is_seed_root {
                if include_root_in_output {
                    output.push(FetchedNode { node: node.clone(), ancestors: ancestors.clone() });
                }
            } else {
                match apply_matches(&node, query, &mut match_state) {
                    MatchOutcome::Include { bottom } => {
                        output.push(FetchedNode { node: node.clone(), ancestors: ancestors.clone() });
                        descend = !bottom;
                    }
                    MatchOutcome::Discard { bottom } => {
                        descend = !bottom;
                    }
                    MatchOutcome::NoMatch => {}
                }
            }

            if descend {
                let mut child_ancestors = vec![node.id1];
                child_ancestors.extend(ancestors.iter().copied());
                let children = load_children(tx, &node.id1, MAX_QUERY_LEVEL_LIMIT)?;
                rows_examined += children.len();
                if rows_examined > MAX_QUERY_ROWS_LIMIT {
                    break;
                }
                for child in children {
                    next_level.push(WalkNode { node: child, ancestors: child_ancestors.clone() });
                }
            }
        }

        level_index += 1;
        if !this_level_is_root_seed {
            if depth_remaining == 0 {
                break;
            }
            if depth_remaining > 0 {
                depth_remaining -= 1;
            }
        }
        current_level = next_level;
    }

    output.sort_by(|a, b| {
        let ka = sort_key(&a.node, query.order_by_storage_time);
        let kb = sort_key(&b.node, query.order_by_storage_time);
        ka.cmp(&kb)
    });
    if query.descending {
        output.reverse();
    }

    let indexes = cursor::window(
        &output,
        |row: &FetchedNode| row.node.id1,
        query.cursor_id1,
        query.head,
        query.tail,
        query.reverse,
        openodin_core::constants::MAX_TRANSFORMER_LENGTH,
    )
    .ok_or_else(|| Error::missing_cursor("cursor node not present in fetch result"))?;

    let windowed: Vec<FetchedNode> = indexes.iter().map(|&i| output[i].clone()).collect();

    let mut embed = Vec::new();
    let mut seen: HashSet<Id> = HashSet::new();
    for row in &windowed {
        for spec in &query.embed {
            if !spec.node_type.is_empty() && spec.node_type != row.node.node_type {
                continue;
            }
            if !all_filters_match(&row.node, &spec.filters) {
                continue;
            }
            if let Some(target) = row.node.copied_id1 {
                if seen.insert(target) {
                    if let Some(embedded) = load_node(tx, &target)? {
                        if node_permitted(tx, &embedded, &row.ancestors, ctx)? {
                            embed.push(embedded);
                        }
                    }
                }
            }
        }
    }

    Ok(FetchOutcome { nodes: windowed, embed, indexes })
}
