#![forbid(unsafe_code)]

use super::super::{StoreError, TagSubject};
use super::revision_tx::{add_item_version, ensure_pending_change, head_change, insert_item};
use super::views::{ResolvedView, active_items_sql};
use super::{query_lookup, settle};
use gv_core::TagPatch;
use gv_core::ids::{ChangeId, ItemId};
use rusqlite::{Connection, named_params, params};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(in crate::store) struct TagRow {
    pub name: String,
    pub item_id: ItemId,
}

/// Tags alive for `subject` in `view`, ordered by name.
pub(in crate::store) fn tags_at(
    conn: &Connection,
    subject: TagSubject,
    view: ResolvedView,
) -> Result<Vec<TagRow>, StoreError> {
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TagRow> {
        Ok(TagRow {
            name: row.get(0)?,
            item_id: ItemId::new(row.get(1)?),
        })
    };

    let rows = match subject {
        TagSubject::Branch(branch_id) => {
            let sql = format!(
                "{} SELECT t.name, t.item_id FROM active a \
                 JOIN branch_tags t ON t.item_id = a.item_id \
                 ORDER BY t.name",
                active_items_sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<TagRow> = stmt
                .query_map(
                    named_params! {
                        ":branch": branch_id.get(),
                        ":upto": view.upto_param(),
                        ":pending": view.pending_param(),
                        ":item": Option::<i64>::None,
                    },
                    map_row,
                )?
                .collect::<Result<_, _>>()?;
            rows
        }
        TagSubject::Item { branch_id, item_id } => {
            let sql = format!(
                "{} SELECT t.name, t.item_id FROM active a \
                 JOIN item_tags t ON t.item_id = a.item_id \
                 WHERE t.subject_item_id = :subject \
                 ORDER BY t.name",
                active_items_sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<TagRow> = stmt
                .query_map(
                    named_params! {
                        ":branch": branch_id.get(),
                        ":upto": view.upto_param(),
                        ":pending": view.pending_param(),
                        ":item": Option::<i64>::None,
                        ":subject": item_id.get(),
                    },
                    map_row,
                )?
                .collect::<Result<_, _>>()?;
            rows
        }
    };
    Ok(rows)
}

fn find_tag_item(
    conn: &Connection,
    subject: TagSubject,
    name: &str,
) -> Result<Option<ItemId>, StoreError> {
    let lookup = match subject {
        TagSubject::Branch(_) => query_lookup(
            conn,
            "SELECT item_id FROM branch_tags WHERE name=?1 ORDER BY item_id",
            params![name],
            |row| row.get::<_, i64>(0),
        )?,
        TagSubject::Item { item_id, .. } => query_lookup(
            conn,
            "SELECT item_id FROM item_tags WHERE subject_item_id=?1 AND name=?2 ORDER BY item_id",
            params![item_id.get(), name],
            |row| row.get::<_, i64>(0),
        )?,
    };
    Ok(settle(lookup, "tag item by name").map(ItemId::new))
}

fn find_or_create_tag_item(
    conn: &Connection,
    subject: TagSubject,
    name: &str,
    now_ms: i64,
) -> Result<ItemId, StoreError> {
    if let Some(item_id) = find_tag_item(conn, subject, name)? {
        return Ok(item_id);
    }

    let tag_item_id = insert_item(conn, now_ms)?;
    match subject {
        TagSubject::Branch(_) => conn.execute(
            "INSERT INTO branch_tags(item_id, name) VALUES (?1, ?2)",
            params![tag_item_id.get(), name],
        )?,
        TagSubject::Item { item_id, .. } => conn.execute(
            "INSERT INTO item_tags(item_id, subject_item_id, name) VALUES (?1, ?2, ?3)",
            params![tag_item_id.get(), item_id.get(), name],
        )?,
    };
    Ok(tag_item_id)
}

/// Writes the minimal add/remove patch that turns the subject's current tags
/// into `desired` (already normalized). "Current" is the branch head with the
/// target change laid over it. The change is left pending.
pub(in crate::store) fn reconcile_tags(
    conn: &Connection,
    subject: TagSubject,
    change_id: ChangeId,
    desired: &[String],
    now_ms: i64,
) -> Result<TagPatch, StoreError> {
    let branch_id = subject.branch_id();
    let target = ensure_pending_change(conn, change_id, "can only tag inside a pending change")?;
    if target.branch_id != branch_id {
        return Err(StoreError::Validation(
            "target change belongs to another branch",
        ));
    }

    // true = still to be added
    let mut wanted: BTreeMap<&str, bool> = desired.iter().map(|tag| (tag.as_str(), true)).collect();

    let view = ResolvedView {
        upto: head_change(conn, branch_id)?,
        pending: Some(change_id),
    };

    let mut patch = TagPatch::default();
    for current in tags_at(conn, subject, view)? {
        match wanted.get_mut(current.name.as_str()) {
            Some(pending_add) => *pending_add = false,
            None => {
                add_item_version(conn, current.item_id, change_id, true, now_ms)?;
                patch.removed.push(current.name);
            }
        }
    }

    for (name, to_add) in wanted {
        if !to_add {
            continue;
        }
        let tag_item_id = find_or_create_tag_item(conn, subject, name, now_ms)?;
        add_item_version(conn, tag_item_id, change_id, false, now_ms)?;
        patch.added.push(name.to_string());
    }

    Ok(patch)
}
