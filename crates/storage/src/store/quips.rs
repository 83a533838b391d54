#![forbid(unsafe_code)]

use super::support::pending_tx::require_pending;
use super::support::views::{ResolvedView, active_items_sql, resolve_view};
use super::support::{revision_tx, tags_tx};
use super::{SaveQuipRequest, SqliteStore, StoreError, TagSubject, now_ms, to_sqlite_i64};
use gv_core::ids::{ActorId, BranchId, ChangeId, ItemId, ItemVersionId};
use gv_core::{
    BranchView, MAX_QUIP_TAGS, Page, QuipRow, VersionRef, check_tag_count, normalize_tags,
};
use rusqlite::{Connection, OptionalExtension, named_params, params};

impl SqliteStore {
    /// Writes a quip version into the actor's pending change on the branch and
    /// reconciles the quip's tags in that same change. Nothing is committed.
    #[tracing::instrument(level = "debug", skip(self, request), fields(branch_id = %request.branch_id, actor_id = %request.actor_id), err)]
    pub fn save_quip(&mut self, request: SaveQuipRequest) -> Result<VersionRef, StoreError> {
        if request.text.trim().is_empty() {
            return Err(StoreError::Validation("quip text must not be empty"));
        }
        if request.timestamp_ms < 0 {
            return Err(StoreError::Validation("quip timestamp must not be negative"));
        }
        let tags = normalize_tags(&request.tags)?;
        check_tag_count(&tags, MAX_QUIP_TAGS)?;

        let now_ms = now_ms();
        let tx = self.write_tx()?;
        revision_tx::ensure_branch(&tx, request.branch_id)?;
        let change_id = require_pending(&tx, &request.actor_id, request.branch_id)?;

        let item_id = match request.item_id {
            Some(item_id) => {
                let view = ResolvedView {
                    upto: revision_tx::head_change(&tx, request.branch_id)?,
                    pending: Some(change_id),
                };
                if quip_at(&tx, request.branch_id, view, item_id)?.is_none() {
                    return Err(StoreError::NotFound("quip is not alive on this branch"));
                }
                item_id
            }
            None => revision_tx::insert_item(&tx, now_ms)?,
        };

        let version = revision_tx::add_item_version(&tx, item_id, change_id, false, now_ms)?;
        tx.execute(
            "INSERT INTO quip_versions(item_version_id, text, timestamp_ms) VALUES (?1, ?2, ?3)",
            params![version.item_version_id.get(), request.text, request.timestamp_ms],
        )?;
        tags_tx::reconcile_tags(
            &tx,
            TagSubject::Item {
                branch_id: request.branch_id,
                item_id,
            },
            change_id,
            &tags,
            now_ms,
        )?;
        tx.commit()?;
        Ok(version)
    }

    /// Records a deletion of the quip (and its tags) in the actor's pending
    /// change. `NotFound` unless the quip is alive in that pending overlay.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn delete_quip(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
        item_id: ItemId,
    ) -> Result<VersionRef, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        revision_tx::ensure_branch(&tx, branch_id)?;
        let change_id = require_pending(&tx, actor_id, branch_id)?;
        let view = ResolvedView {
            upto: revision_tx::head_change(&tx, branch_id)?,
            pending: Some(change_id),
        };
        if quip_at(&tx, branch_id, view, item_id)?.is_none() {
            return Err(StoreError::NotFound("quip is not alive on this branch"));
        }

        tags_tx::reconcile_tags(
            &tx,
            TagSubject::Item { branch_id, item_id },
            change_id,
            &[],
            now_ms,
        )?;
        let version = revision_tx::add_item_version(&tx, item_id, change_id, true, now_ms)?;
        tx.commit()?;
        Ok(version)
    }

    /// Quips alive in `view`, ordered by their timestamp.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn list_quips(
        &self,
        branch_id: BranchId,
        view: BranchView,
        page: Page,
    ) -> Result<Vec<QuipRow>, StoreError> {
        let resolved = resolve_view(&self.conn, branch_id, view)?;
        let sql = format!(
            "{} SELECT a.item_id, a.item_version_id, a.change_id, q.text, q.timestamp_ms \
             FROM active a \
             JOIN quip_versions q ON q.item_version_id = a.item_version_id \
             ORDER BY q.timestamp_ms ASC, a.item_id ASC \
             LIMIT :limit OFFSET :offset",
            active_items_sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<QuipRow> = stmt
            .query_map(
                named_params! {
                    ":branch": branch_id.get(),
                    ":upto": resolved.upto_param(),
                    ":pending": resolved.pending_param(),
                    ":item": Option::<i64>::None,
                    ":limit": to_sqlite_i64(page.limit)?,
                    ":offset": to_sqlite_i64(page.offset)?,
                },
                |row| quip_row(row, resolved),
            )?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|row| with_tags(&self.conn, branch_id, resolved, row))
            .collect()
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn quip(
        &self,
        branch_id: BranchId,
        item_id: ItemId,
        view: BranchView,
    ) -> Result<Option<QuipRow>, StoreError> {
        let resolved = resolve_view(&self.conn, branch_id, view)?;
        quip_at(&self.conn, branch_id, resolved, item_id)?
            .map(|row| with_tags(&self.conn, branch_id, resolved, row))
            .transpose()
    }
}

fn quip_row(row: &rusqlite::Row<'_>, view: ResolvedView) -> rusqlite::Result<QuipRow> {
    let change_id = ChangeId::new(row.get(2)?);
    Ok(QuipRow {
        item_id: ItemId::new(row.get(0)?),
        item_version_id: ItemVersionId::new(row.get(1)?),
        change_id,
        text: row.get(3)?,
        timestamp_ms: row.get(4)?,
        tags: Vec::new(),
        pending: view.pending == Some(change_id),
    })
}

fn with_tags(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
    mut row: QuipRow,
) -> Result<QuipRow, StoreError> {
    row.tags = tags_tx::tags_at(
        conn,
        TagSubject::Item {
            branch_id,
            item_id: row.item_id,
        },
        view,
    )?
    .into_iter()
    .map(|tag| tag.name)
    .collect();
    Ok(row)
}

fn quip_at(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
    item_id: ItemId,
) -> Result<Option<QuipRow>, StoreError> {
    let sql = format!(
        "{} SELECT a.item_id, a.item_version_id, a.change_id, q.text, q.timestamp_ms \
         FROM active a \
         JOIN quip_versions q ON q.item_version_id = a.item_version_id",
        active_items_sql()
    );
    Ok(conn
        .query_row(
            &sql,
            named_params! {
                ":branch": branch_id.get(),
                ":upto": view.upto_param(),
                ":pending": view.pending_param(),
                ":item": item_id.get(),
            },
            |row| quip_row(row, view),
        )
        .optional()?)
}
