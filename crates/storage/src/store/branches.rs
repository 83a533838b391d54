#![forbid(unsafe_code)]

use super::support::views::{ResolvedView, active_item, resolve_view};
use super::support::{query_lookup, revision_tx, settle, tags_tx};
use super::{
    CreateBranchRequest, ListBranchesRequest, SqliteStore, StoreError, TagSubject,
    UpdateBranchHeaderRequest, now_ms,
};
use gv_core::ids::{ActorId, BranchId, ChangeId, ItemId, ProjectId};
use gv_core::{
    BranchDetails, BranchView, CreatedBranch, MAX_BRANCH_TAGS, Page, check_tag_count,
    normalize_tags,
};
use rusqlite::{Connection, OptionalExtension, params};

const MAX_BRANCH_NAME_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Header {
    name: String,
    description: String,
}

impl SqliteStore {
    /// Creates a branch with its header and tags in one committed change, then
    /// opens the creating actor's pending change on it.
    ///
    /// With a parent, the parent's head is forked into that same first change,
    /// so the new branch starts from the parent's snapshot.
    #[tracing::instrument(level = "debug", skip(self, request), fields(project_id = %request.project_id, actor_id = %request.actor_id), err)]
    pub fn create_branch(
        &mut self,
        request: CreateBranchRequest,
    ) -> Result<CreatedBranch, StoreError> {
        let name = validate_branch_name(&request.name)?;
        let tags = normalize_tags(&request.tags)?;
        check_tag_count(&tags, MAX_BRANCH_TAGS)?;

        let now_ms = now_ms();
        let tx = self.write_tx()?;

        if name_taken(&tx, request.project_id, &name, None)? {
            return Err(StoreError::Conflict("branch name already exists in project"));
        }

        let branch_id =
            revision_tx::insert_branch(&tx, request.project_id, request.parent_branch_id, now_ms)?;
        let header_item_id = revision_tx::insert_item(&tx, now_ms)?;
        tx.execute(
            "INSERT INTO branch_headers(branch_id, item_id) VALUES (?1, ?2)",
            params![branch_id.get(), header_item_id.get()],
        )?;

        let change_id = revision_tx::insert_change(&tx, branch_id, &request.actor_id, now_ms)?;
        if let Some(parent_branch_id) = request.parent_branch_id {
            if revision_tx::head_change(&tx, parent_branch_id)?.is_some() {
                revision_tx::fork(
                    &tx,
                    &request.actor_id,
                    branch_id,
                    parent_branch_id,
                    change_id,
                    None,
                    now_ms,
                )?;
            } else {
                tracing::debug!(
                    %parent_branch_id,
                    "parent has no committed history; nothing to fork"
                );
            }
        }

        write_header(&tx, header_item_id, change_id, &name, &request.description, now_ms)?;
        tags_tx::reconcile_tags(&tx, TagSubject::Branch(branch_id), change_id, &tags, now_ms)?;
        revision_tx::commit_change(&tx, change_id, &request.actor_id, now_ms)?;
        tx.commit()?;

        let pending_change_id = self.create_pending_change(&request.actor_id, branch_id)?;
        tracing::debug!(
            %branch_id,
            header_change_id = %change_id,
            %pending_change_id,
            "created branch"
        );

        Ok(CreatedBranch {
            branch_id,
            header_change_id: change_id,
            pending_change_id,
        })
    }

    /// Writes a new header version and reconciles tags in a fresh change that
    /// is committed before returning.
    #[tracing::instrument(level = "debug", skip(self, request), fields(branch_id = %request.branch_id, actor_id = %request.actor_id), err)]
    pub fn update_branch_header(
        &mut self,
        request: UpdateBranchHeaderRequest,
    ) -> Result<ChangeId, StoreError> {
        let name = validate_branch_name(&request.name)?;
        let tags = normalize_tags(&request.tags)?;
        check_tag_count(&tags, MAX_BRANCH_TAGS)?;

        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let header_item_id = require_header_item(&tx, request.branch_id)?;
        let project_id = revision_tx::branch_project(&tx, request.branch_id)?
            .ok_or(StoreError::NotFound("unknown branch id"))?;
        if name_taken(&tx, project_id, &name, Some(request.branch_id))? {
            return Err(StoreError::Conflict("branch name already exists in project"));
        }

        let change_id =
            revision_tx::insert_change(&tx, request.branch_id, &request.actor_id, now_ms)?;
        write_header(&tx, header_item_id, change_id, &name, &request.description, now_ms)?;
        tags_tx::reconcile_tags(
            &tx,
            TagSubject::Branch(request.branch_id),
            change_id,
            &tags,
            now_ms,
        )?;
        revision_tx::commit_change(&tx, change_id, &request.actor_id, now_ms)?;
        tx.commit()?;
        Ok(change_id)
    }

    /// Replaces the branch's tags in a fresh committed change. A change is
    /// committed even when nothing differs.
    #[tracing::instrument(level = "debug", skip(self, tags), err)]
    pub fn update_branch_tags(
        &mut self,
        branch_id: BranchId,
        actor_id: &ActorId,
        tags: &[String],
    ) -> Result<ChangeId, StoreError> {
        let tags = normalize_tags(tags)?;
        check_tag_count(&tags, MAX_BRANCH_TAGS)?;

        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let change_id = revision_tx::insert_change(&tx, branch_id, actor_id, now_ms)?;
        let patch =
            tags_tx::reconcile_tags(&tx, TagSubject::Branch(branch_id), change_id, &tags, now_ms)?;
        revision_tx::commit_change(&tx, change_id, actor_id, now_ms)?;
        tx.commit()?;
        tracing::debug!(
            %branch_id,
            %change_id,
            writes = patch.write_count(),
            "updated branch tags"
        );
        Ok(change_id)
    }

    /// `None` when the branch has no header alive in `view`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn branch_details(
        &self,
        branch_id: BranchId,
        view: BranchView,
    ) -> Result<Option<BranchDetails>, StoreError> {
        let resolved = resolve_view(&self.conn, branch_id, view)?;
        details_at(&self.conn, branch_id, resolved)
    }

    /// Branches of a project as of their heads, ordered by name.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn list_branches(
        &self,
        request: ListBranchesRequest,
    ) -> Result<Vec<BranchDetails>, StoreError> {
        if !revision_tx::project_exists(&self.conn, request.project_id)? {
            return Err(StoreError::NotFound("unknown project id"));
        }
        let page = Page::new(request.offset, request.limit);
        let needle = request
            .name_contains
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase);

        let mut out = Vec::new();
        for branch_id in project_branches(&self.conn, request.project_id)? {
            let view = ResolvedView::committed(revision_tx::head_change(&self.conn, branch_id)?);
            let Some(details) = details_at(&self.conn, branch_id, view)? else {
                continue;
            };
            if let Some(needle) = &needle {
                if !details.name.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            out.push(details);
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.branch_id.cmp(&b.branch_id)));
        Ok(out.into_iter().skip(page.offset).take(page.limit).collect())
    }
}

fn validate_branch_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("branch name must not be empty"));
    }
    if name.chars().count() > MAX_BRANCH_NAME_CHARS {
        return Err(StoreError::Validation("branch name is too long"));
    }
    if name.chars().any(char::is_control) {
        return Err(StoreError::Validation(
            "branch name must not contain control characters",
        ));
    }
    Ok(name.to_string())
}

fn write_header(
    conn: &Connection,
    header_item_id: ItemId,
    change_id: ChangeId,
    name: &str,
    description: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let version = revision_tx::add_item_version(conn, header_item_id, change_id, false, now_ms)?;
    conn.execute(
        "INSERT INTO branch_header_versions(item_version_id, name, description) \
         VALUES (?1, ?2, ?3)",
        params![version.item_version_id.get(), name, description],
    )?;
    Ok(())
}

fn header_item(conn: &Connection, branch_id: BranchId) -> Result<Option<ItemId>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT item_id FROM branch_headers WHERE branch_id=?1",
            params![branch_id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(ItemId::new))
}

fn require_header_item(conn: &Connection, branch_id: BranchId) -> Result<ItemId, StoreError> {
    revision_tx::ensure_branch(conn, branch_id)?;
    header_item(conn, branch_id)?.ok_or(StoreError::NotFound("branch has no header"))
}

fn header_at(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
) -> Result<Option<Header>, StoreError> {
    let Some(header_item_id) = header_item(conn, branch_id)? else {
        return Ok(None);
    };
    let Some(active) = active_item(conn, branch_id, view, header_item_id)? else {
        return Ok(None);
    };
    let lookup = query_lookup(
        conn,
        "SELECT name, description FROM branch_header_versions WHERE item_version_id=?1",
        params![active.item_version_id.get()],
        |row| {
            Ok(Header {
                name: row.get(0)?,
                description: row.get(1)?,
            })
        },
    )?;
    Ok(settle(lookup, "branch_header_versions by version"))
}

fn details_at(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
) -> Result<Option<BranchDetails>, StoreError> {
    let Some(change_id) = view.anchor() else {
        return Ok(None);
    };
    let Some(header) = header_at(conn, branch_id, view)? else {
        return Ok(None);
    };
    let (project_id, parent_branch_id) = conn.query_row(
        "SELECT project_id, parent_branch_id FROM gv_branches WHERE id=?1",
        params![branch_id.get()],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
    )?;
    let tags = tags_tx::tags_at(conn, TagSubject::Branch(branch_id), view)?
        .into_iter()
        .map(|row| row.name)
        .collect();

    Ok(Some(BranchDetails {
        branch_id,
        project_id: ProjectId::new(project_id),
        parent_branch_id: parent_branch_id.map(BranchId::new),
        change_id,
        name: header.name,
        description: header.description,
        tags,
    }))
}

fn project_branches(conn: &Connection, project_id: ProjectId) -> Result<Vec<BranchId>, StoreError> {
    let mut stmt = conn.prepare("SELECT id FROM gv_branches WHERE project_id=?1 ORDER BY id")?;
    let rows = stmt.query_map(params![project_id.get()], |row| row.get::<_, i64>(0))?;
    Ok(rows
        .map(|row| row.map(BranchId::new))
        .collect::<Result<_, _>>()?)
}

/// Whether another branch of the project carries `name` at its head.
fn name_taken(
    conn: &Connection,
    project_id: ProjectId,
    name: &str,
    except: Option<BranchId>,
) -> Result<bool, StoreError> {
    for branch_id in project_branches(conn, project_id)? {
        if Some(branch_id) == except {
            continue;
        }
        let view = ResolvedView::committed(revision_tx::head_change(conn, branch_id)?);
        if view.upto.is_none() {
            continue;
        }
        if header_at(conn, branch_id, view)?.is_some_and(|header| header.name == name) {
            return Ok(true);
        }
    }
    Ok(false)
}
