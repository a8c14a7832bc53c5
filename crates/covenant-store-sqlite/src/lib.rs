//! SQLite backend for the covenant [`Store`] trait.
//!
//! Every conditional operation the trait promises (link-if-unset, bind-if-
//! unset, status-update-with-expected-pre-state, count+insert under quota) is
//! a single statement or a single transaction here, so concurrent requests
//! racing the same transition converge instead of corrupting state.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use covenant_storage::{
    CreateProjectParams, ExternalId, Identity, Milestone, MilestoneId, MilestoneStatus,
    MilestoneStatusUpdate, NewIdentityParams, Project, ProjectId, ProjectStatus, Role, Store,
    StoreError, Tier,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const IDENTITY_COLS: &str =
    "external_id,email,display_name,tier,current_role,banned,linked_owner_id,created_at,updated_at";
const PROJECT_COLS: &str = "id,owner_id,contract_name,summary,parties,total_value,vendor_email,\
     vendor_id,vendor_joined_at,status,created_at,updated_at";
const MILESTONE_COLS: &str =
    "id,position,title,due_date,criteria,status,proof_url,proof_notes,completed_at";

type IdentityRow = (
    String,         // external_id
    String,         // email
    Option<String>, // display_name
    String,         // tier
    String,         // current_role
    i64,            // banned
    Option<String>, // linked_owner_id
    i64,            // created_at
    i64,            // updated_at
);

// Too wide for a tuple row; sqlx maps it by column name instead.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    owner_id: String,
    contract_name: String,
    summary: String,
    parties: String, // JSON array of party names
    total_value: String,
    vendor_email: Option<String>,
    vendor_id: Option<String>,
    vendor_joined_at: Option<i64>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

type MilestoneRow = (
    String,         // id
    i64,            // position
    String,         // title
    Option<String>, // due_date
    String,         // criteria
    String,         // status
    Option<String>, // proof_url
    Option<String>, // proof_notes
    Option<i64>,    // completed_at
);

fn parse_timestamp(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", secs)))
}

fn identity_from_row(row: IdentityRow) -> Result<Identity, StoreError> {
    let (external_id, email, display_name, tier, role, banned, linked, created, updated) = row;
    Ok(Identity {
        external_id: ExternalId(external_id),
        email,
        display_name,
        tier: Tier::from_str(&tier).map_err(StoreError::Backend)?,
        current_role: Role::from_str(&role).map_err(StoreError::Backend)?,
        banned: banned != 0,
        linked_owner_id: linked.map(ExternalId),
        created_at: parse_timestamp(created)?,
        updated_at: parse_timestamp(updated)?,
    })
}

fn milestone_from_row(row: MilestoneRow) -> Result<Milestone, StoreError> {
    let (id, position, title, due_date, criteria, status, proof_url, proof_notes, completed) = row;
    Ok(Milestone {
        id: MilestoneId(Uuid::try_parse(&id).map_err(|e| StoreError::Backend(e.to_string()))?),
        position,
        title,
        due_date: due_date
            .map(|d| NaiveDate::from_str(&d).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()?,
        criteria,
        status: MilestoneStatus::from_str(&status).map_err(StoreError::Backend)?,
        proof_url,
        proof_notes,
        completed_at: completed.map(parse_timestamp).transpose()?,
    })
}

fn project_from_row(row: ProjectRow, milestones: Vec<Milestone>) -> Result<Project, StoreError> {
    Ok(Project {
        id: ProjectId(Uuid::try_parse(&row.id).map_err(|e| StoreError::Backend(e.to_string()))?),
        owner_id: ExternalId(row.owner_id),
        contract_name: row.contract_name,
        summary: row.summary,
        parties: serde_json::from_str(&row.parties)
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        total_value: row.total_value,
        vendor_email: row.vendor_email,
        vendor_id: row.vendor_id.map(ExternalId),
        vendor_joined_at: row.vendor_joined_at.map(parse_timestamp).transpose()?,
        status: ProjectStatus::from_str(&row.status).map_err(StoreError::Backend)?,
        milestones,
        created_at: parse_timestamp(row.created_at)?,
        updated_at: parse_timestamp(row.updated_at)?,
    })
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.covenant/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".covenant");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn fetch_identity(&self, external_id: &str) -> Result<Identity, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM identities WHERE external_id=?",
            IDENTITY_COLS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => identity_from_row(row),
        }
    }

    async fn fetch_milestones(&self, project_id: &str) -> Result<Vec<Milestone>, StoreError> {
        let rows = sqlx::query_as::<_, MilestoneRow>(&format!(
            "SELECT {} FROM milestones WHERE project_id=? ORDER BY position",
            MILESTONE_COLS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(milestone_from_row).collect()
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Identities ─────────────────────────────

    async fn get_or_create_identity(
        &self,
        params: &NewIdentityParams,
    ) -> Result<Identity, StoreError> {
        let now = Utc::now().timestamp();
        // The conditional DO UPDATE only fires for placeholder rows (empty
        // email, created by the billing webhook before first login); a
        // provisioned record is left untouched.
        sqlx::query(
            "INSERT INTO identities(external_id,email,display_name,tier,current_role,banned,created_at,updated_at)
             VALUES(?,?,?,'free','client',0,?,?)
             ON CONFLICT(external_id) DO UPDATE SET
                 email = excluded.email,
                 display_name = COALESCE(excluded.display_name, identities.display_name),
                 updated_at = excluded.updated_at
             WHERE identities.email = ''",
        )
        .bind(params.external_id.as_str())
        .bind(&params.email)
        .bind(&params.display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.fetch_identity(params.external_id.as_str()).await
    }

    async fn get_identity(&self, external_id: &ExternalId) -> Result<Identity, StoreError> {
        self.fetch_identity(external_id.as_str()).await
    }

    async fn set_current_role(
        &self,
        external_id: &ExternalId,
        role: Role,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query("UPDATE identities SET current_role=?, updated_at=? WHERE external_id=?")
            .bind(role.as_str())
            .bind(Utc::now().timestamp())
            .bind(external_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_banned(&self, external_id: &ExternalId, banned: bool) -> Result<(), StoreError> {
        let rows = sqlx::query("UPDATE identities SET banned=?, updated_at=? WHERE external_id=?")
            .bind(banned as i64)
            .bind(Utc::now().timestamp())
            .bind(external_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert_tier(&self, external_id: &ExternalId, tier: Tier) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();
        // Tolerant of the identity not existing yet: a payment event is never
        // lost even if local provisioning lagged the payment gateway.
        sqlx::query(
            "INSERT INTO identities(external_id,email,tier,current_role,banned,created_at,updated_at)
             VALUES(?, '', ?, 'client', 0, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                 tier = excluded.tier,
                 updated_at = excluded.updated_at",
        )
        .bind(external_id.as_str())
        .bind(tier.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn link_owner_if_unset(
        &self,
        member: &ExternalId,
        owner: &ExternalId,
    ) -> Result<bool, StoreError> {
        let rows = sqlx::query(
            "UPDATE identities SET linked_owner_id=?, updated_at=?
              WHERE external_id=? AND linked_owner_id IS NULL",
        )
        .bind(owner.as_str())
        .bind(Utc::now().timestamp())
        .bind(member.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.rows_affected() > 0)
    }

    async fn find_team_owner_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT i.external_id,i.email,i.display_name,i.tier,i.current_role,i.banned,
                    i.linked_owner_id,i.created_at,i.updated_at
               FROM identities i
               JOIN team_members t ON t.owner_external_id = i.external_id
              WHERE lower(t.email) = lower(?)
              ORDER BY t.added_at
              LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(identity_from_row).transpose()
    }

    async fn add_team_member(&self, owner: &ExternalId, email: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO team_members(owner_external_id,email,added_at) VALUES(?,?,?)")
            .bind(owner.as_str())
            .bind(email)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let s = e.to_string();
                if s.contains("UNIQUE") {
                    StoreError::AlreadyExists
                } else {
                    StoreError::Backend(s)
                }
            })?;
        Ok(())
    }

    async fn remove_team_member(&self, owner: &ExternalId, email: &str) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "DELETE FROM team_members WHERE owner_external_id=? AND lower(email)=lower(?)",
        )
        .bind(owner.as_str())
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_team_members(&self, owner: &ExternalId) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT email FROM team_members WHERE owner_external_id=? ORDER BY added_at",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|(e,)| e).collect())
    }

    // ───────────────────────────── Projects ───────────────────────────────

    async fn count_projects_for_owner(&self, owner: &ExternalId) -> Result<i64, StoreError> {
        let (count,) =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM projects WHERE owner_id=?")
                .bind(owner.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(count)
    }

    async fn owns_any_project(&self, owner: &ExternalId) -> Result<bool, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM projects WHERE owner_id=? LIMIT 1")
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn create_project_if_under_quota(
        &self,
        params: &CreateProjectParams,
        limit: i64,
    ) -> Result<Project, StoreError> {
        let project_id = Uuid::now_v7();
        let now = Utc::now().timestamp();
        let parties = serde_json::to_string(&params.parties)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Count and insert in one statement so two concurrent creations at
        // the boundary cannot both slip under the limit.
        let rows = sqlx::query(
            "INSERT INTO projects(id,owner_id,contract_name,summary,parties,total_value,status,created_at,updated_at)
             SELECT ?,?,?,?,?,?,'active',?,?
              WHERE (SELECT COUNT(*) FROM projects WHERE owner_id=?) < ?",
        )
        .bind(project_id.to_string())
        .bind(params.owner_id.as_str())
        .bind(&params.contract_name)
        .bind(&params.summary)
        .bind(&parties)
        .bind(&params.total_value)
        .bind(now)
        .bind(now)
        .bind(params.owner_id.as_str())
        .bind(limit)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(StoreError::LimitReached);
        }

        for (position, draft) in params.milestones.iter().enumerate() {
            sqlx::query(
                "INSERT INTO milestones(id,project_id,position,title,due_date,criteria,status)
                 VALUES(?,?,?,?,?,?,'pending')",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(project_id.to_string())
            .bind(position as i64)
            .bind(&draft.title)
            .bind(draft.due_date.map(|d| d.to_string()))
            .bind(&draft.criteria)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.get_project(&ProjectId(project_id)).await
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<Project, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE id=?",
            PROJECT_COLS
        ))
        .bind(project_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let row = row.ok_or(StoreError::NotFound)?;
        let milestones = self.fetch_milestones(&row.id).await?;
        project_from_row(row, milestones)
    }

    async fn list_projects_by_owner(&self, owner: &ExternalId) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE owner_id=? ORDER BY created_at DESC, id DESC",
            PROJECT_COLS
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let milestones = self.fetch_milestones(&row.id).await?;
            out.push(project_from_row(row, milestones)?);
        }
        Ok(out)
    }

    async fn list_projects_by_vendor_email(
        &self,
        email: &str,
    ) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects
              WHERE vendor_email IS NOT NULL AND lower(vendor_email)=lower(?)
              ORDER BY created_at DESC, id DESC",
            PROJECT_COLS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let milestones = self.fetch_milestones(&row.id).await?;
            out.push(project_from_row(row, milestones)?);
        }
        Ok(out)
    }

    async fn set_vendor_email(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "UPDATE projects SET vendor_email=?, updated_at=?
              WHERE id=? AND vendor_id IS NULL",
        )
        .bind(email)
        .bind(Utc::now().timestamp())
        .bind(project_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if rows.rows_affected() == 0 {
            let exists =
                sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM projects WHERE id=?")
                    .bind(project_id.0.to_string())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            return Err(if exists.0 > 0 {
                StoreError::Conflict
            } else {
                StoreError::NotFound
            });
        }
        Ok(())
    }

    async fn bind_vendor_if_unset(
        &self,
        project_id: &ProjectId,
        vendor: &ExternalId,
        email: &str,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            "UPDATE projects SET vendor_id=?, vendor_joined_at=?, updated_at=?
              WHERE id=? AND vendor_id IS NULL
                AND vendor_email IS NOT NULL AND lower(vendor_email)=lower(?)",
        )
        .bind(vendor.as_str())
        .bind(now)
        .bind(now)
        .bind(project_id.0.to_string())
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.rows_affected() > 0)
    }

    async fn set_project_status(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query("UPDATE projects SET status=?, updated_at=? WHERE id=?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp())
            .bind(project_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_project_for_owner(
        &self,
        project_id: &ProjectId,
        owner: &ExternalId,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows = sqlx::query("DELETE FROM projects WHERE id=? AND owner_id=?")
            .bind(project_id.0.to_string())
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Non-owner and nonexistent look identical on purpose.
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query("DELETE FROM milestones WHERE project_id=?")
            .bind(project_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    // ───────────────────────────── Milestones ─────────────────────────────

    async fn get_milestone(
        &self,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
    ) -> Result<Milestone, StoreError> {
        let row = sqlx::query_as::<_, MilestoneRow>(&format!(
            "SELECT {} FROM milestones WHERE id=? AND project_id=?",
            MILESTONE_COLS
        ))
        .bind(milestone_id.0.to_string())
        .bind(project_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => milestone_from_row(row),
        }
    }

    async fn update_milestone_status(
        &self,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
        expected: MilestoneStatus,
        update: &MilestoneStatusUpdate,
    ) -> Result<Milestone, StoreError> {
        let result = match &update.proof {
            Some(proof) => {
                sqlx::query(
                    "UPDATE milestones SET status=?, proof_url=?, proof_notes=?, completed_at=?
                      WHERE id=? AND project_id=? AND status=?",
                )
                .bind(update.status.as_str())
                .bind(&proof.proof_url)
                .bind(&proof.proof_notes)
                .bind(update.completed_at.map(|t| t.timestamp()))
                .bind(milestone_id.0.to_string())
                .bind(project_id.0.to_string())
                .bind(expected.as_str())
                .execute(&self.pool)
                .await
            }
            // No proof in the update: prior proof fields are retained.
            None => {
                sqlx::query(
                    "UPDATE milestones SET status=?
                      WHERE id=? AND project_id=? AND status=?",
                )
                .bind(update.status.as_str())
                .bind(milestone_id.0.to_string())
                .bind(project_id.0.to_string())
                .bind(expected.as_str())
                .execute(&self.pool)
                .await
            }
        };
        let rows = result.map_err(|e| StoreError::Backend(e.to_string()))?;

        if rows.rows_affected() == 0 {
            let exists = sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM milestones WHERE id=? AND project_id=?",
            )
            .bind(milestone_id.0.to_string())
            .bind(project_id.0.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            return Err(if exists.0 > 0 {
                StoreError::Conflict
            } else {
                StoreError::NotFound
            });
        }

        sqlx::query("UPDATE projects SET updated_at=? WHERE id=?")
            .bind(Utc::now().timestamp())
            .bind(project_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.get_milestone(project_id, milestone_id).await
    }

    async fn count_milestones_not_approved(
        &self,
        project_id: &ProjectId,
    ) -> Result<i64, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM milestones WHERE project_id=? AND status != 'approved'",
        )
        .bind(project_id.0.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_storage::{MilestoneDraft, ProofSubmission};

    fn new_identity(id: &str, email: &str) -> NewIdentityParams {
        NewIdentityParams {
            external_id: ExternalId::from(id),
            email: email.to_string(),
            display_name: None,
        }
    }

    fn project_params(owner: &str, name: &str, milestones: usize) -> CreateProjectParams {
        CreateProjectParams {
            owner_id: ExternalId::from(owner),
            contract_name: name.to_string(),
            summary: "scope of work".to_string(),
            parties: vec!["Acme Corp".to_string(), "Bolt LLC".to_string()],
            total_value: "$12,000".to_string(),
            milestones: (0..milestones)
                .map(|i| MilestoneDraft {
                    title: format!("phase {}", i + 1),
                    due_date: None,
                    criteria: "delivered and accepted".to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_with_defaults() {
        let s = SqliteStore::open_in_memory().await.unwrap();

        let a = s
            .get_or_create_identity(&new_identity("user_a", "a@example.com"))
            .await
            .unwrap();
        assert_eq!(a.tier, Tier::Free);
        assert_eq!(a.current_role, Role::Client);
        assert!(!a.banned);
        assert!(a.linked_owner_id.is_none());

        let again = s
            .get_or_create_identity(&new_identity("user_a", "a@example.com"))
            .await
            .unwrap();
        assert_eq!(again.external_id, a.external_id);
        assert_eq!(again.created_at, a.created_at);
    }

    #[tokio::test]
    async fn get_or_create_fills_webhook_placeholder() {
        let s = SqliteStore::open_in_memory().await.unwrap();

        // Payment event lands before first login.
        s.upsert_tier(&ExternalId::from("user_b"), Tier::Starter)
            .await
            .unwrap();

        let b = s
            .get_or_create_identity(&new_identity("user_b", "b@example.com"))
            .await
            .unwrap();
        assert_eq!(b.email, "b@example.com");
        assert_eq!(b.tier, Tier::Starter); // tier from the webhook survives
    }

    #[tokio::test]
    async fn get_or_create_does_not_clobber_provisioned_email() {
        let s = SqliteStore::open_in_memory().await.unwrap();

        s.get_or_create_identity(&new_identity("user_c", "c@example.com"))
            .await
            .unwrap();
        let c = s
            .get_or_create_identity(&new_identity("user_c", "changed@example.com"))
            .await
            .unwrap();
        assert_eq!(c.email, "c@example.com");
    }

    #[tokio::test]
    async fn upsert_tier_updates_existing_identity() {
        let s = SqliteStore::open_in_memory().await.unwrap();

        s.get_or_create_identity(&new_identity("user_d", "d@example.com"))
            .await
            .unwrap();
        s.upsert_tier(&ExternalId::from("user_d"), Tier::Agency)
            .await
            .unwrap();

        let d = s.get_identity(&ExternalId::from("user_d")).await.unwrap();
        assert_eq!(d.tier, Tier::Agency);
        assert_eq!(d.email, "d@example.com");
    }

    #[tokio::test]
    async fn link_owner_if_unset_single_winner() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.get_or_create_identity(&new_identity("member", "m@example.com"))
            .await
            .unwrap();

        let won = s
            .link_owner_if_unset(&ExternalId::from("member"), &ExternalId::from("owner_1"))
            .await
            .unwrap();
        assert!(won);

        let lost = s
            .link_owner_if_unset(&ExternalId::from("member"), &ExternalId::from("owner_2"))
            .await
            .unwrap();
        assert!(!lost);

        let member = s.get_identity(&ExternalId::from("member")).await.unwrap();
        assert_eq!(member.linked_owner_id, Some(ExternalId::from("owner_1")));
    }

    #[tokio::test]
    async fn team_member_matching_is_case_insensitive() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.get_or_create_identity(&new_identity("owner", "o@example.com"))
            .await
            .unwrap();
        s.add_team_member(&ExternalId::from("owner"), "Member@Example.com")
            .await
            .unwrap();

        let owner = s
            .find_team_owner_by_email("member@example.com")
            .await
            .unwrap()
            .expect("owner should match");
        assert_eq!(owner.external_id, ExternalId::from("owner"));

        // Duplicate differing only in case is rejected.
        let err = s
            .add_team_member(&ExternalId::from("owner"), "MEMBER@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn remove_team_member_and_list_order() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let owner = ExternalId::from("owner");
        s.add_team_member(&owner, "first@example.com").await.unwrap();
        s.add_team_member(&owner, "second@example.com").await.unwrap();

        assert_eq!(
            s.list_team_members(&owner).await.unwrap(),
            vec!["first@example.com", "second@example.com"]
        );

        s.remove_team_member(&owner, "FIRST@example.com").await.unwrap();
        assert_eq!(
            s.list_team_members(&owner).await.unwrap(),
            vec!["second@example.com"]
        );

        let err = s
            .remove_team_member(&owner, "first@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn quota_boundary_is_atomic() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let owner = ExternalId::from("owner");

        s.create_project_if_under_quota(&project_params("owner", "c1", 2), 2)
            .await
            .unwrap();
        s.create_project_if_under_quota(&project_params("owner", "c2", 0), 2)
            .await
            .unwrap();

        let err = s
            .create_project_if_under_quota(&project_params("owner", "c3", 1), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LimitReached));

        // Nothing partially persisted.
        assert_eq!(s.count_projects_for_owner(&owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn created_project_has_pending_milestones_in_order() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 3), 10)
            .await
            .unwrap();

        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.milestones.len(), 3);
        assert_eq!(project.milestones[0].title, "phase 1");
        assert_eq!(project.milestones[2].title, "phase 3");
        assert!(project
            .milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Pending));
    }

    #[tokio::test]
    async fn vendor_bind_requires_email_match_and_never_rebinds() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 0), 10)
            .await
            .unwrap();

        // No invite yet: nothing to bind against.
        assert!(!s
            .bind_vendor_if_unset(&project.id, &ExternalId::from("v1"), "v@example.com")
            .await
            .unwrap());

        s.set_vendor_email(&project.id, "v@example.com").await.unwrap();

        assert!(!s
            .bind_vendor_if_unset(&project.id, &ExternalId::from("v1"), "other@example.com")
            .await
            .unwrap());
        assert!(s
            .bind_vendor_if_unset(&project.id, &ExternalId::from("v1"), "V@EXAMPLE.COM")
            .await
            .unwrap());

        // Second open does not rebind, even for a different identity.
        assert!(!s
            .bind_vendor_if_unset(&project.id, &ExternalId::from("v2"), "v@example.com")
            .await
            .unwrap());

        let stored = s.get_project(&project.id).await.unwrap();
        assert_eq!(stored.vendor_id, Some(ExternalId::from("v1")));
        assert!(stored.vendor_joined_at.is_some());
    }

    #[tokio::test]
    async fn set_vendor_email_conflicts_after_join() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 0), 10)
            .await
            .unwrap();

        s.set_vendor_email(&project.id, "v@example.com").await.unwrap();
        // Re-invite before anyone joined is fine.
        s.set_vendor_email(&project.id, "w@example.com").await.unwrap();

        s.bind_vendor_if_unset(&project.id, &ExternalId::from("v1"), "w@example.com")
            .await
            .unwrap();

        let err = s
            .set_vendor_email(&project.id, "x@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn milestone_update_is_conditional_on_pre_state() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 1), 10)
            .await
            .unwrap();
        let milestone = project.milestones[0].clone();

        let submitted = s
            .update_milestone_status(
                &project.id,
                &milestone.id,
                MilestoneStatus::Pending,
                &MilestoneStatusUpdate {
                    status: MilestoneStatus::InReview,
                    proof: Some(ProofSubmission {
                        proof_url: "https://proof.example/1".to_string(),
                        proof_notes: Some("done".to_string()),
                    }),
                    completed_at: Some(Utc::now()),
                },
            )
            .await
            .unwrap();
        assert_eq!(submitted.status, MilestoneStatus::InReview);
        assert_eq!(submitted.proof_url.as_deref(), Some("https://proof.example/1"));
        assert!(submitted.completed_at.is_some());

        // Stale writer expecting the old state loses with Conflict.
        let err = s
            .update_milestone_status(
                &project.id,
                &milestone.id,
                MilestoneStatus::Pending,
                &MilestoneStatusUpdate {
                    status: MilestoneStatus::InReview,
                    proof: None,
                    completed_at: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn rejection_retains_proof_fields() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 1), 10)
            .await
            .unwrap();
        let milestone = project.milestones[0].clone();

        s.update_milestone_status(
            &project.id,
            &milestone.id,
            MilestoneStatus::Pending,
            &MilestoneStatusUpdate {
                status: MilestoneStatus::InReview,
                proof: Some(ProofSubmission {
                    proof_url: "https://proof.example/1".to_string(),
                    proof_notes: None,
                }),
                completed_at: Some(Utc::now()),
            },
        )
        .await
        .unwrap();

        let rejected = s
            .update_milestone_status(
                &project.id,
                &milestone.id,
                MilestoneStatus::InReview,
                &MilestoneStatusUpdate {
                    status: MilestoneStatus::Pending,
                    proof: None,
                    completed_at: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, MilestoneStatus::Pending);
        assert_eq!(rejected.proof_url.as_deref(), Some("https://proof.example/1"));
        assert!(rejected.completed_at.is_some());
    }

    #[tokio::test]
    async fn milestone_lookup_is_scoped_by_project() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let p1 = s
            .create_project_if_under_quota(&project_params("owner", "c1", 1), 10)
            .await
            .unwrap();
        let p2 = s
            .create_project_if_under_quota(&project_params("owner", "c2", 1), 10)
            .await
            .unwrap();

        let err = s
            .get_milestone(&p2.id, &p1.milestones[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_is_owner_scoped_and_removes_milestones() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 2), 10)
            .await
            .unwrap();

        let err = s
            .delete_project_for_owner(&project.id, &ExternalId::from("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(s.get_project(&project.id).await.is_ok());

        s.delete_project_for_owner(&project.id, &ExternalId::from("owner"))
            .await
            .unwrap();
        assert!(matches!(
            s.get_project(&project.id).await.unwrap_err(),
            StoreError::NotFound
        ));
        assert_eq!(
            s.count_milestones_not_approved(&project.id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn vendor_email_listing_is_case_insensitive() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 0), 10)
            .await
            .unwrap();
        s.set_vendor_email(&project.id, "Vendor@Example.com")
            .await
            .unwrap();

        let found = s
            .list_projects_by_vendor_email("vendor@example.com")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, project.id);
    }

    #[tokio::test]
    async fn parties_roundtrip_in_order() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let project = s
            .create_project_if_under_quota(&project_params("owner", "c1", 0), 10)
            .await
            .unwrap();
        assert_eq!(project.parties, vec!["Acme Corp", "Bolt LLC"]);
    }
}
