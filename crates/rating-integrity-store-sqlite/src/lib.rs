#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rating_integrity_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, ClaimRecord, ClaimRecordStatus, ClaimState,
    ClaimStatus, EntityStore, Group, Member, MemberStatus, Metric, ObjectType, RatableObject,
    Rating, RatingMode, RatingTargetPatch, RecordFilter, RecordId, StoreError, TypedSnapshot,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const SCHEMA_MIGRATION_VERSION: i64 = 1;
const IMPORT_CONTRACT_VERSION: &str = "import.v1";

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS groups (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  captain_user_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS objects (
  id TEXT PRIMARY KEY,
  group_id TEXT NOT NULL,
  name TEXT NOT NULL,
  description TEXT,
  image_url TEXT,
  object_type TEXT NOT NULL CHECK (object_type IN ('text', 'link', 'user')),
  category TEXT,
  disabled_metric_ids_json TEXT NOT NULL DEFAULT '[]',
  enabled_metric_ids_json TEXT NOT NULL DEFAULT '[]',
  rating_mode TEXT NOT NULL CHECK (rating_mode IN ('captain_only', 'group_average')),
  claim_status TEXT CHECK (
    claim_status IN ('unclaimed', 'pending', 'claimed') OR claim_status IS NULL
  ),
  claimed_by_user_id TEXT,
  claimed_by_name TEXT,
  claimed_by_image TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
  id TEXT PRIMARY KEY,
  group_id TEXT NOT NULL,
  user_id TEXT,
  name TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('active', 'placeholder', 'removed')),
  description TEXT,
  placeholder_image_url TEXT,
  image_url TEXT,
  object_category TEXT,
  member_category TEXT,
  object_type TEXT CHECK (object_type IN ('text', 'link', 'user') OR object_type IS NULL),
  disabled_metric_ids_json TEXT NOT NULL DEFAULT '[]',
  enabled_metric_ids_json TEXT NOT NULL DEFAULT '[]',
  rating_mode TEXT CHECK (
    rating_mode IN ('captain_only', 'group_average') OR rating_mode IS NULL
  ),
  claimed_by_user_id TEXT,
  claimed_by_name TEXT,
  claimed_by_image TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ratings (
  id TEXT PRIMARY KEY,
  group_id TEXT NOT NULL,
  metric_id TEXT NOT NULL,
  rater_user_id TEXT NOT NULL,
  target_object_id TEXT,
  target_member_id TEXT,
  value REAL NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metrics (
  id TEXT PRIMARY KEY,
  group_id TEXT NOT NULL,
  name TEXT NOT NULL,
  min_value REAL NOT NULL,
  max_value REAL NOT NULL,
  prefix TEXT,
  suffix TEXT,
  applicable_categories_json TEXT NOT NULL DEFAULT '[]',
  CHECK (min_value <= max_value)
);

CREATE TABLE IF NOT EXISTS claims (
  id TEXT PRIMARY KEY,
  group_id TEXT NOT NULL,
  object_id TEXT NOT NULL,
  token TEXT NOT NULL UNIQUE,
  status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
  claimant_user_id TEXT,
  claimant_name TEXT,
  claimant_image TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_objects_group ON objects(group_id, id);
CREATE INDEX IF NOT EXISTS idx_members_group_status ON members(group_id, status, id);
CREATE INDEX IF NOT EXISTS idx_ratings_group ON ratings(group_id, id);
CREATE INDEX IF NOT EXISTS idx_metrics_group ON metrics(group_id, id);
CREATE INDEX IF NOT EXISTS idx_claims_group ON claims(group_id, id);
";

/// `SQLite`-backed record sets. Rating targets carry no foreign keys so
/// orphaned references stay representable.
pub struct SqliteEntityStore {
    conn: Connection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportReport {
    pub contract_version: String,
    pub groups: usize,
    pub objects: usize,
    pub members: usize,
    pub ratings: usize,
    pub metrics: usize,
    pub claims: usize,
}

impl SqliteEntityStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_V1)
            .context("failed to apply rating integrity schema")?;

        let applied = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_MIGRATION_VERSION, timestamp(now_utc())?],
            )
            .context("failed to register schema migration")?;

        if applied > 0 {
            tracing::debug!(version = SCHEMA_MIGRATION_VERSION, "applied schema migration");
        }

        Ok(())
    }

    pub fn group(&self, group_id: &RecordId) -> Result<Option<Group>> {
        self.conn
            .query_row(
                "SELECT id, name, captain_user_id FROM groups WHERE id = ?1",
                params![group_id.as_str()],
                |row| {
                    Ok(Group {
                        id: RecordId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        captain_user_id: RecordId::new(row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to load group {group_id}"))
    }

    pub fn list_objects(&self, filter: &RecordFilter) -> Result<Vec<RatableObject>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, group_id, name, description, image_url, object_type, category,
                disabled_metric_ids_json, enabled_metric_ids_json, rating_mode,
                claim_status, claimed_by_user_id, claimed_by_name, claimed_by_image, created_at
             FROM objects
             WHERE ?1 IS NULL OR group_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![filter_param(filter)], parse_object_row)?;
        collect_rows(rows).context("failed to list objects")
    }

    pub fn list_members(&self, filter: &RecordFilter) -> Result<Vec<Member>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, group_id, user_id, name, status, description, placeholder_image_url,
                image_url, object_category, member_category, object_type,
                disabled_metric_ids_json, enabled_metric_ids_json, rating_mode,
                claimed_by_user_id, claimed_by_name, claimed_by_image, created_at
             FROM members
             WHERE ?1 IS NULL OR group_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![filter_param(filter)], parse_member_row)?;
        collect_rows(rows).context("failed to list members")
    }

    pub fn list_ratings(&self, filter: &RecordFilter) -> Result<Vec<Rating>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, group_id, metric_id, rater_user_id, target_object_id, target_member_id,
                value, updated_at
             FROM ratings
             WHERE ?1 IS NULL OR group_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![filter_param(filter)], parse_rating_row)?;
        collect_rows(rows).context("failed to list ratings")
    }

    pub fn list_metrics(&self, filter: &RecordFilter) -> Result<Vec<Metric>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, group_id, name, min_value, max_value, prefix, suffix,
                applicable_categories_json
             FROM metrics
             WHERE ?1 IS NULL OR group_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![filter_param(filter)], parse_metric_row)?;
        collect_rows(rows).context("failed to list metrics")
    }

    pub fn list_claims(&self, filter: &RecordFilter) -> Result<Vec<ClaimRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, group_id, object_id, token, status, claimant_user_id, claimant_name,
                claimant_image, created_at
             FROM claims
             WHERE ?1 IS NULL OR group_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![filter_param(filter)], parse_claim_row)?;
        collect_rows(rows).context("failed to list claims")
    }

    pub fn put_group(&self, group: &Group) -> Result<()> {
        insert_group(&self.conn, group)
    }

    pub fn put_object(&self, object: &RatableObject) -> Result<()> {
        insert_object(&self.conn, object)
    }

    pub fn put_member(&self, member: &Member) -> Result<()> {
        insert_member(&self.conn, member)
    }

    pub fn put_rating(&self, rating: &Rating) -> Result<()> {
        insert_rating(&self.conn, rating)
    }

    pub fn put_metric(&self, metric: &Metric) -> Result<()> {
        insert_metric(&self.conn, metric)
    }

    pub fn put_claim(&self, claim: &ClaimRecord) -> Result<()> {
        insert_claim(&self.conn, claim)
    }

    /// Rewrites a rating's target. The legacy alias is only touched when the
    /// patch carries one.
    pub fn set_rating_target(&self, rating_id: &RecordId, patch: &RatingTargetPatch) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE ratings
                 SET target_object_id = ?2,
                     target_member_id = COALESCE(?3, target_member_id)
                 WHERE id = ?1",
                params![
                    rating_id.as_str(),
                    patch.target_object_id.as_str(),
                    patch.target_member_id.as_ref().map(RecordId::as_str),
                ],
            )
            .with_context(|| format!("failed to update target of rating {rating_id}"))?;

        if changed == 0 {
            return Err(anyhow!("rating {rating_id} not found"));
        }
        Ok(())
    }

    /// Loads a decoded snapshot in one transaction. Existing records with the
    /// same identity are replaced.
    pub fn import_snapshot(&mut self, snapshot: &TypedSnapshot) -> Result<ImportReport> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start import transaction")?;

        for group in &snapshot.groups {
            insert_group(&tx, group)?;
        }
        for object in &snapshot.objects {
            insert_object(&tx, object)?;
        }
        for member in &snapshot.members {
            insert_member(&tx, member)?;
        }
        for metric in &snapshot.metrics {
            insert_metric(&tx, metric)?;
        }
        for rating in &snapshot.ratings {
            insert_rating(&tx, rating)?;
        }
        for claim in &snapshot.claims {
            insert_claim(&tx, claim)?;
        }

        tx.commit().context("failed to commit import transaction")?;

        let report = ImportReport {
            contract_version: IMPORT_CONTRACT_VERSION.to_string(),
            groups: snapshot.groups.len(),
            objects: snapshot.objects.len(),
            members: snapshot.members.len(),
            ratings: snapshot.ratings.len(),
            metrics: snapshot.metrics.len(),
            claims: snapshot.claims.len(),
        };
        tracing::info!(
            objects = report.objects,
            members = report.members,
            ratings = report.ratings,
            "snapshot imported"
        );
        Ok(report)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl EntityStore for SqliteEntityStore {
    fn fetch_group(&self, group_id: &RecordId) -> Result<Option<Group>, StoreError> {
        self.group(group_id)
            .map_err(|err| store_error("fetch_group", &err))
    }

    fn fetch_objects(&self, filter: &RecordFilter) -> Result<Vec<RatableObject>, StoreError> {
        self.list_objects(filter)
            .map_err(|err| store_error("fetch_objects", &err))
    }

    fn fetch_members(&self, filter: &RecordFilter) -> Result<Vec<Member>, StoreError> {
        self.list_members(filter)
            .map_err(|err| store_error("fetch_members", &err))
    }

    fn fetch_ratings(&self, filter: &RecordFilter) -> Result<Vec<Rating>, StoreError> {
        self.list_ratings(filter)
            .map_err(|err| store_error("fetch_ratings", &err))
    }

    fn fetch_metrics(&self, filter: &RecordFilter) -> Result<Vec<Metric>, StoreError> {
        self.list_metrics(filter)
            .map_err(|err| store_error("fetch_metrics", &err))
    }

    fn fetch_claims(&self, filter: &RecordFilter) -> Result<Vec<ClaimRecord>, StoreError> {
        self.list_claims(filter)
            .map_err(|err| store_error("fetch_claims", &err))
    }

    fn upsert_object(&mut self, object: &RatableObject) -> Result<(), StoreError> {
        self.put_object(object)
            .map_err(|err| store_error("upsert_object", &err))
    }

    fn patch_rating_target(
        &mut self,
        rating_id: &RecordId,
        patch: &RatingTargetPatch,
    ) -> Result<(), StoreError> {
        self.set_rating_target(rating_id, patch)
            .map_err(|err| store_error("patch_rating_target", &err))
    }

    fn upsert_claim(&mut self, claim: &ClaimRecord) -> Result<(), StoreError> {
        self.put_claim(claim)
            .map_err(|err| store_error("upsert_claim", &err))
    }
}

fn store_error(operation: &str, err: &anyhow::Error) -> StoreError {
    StoreError::new(operation, format!("{err:#}"))
}

fn filter_param(filter: &RecordFilter) -> Option<&str> {
    filter.group_id.as_ref().map(RecordId::as_str)
}

fn insert_group(conn: &Connection, group: &Group) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO groups(id, name, captain_user_id) VALUES (?1, ?2, ?3)",
        params![
            group.id.as_str(),
            group.name,
            group.captain_user_id.as_str()
        ],
    )
    .with_context(|| format!("failed to write group {}", group.id))?;
    Ok(())
}

fn insert_object(conn: &Connection, object: &RatableObject) -> Result<()> {
    let claim = object.claim.as_ref();
    conn.execute(
        "INSERT OR REPLACE INTO objects(
            id, group_id, name, description, image_url, object_type, category,
            disabled_metric_ids_json, enabled_metric_ids_json, rating_mode,
            claim_status, claimed_by_user_id, claimed_by_name, claimed_by_image, created_at
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15
         )",
        params![
            object.id.as_str(),
            object.group_id.as_str(),
            object.name,
            object.description,
            object.image_url,
            object.object_type.as_str(),
            object.category,
            id_list_json(&object.disabled_metric_ids)?,
            id_list_json(&object.enabled_metric_ids)?,
            object.rating_mode.as_str(),
            claim.map(|state| state.status.as_str()),
            claim
                .and_then(|state| state.claimed_by_user_id.as_ref())
                .map(RecordId::as_str),
            claim.and_then(|state| state.claimed_by_name.as_deref()),
            claim.and_then(|state| state.claimed_by_image.as_deref()),
            timestamp(object.created_at)?,
        ],
    )
    .with_context(|| format!("failed to write object {}", object.id))?;
    Ok(())
}

fn insert_member(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO members(
            id, group_id, user_id, name, status, description, placeholder_image_url,
            image_url, object_category, member_category, object_type,
            disabled_metric_ids_json, enabled_metric_ids_json, rating_mode,
            claimed_by_user_id, claimed_by_name, claimed_by_image, created_at
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17, ?18
         )",
        params![
            member.id.as_str(),
            member.group_id.as_str(),
            member.user_id.as_ref().map(RecordId::as_str),
            member.name,
            member.status.as_str(),
            member.description,
            member.placeholder_image_url,
            member.image_url,
            member.object_category,
            member.member_category,
            member.object_type.map(ObjectType::as_str),
            id_list_json(&member.disabled_metric_ids)?,
            id_list_json(&member.enabled_metric_ids)?,
            member.rating_mode.map(RatingMode::as_str),
            member.claimed_by_user_id.as_ref().map(RecordId::as_str),
            member.claimed_by_name,
            member.claimed_by_image,
            timestamp(member.created_at)?,
        ],
    )
    .with_context(|| format!("failed to write member {}", member.id))?;
    Ok(())
}

fn insert_rating(conn: &Connection, rating: &Rating) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ratings(
            id, group_id, metric_id, rater_user_id, target_object_id, target_member_id,
            value, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            rating.id.as_str(),
            rating.group_id.as_str(),
            rating.metric_id.as_str(),
            rating.rater_user_id.as_str(),
            rating.target_object_id.as_ref().map(RecordId::as_str),
            rating.target_member_id.as_ref().map(RecordId::as_str),
            rating.value,
            timestamp(rating.updated_at)?,
        ],
    )
    .with_context(|| format!("failed to write rating {}", rating.id))?;
    Ok(())
}

fn insert_metric(conn: &Connection, metric: &Metric) -> Result<()> {
    metric
        .validate()
        .map_err(|err| anyhow!("invalid metric {}: {err}", metric.id))?;

    conn.execute(
        "INSERT OR REPLACE INTO metrics(
            id, group_id, name, min_value, max_value, prefix, suffix,
            applicable_categories_json
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            metric.id.as_str(),
            metric.group_id.as_str(),
            metric.name,
            metric.min_value,
            metric.max_value,
            metric.prefix,
            metric.suffix,
            serde_json::to_string(&metric.applicable_categories)
                .context("failed to serialize applicable_categories")?,
        ],
    )
    .with_context(|| format!("failed to write metric {}", metric.id))?;
    Ok(())
}

fn insert_claim(conn: &Connection, claim: &ClaimRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO claims(
            id, group_id, object_id, token, status, claimant_user_id, claimant_name,
            claimant_image, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            claim.id.as_str(),
            claim.group_id.as_str(),
            claim.object_id.as_str(),
            claim.token,
            claim.status.as_str(),
            claim.claimant_user_id.as_ref().map(RecordId::as_str),
            claim.claimant_name,
            claim.claimant_image,
            timestamp(claim.created_at)?,
        ],
    )
    .with_context(|| format!("failed to write claim {}", claim.id))?;
    Ok(())
}

fn parse_object_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RatableObject> {
    let object_type_raw: String = row.get(5)?;
    let rating_mode_raw: String = row.get(9)?;
    let claim_status_raw: Option<String> = row.get(10)?;

    let claim = match claim_status_raw.as_deref() {
        Some(raw) => Some(ClaimState {
            status: parse_enum(10, "claim_status", raw, ClaimStatus::parse)?,
            claimed_by_user_id: optional_id(row.get(11)?),
            claimed_by_name: row.get(12)?,
            claimed_by_image: row.get(13)?,
        }),
        None => None,
    };

    Ok(RatableObject {
        id: RecordId::new(row.get::<_, String>(0)?),
        group_id: RecordId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        object_type: parse_enum(5, "object_type", &object_type_raw, ObjectType::parse)?,
        category: row.get(6)?,
        disabled_metric_ids: parse_id_list(7, &row.get::<_, String>(7)?)?,
        enabled_metric_ids: parse_id_list(8, &row.get::<_, String>(8)?)?,
        rating_mode: parse_enum(9, "rating_mode", &rating_mode_raw, RatingMode::parse)?,
        claim,
        created_at: parse_timestamp(14, &row.get::<_, String>(14)?)?,
    })
}

fn parse_member_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Member> {
    let status_raw: String = row.get(4)?;
    let object_type_raw: Option<String> = row.get(10)?;
    let rating_mode_raw: Option<String> = row.get(13)?;

    Ok(Member {
        id: RecordId::new(row.get::<_, String>(0)?),
        group_id: RecordId::new(row.get::<_, String>(1)?),
        user_id: optional_id(row.get(2)?),
        name: row.get(3)?,
        status: parse_enum(4, "status", &status_raw, MemberStatus::parse)?,
        description: row.get(5)?,
        placeholder_image_url: row.get(6)?,
        image_url: row.get(7)?,
        object_category: row.get(8)?,
        member_category: row.get(9)?,
        object_type: object_type_raw
            .as_deref()
            .map(|raw| parse_enum(10, "object_type", raw, ObjectType::parse))
            .transpose()?,
        disabled_metric_ids: parse_id_list(11, &row.get::<_, String>(11)?)?,
        enabled_metric_ids: parse_id_list(12, &row.get::<_, String>(12)?)?,
        rating_mode: rating_mode_raw
            .as_deref()
            .map(|raw| parse_enum(13, "rating_mode", raw, RatingMode::parse))
            .transpose()?,
        claimed_by_user_id: optional_id(row.get(14)?),
        claimed_by_name: row.get(15)?,
        claimed_by_image: row.get(16)?,
        created_at: parse_timestamp(17, &row.get::<_, String>(17)?)?,
    })
}

fn parse_rating_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: RecordId::new(row.get::<_, String>(0)?),
        group_id: RecordId::new(row.get::<_, String>(1)?),
        metric_id: RecordId::new(row.get::<_, String>(2)?),
        rater_user_id: RecordId::new(row.get::<_, String>(3)?),
        target_object_id: optional_id(row.get(4)?),
        target_member_id: optional_id(row.get(5)?),
        value: row.get(6)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

fn parse_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Metric> {
    let categories_raw: String = row.get(7)?;
    let applicable_categories: Vec<String> = serde_json::from_str(&categories_raw)
        .map_err(|err| invalid_data(7, rusqlite::types::Type::Text, err.to_string()))?;

    Ok(Metric {
        id: RecordId::new(row.get::<_, String>(0)?),
        group_id: RecordId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        min_value: row.get(3)?,
        max_value: row.get(4)?,
        prefix: row.get(5)?,
        suffix: row.get(6)?,
        applicable_categories,
    })
}

fn parse_claim_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClaimRecord> {
    let status_raw: String = row.get(4)?;

    Ok(ClaimRecord {
        id: RecordId::new(row.get::<_, String>(0)?),
        group_id: RecordId::new(row.get::<_, String>(1)?),
        object_id: RecordId::new(row.get::<_, String>(2)?),
        token: row.get(3)?,
        status: parse_enum(4, "status", &status_raw, ClaimRecordStatus::parse)?,
        claimant_user_id: optional_id(row.get(5)?),
        claimant_name: row.get(6)?,
        claimant_image: row.get(7)?,
        created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
    })
}

fn parse_enum<T>(
    index: usize,
    column: &str,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        invalid_data(
            index,
            rusqlite::types::Type::Text,
            format!("invalid {column}: {raw}"),
        )
    })
}

fn parse_id_list(index: usize, raw: &str) -> rusqlite::Result<Vec<RecordId>> {
    serde_json::from_str(raw)
        .map_err(|err| invalid_data(index, rusqlite::types::Type::Text, err.to_string()))
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<OffsetDateTime> {
    parse_rfc3339_utc(raw)
        .map_err(|err| invalid_data(index, rusqlite::types::Type::Text, err.to_string()))
}

fn optional_id(raw: Option<String>) -> Option<RecordId> {
    raw.map(RecordId::new)
}

fn id_list_json(ids: &[RecordId]) -> Result<String> {
    serde_json::to_string(ids).context("failed to serialize metric id list")
}

fn timestamp(value: OffsetDateTime) -> Result<String> {
    format_rfc3339(value).map_err(|err| anyhow!(err.to_string()))
}

fn invalid_data(index: usize, kind: rusqlite::types::Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        kind,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
