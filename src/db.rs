use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;

use crate::page::{self, Page};

// ============================================================================
// RECORDS
// ============================================================================

/// Mini-program user, keyed by the WeChat openid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub openid: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One naming request and what came back
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub openid: Option<String>,
    /// Request parameters plus the bazi projection
    pub params: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// History row as listed: time rendered relative to "now"
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub params: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
    Naming,
    Analysis,
}

impl FavoriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FavoriteKind::Naming => "naming",
            FavoriteKind::Analysis => "analysis",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "naming" => Some(FavoriteKind::Naming),
            "analysis" => Some(FavoriteKind::Analysis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            openid TEXT UNIQUE NOT NULL,
            nickname TEXT,
            avatar_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS naming_history (
            id TEXT PRIMARY KEY,
            openid TEXT,
            params TEXT NOT NULL,
            result TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- identifier_hash = sha256(user, type, fullName): one favorite per name
        CREATE TABLE IF NOT EXISTS favorites (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            type TEXT NOT NULL,
            content TEXT NOT NULL,
            identifier_hash TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_openid ON naming_history(openid, created_at);
        CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id, type, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

// Fixed-width timestamps so TEXT ordering equals time ordering
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// LIMIT/OFFSET binding; out-of-range pages simply come back empty
fn sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn parse_json(idx: usize, text: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_time(event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Best-effort audit write next to a main write: failures are logged, not raised
pub fn record_event(conn: &Connection, event: &Event) -> bool {
    match insert_event(conn, event) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %format!("{:#}", e),
                event_type = %event.event_type,
                entity_id = %event.entity_id,
                "failed to record audit event"
            );
            false
        }
    }
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_time(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: parse_json(5, &data_json)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// USERS
// ============================================================================

const USER_COLUMNS: &str = "id, openid, nickname, avatar_url, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        openid: row.get(1)?,
        nickname: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: parse_time(4, &created_at)?,
        updated_at: parse_time(5, &updated_at)?,
    })
}

pub fn get_user(conn: &Connection, openid: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE openid = ?1", USER_COLUMNS),
            [openid],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_or_create_user(conn: &Connection, openid: &str) -> Result<User> {
    if let Some(user) = get_user(conn, openid)? {
        return Ok(user);
    }

    let now = Utc::now();
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, openid, nickname, avatar_url, created_at, updated_at)
         VALUES (?1, ?2, NULL, NULL, ?3, ?3)",
        params![id, openid, format_time(now)],
    )
    .context("Failed to create user")?;

    record_event(
        conn,
        &Event::new("user_created", "user", &id, serde_json::json!({ "openid": openid }), "auth"),
    );

    get_user(conn, openid)?.context("User vanished right after insert")
}

/// `None` fields are left untouched; returns `None` for an unknown openid
pub fn update_user(
    conn: &Connection,
    openid: &str,
    nickname: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<Option<User>> {
    let changed = conn.execute(
        "UPDATE users
         SET nickname = COALESCE(?2, nickname),
             avatar_url = COALESCE(?3, avatar_url),
             updated_at = ?4
         WHERE openid = ?1",
        params![openid, nickname, avatar_url, format_time(Utc::now())],
    )?;

    if changed == 0 {
        return Ok(None);
    }
    get_user(conn, openid)
}

// ============================================================================
// NAMING HISTORY
// ============================================================================

pub fn insert_history(
    conn: &Connection,
    openid: Option<&str>,
    params: &serde_json::Value,
    result: &serde_json::Value,
) -> Result<String> {
    insert_history_at(conn, openid, params, result, Utc::now())
}

pub(crate) fn insert_history_at(
    conn: &Connection,
    openid: Option<&str>,
    params: &serde_json::Value,
    result: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO naming_history (id, openid, params, result, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            openid,
            serde_json::to_string(params)?,
            serde_json::to_string(result)?,
            format_time(created_at),
        ],
    )?;

    record_event(
        conn,
        &Event::new(
            "history_saved",
            "naming_history",
            &id,
            serde_json::json!({ "openid": openid }),
            "naming_expert",
        ),
    );

    Ok(id)
}

fn history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let params_json: String = row.get(2)?;
    let result_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        openid: row.get(1)?,
        params: parse_json(2, &params_json)?,
        result: parse_json(3, &result_json)?,
        created_at: parse_time(4, &created_at)?,
    })
}

pub fn list_history(
    conn: &Connection,
    openid: &str,
    page_no: usize,
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<Page<HistoryEntry>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM naming_history WHERE openid = ?1",
        [openid],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, openid, params, result, created_at
         FROM naming_history
         WHERE openid = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3",
    )?;

    let records = stmt
        .query_map(
            params![openid, sql_int(page_size), sql_int(page::offset(page_no, page_size))],
            history_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(records, total as usize, page_no, page_size).map(|r| HistoryEntry {
        created_at: format_relative_time(r.created_at, now),
        id: r.id,
        params: r.params,
        result: r.result,
    }))
}

pub fn get_history(conn: &Connection, openid: &str, id: &str) -> Result<Option<HistoryRecord>> {
    let record = conn
        .query_row(
            "SELECT id, openid, params, result, created_at
             FROM naming_history WHERE id = ?1 AND openid = ?2",
            params![id, openid],
            history_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Returns whether a record was removed
pub fn delete_history(conn: &Connection, openid: &str, id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM naming_history WHERE id = ?1 AND openid = ?2",
        params![id, openid],
    )?;
    Ok(removed > 0)
}

/// 刚刚 / N分钟前 / N小时前 / N天前, then M月D日
pub fn format_relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - time).num_seconds();

    if seconds < 60 {
        "刚刚".to_string()
    } else if seconds < 3_600 {
        format!("{}分钟前", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}小时前", seconds / 3_600)
    } else if seconds < 604_800 {
        format!("{}天前", seconds / 86_400)
    } else {
        format!("{}月{}日", time.month(), time.day())
    }
}

// ============================================================================
// FAVORITES
// ============================================================================

/// Content identity: the name when present, the whole payload otherwise
pub fn favorite_identifier(user_id: &str, kind: FavoriteKind, content: &serde_json::Value) -> String {
    let key = match content.get("fullName").and_then(|v| v.as_str()) {
        Some(name) => name.to_string(),
        None => content.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", user_id, kind.as_str(), key));
    format!("{:x}", hasher.finalize())
}

fn favorite_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Favorite> {
    let kind: String = row.get(2)?;
    let content: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: FavoriteKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, format!("unknown favorite type {:?}", kind).into())
        })?,
        content: parse_json(3, &content)?,
        created_at: parse_time(4, &created_at)?,
    })
}

fn get_favorite_by_hash(conn: &Connection, hash: &str) -> Result<Option<Favorite>> {
    let favorite = conn
        .query_row(
            "SELECT id, user_id, type, content, created_at FROM favorites WHERE identifier_hash = ?1",
            [hash],
            favorite_from_row,
        )
        .optional()?;
    Ok(favorite)
}

/// Adding the same name twice returns the existing favorite
pub fn add_favorite(
    conn: &Connection,
    user_id: &str,
    kind: FavoriteKind,
    content: &serde_json::Value,
) -> Result<Favorite> {
    let hash = favorite_identifier(user_id, kind, content);
    let id = uuid::Uuid::new_v4().to_string();

    let result = conn.execute(
        "INSERT INTO favorites (id, user_id, type, content, identifier_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            user_id,
            kind.as_str(),
            serde_json::to_string(content)?,
            hash,
            format_time(Utc::now()),
        ],
    );

    match result {
        Ok(_) => {
            record_event(
                conn,
                &Event::new("favorite_added", "favorite", &id, content.clone(), user_id),
            );
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // Already favorited
        }
        Err(e) => return Err(e.into()),
    }

    get_favorite_by_hash(conn, &hash)?.context("Favorite not found after insert")
}

/// Returns whether a favorite was removed
pub fn remove_favorite(conn: &Connection, user_id: &str, favorite_id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM favorites WHERE id = ?1 AND user_id = ?2",
        params![favorite_id, user_id],
    )?;

    if removed > 0 {
        record_event(
            conn,
            &Event::new("favorite_removed", "favorite", favorite_id, serde_json::json!({}), user_id),
        );
    }
    Ok(removed > 0)
}

pub fn list_favorites(
    conn: &Connection,
    user_id: &str,
    kind: Option<FavoriteKind>,
    page_no: usize,
    page_size: usize,
) -> Result<Page<Favorite>> {
    let kind_str = kind.map(|k| k.as_str());

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND (?2 IS NULL OR type = ?2)",
        params![user_id, kind_str],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, user_id, type, content, created_at
         FROM favorites
         WHERE user_id = ?1 AND (?2 IS NULL OR type = ?2)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4",
    )?;

    let records = stmt
        .query_map(
            params![user_id, kind_str, sql_int(page_size), sql_int(page::offset(page_no, page_size))],
            favorite_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(records, total as usize, page_no, page_size))
}

/// Favorite id for this name, if it has been favorited
pub fn check_favorite(
    conn: &Connection,
    user_id: &str,
    kind: FavoriteKind,
    full_name: &str,
) -> Result<Option<String>> {
    let hash = favorite_identifier(user_id, kind, &serde_json::json!({ "fullName": full_name }));
    Ok(get_favorite_by_hash(conn, &hash)?.map(|f| f.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_find_or_create_user_is_stable() {
        let conn = test_db();

        let first = find_or_create_user(&conn, "openid-1").unwrap();
        let second = find_or_create_user(&conn, "openid-1").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.nickname, None);

        let events = get_events_for_entity(&conn, "user", &first.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "user_created");
    }

    #[test]
    fn test_update_user() {
        let conn = test_db();
        find_or_create_user(&conn, "openid-1").unwrap();

        let user = update_user(&conn, "openid-1", Some("小明"), None).unwrap().unwrap();
        assert_eq!(user.nickname.as_deref(), Some("小明"));

        let user = update_user(&conn, "openid-1", None, Some("https://img/a.png")).unwrap().unwrap();
        assert_eq!(user.nickname.as_deref(), Some("小明"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/a.png"));

        assert!(update_user(&conn, "nobody", Some("x"), None).unwrap().is_none());
    }

    #[test]
    fn test_history_paging_and_ownership() {
        let conn = test_db();
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

        for i in 0..5 {
            insert_history_at(
                &conn,
                Some("openid-1"),
                &serde_json::json!({ "surname": "李", "n": i }),
                &serde_json::json!({ "names": [] }),
                base + Duration::minutes(i),
            )
            .unwrap();
        }
        insert_history(&conn, Some("openid-2"), &serde_json::json!({}), &serde_json::json!({})).unwrap();

        let now = base + Duration::minutes(30);
        let page1 = list_history(&conn, "openid-1", 1, 2, now).unwrap();
        assert_eq!(page1.total, 5);
        assert_eq!(page1.records.len(), 2);
        assert!(page1.has_more);
        // Newest first
        assert_eq!(page1.records[0].params["n"], 4);
        assert_eq!(page1.records[0].created_at, "26分钟前");

        let page3 = list_history(&conn, "openid-1", 3, 2, now).unwrap();
        assert_eq!(page3.records.len(), 1);
        assert!(!page3.has_more);

        // Other users cannot read or delete
        let id = page1.records[0].id.clone();
        assert!(get_history(&conn, "openid-2", &id).unwrap().is_none());
        assert!(!delete_history(&conn, "openid-2", &id).unwrap());

        let detail = get_history(&conn, "openid-1", &id).unwrap().unwrap();
        assert_eq!(detail.params["surname"], "李");
        assert!(delete_history(&conn, "openid-1", &id).unwrap());
        assert_eq!(list_history(&conn, "openid-1", 1, 20, now).unwrap().total, 4);

        // Pages past the end are empty, whatever their number
        let far = list_history(&conn, "openid-1", usize::MAX, 20, now).unwrap();
        assert!(far.records.is_empty());
        assert!(!far.has_more);
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap();

        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "刚刚");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5分钟前");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3小时前");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2天前");
        assert_eq!(format_relative_time(now - Duration::days(30), now), "5月21日");
    }

    #[test]
    fn test_favorites_idempotent() {
        let conn = test_db();
        let user = find_or_create_user(&conn, "openid-1").unwrap();
        let content = serde_json::json!({ "fullName": "林清", "pinyin": "lín qīng" });

        let first = add_favorite(&conn, &user.id, FavoriteKind::Naming, &content).unwrap();
        let again = add_favorite(&conn, &user.id, FavoriteKind::Naming, &content).unwrap();
        assert_eq!(first.id, again.id);

        // Same name, different kind is a separate favorite
        let analysis = add_favorite(&conn, &user.id, FavoriteKind::Analysis, &content).unwrap();
        assert_ne!(first.id, analysis.id);

        let all = list_favorites(&conn, &user.id, None, 1, 20).unwrap();
        assert_eq!(all.total, 2);
        let naming = list_favorites(&conn, &user.id, Some(FavoriteKind::Naming), 1, 20).unwrap();
        assert_eq!(naming.total, 1);
        assert_eq!(naming.records[0].content["pinyin"], "lín qīng");
    }

    #[test]
    fn test_check_and_remove_favorite() {
        let conn = test_db();
        let user = find_or_create_user(&conn, "openid-1").unwrap();
        let other = find_or_create_user(&conn, "openid-2").unwrap();

        let fav = add_favorite(
            &conn,
            &user.id,
            FavoriteKind::Naming,
            &serde_json::json!({ "fullName": "王锦" }),
        )
        .unwrap();

        assert_eq!(
            check_favorite(&conn, &user.id, FavoriteKind::Naming, "王锦").unwrap(),
            Some(fav.id.clone())
        );
        assert_eq!(check_favorite(&conn, &other.id, FavoriteKind::Naming, "王锦").unwrap(), None);

        assert!(!remove_favorite(&conn, &other.id, &fav.id).unwrap());
        assert!(remove_favorite(&conn, &user.id, &fav.id).unwrap());
        assert_eq!(check_favorite(&conn, &user.id, FavoriteKind::Naming, "王锦").unwrap(), None);

        let events = get_events_for_entity(&conn, "favorite", &fav.id).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_favorite_identifier_hash() {
        let a = favorite_identifier("u1", FavoriteKind::Naming, &serde_json::json!({ "fullName": "李瑞", "x": 1 }));
        let b = favorite_identifier("u1", FavoriteKind::Naming, &serde_json::json!({ "fullName": "李瑞", "x": 2 }));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_audit_failure_does_not_block_writes() {
        let conn = test_db();
        conn.execute_batch("DROP TABLE events;").unwrap();

        let event = Event::new("test_event", "user", "u1", serde_json::json!({}), "test_actor");
        assert!(!record_event(&conn, &event));

        // Main writes still land without the audit table
        let user = find_or_create_user(&conn, "openid-1").unwrap();
        let fav = add_favorite(&conn, &user.id, FavoriteKind::Naming, &serde_json::json!({ "fullName": "李瑞" })).unwrap();
        assert!(remove_favorite(&conn, &user.id, &fav.id).unwrap());
        insert_history(&conn, Some("openid-1"), &serde_json::json!({}), &serde_json::json!({})).unwrap();
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "test_event",
            "naming_history",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "naming_history", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
    }
}
