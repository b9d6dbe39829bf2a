//! SQLite-backed annotation store.
//!
//! Schema bootstrap is idempotent and seeds one default prompt template so a
//! fresh database can run a batch without any template administration.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::AnnotationStore;
use crate::error::AnnotationError;
use crate::prompt::DEFAULT_TEMPLATE_BODY;
use crate::types::{
    now_timestamp, AnnotatableItem, LabelInfo, NewProposal, PromptTemplate, ProposalStatus,
    ProposalView, ProviderConfig, ProviderKind, SelectionPolicy,
};

/// Username of the synthetic identity that authors machine proposals.
pub const SYSTEM_USERNAME: &str = "ai_assistant";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    color       TEXT
);

CREATE TABLE IF NOT EXISTS labels (
    id          INTEGER PRIMARY KEY,
    category_id INTEGER REFERENCES categories(id),
    name        TEXT NOT NULL,
    description TEXT,
    color       TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    role        TEXT NOT NULL DEFAULT 'annotator'
);

CREATE TABLE IF NOT EXISTS items (
    id          INTEGER PRIMARY KEY,
    source_id   INTEGER NOT NULL,
    content     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prompt_templates (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    category    TEXT,
    body        TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS provider_configs (
    id            INTEGER PRIMARY KEY,
    provider      TEXT NOT NULL,
    base_url      TEXT,
    api_key       TEXT,
    model         TEXT NOT NULL,
    temperature   REAL NOT NULL DEFAULT 0.7,
    max_tokens    INTEGER NOT NULL DEFAULT 1000,
    system_prompt TEXT,
    template_id   INTEGER REFERENCES prompt_templates(id),
    is_active     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS annotations (
    id              INTEGER PRIMARY KEY,
    item_id         INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    label_id        INTEGER NOT NULL REFERENCES labels(id),
    user_id         INTEGER NOT NULL REFERENCES users(id),
    is_ai_generated INTEGER NOT NULL DEFAULT 0,
    confidence      REAL,
    model           TEXT,
    provider        TEXT,
    status          TEXT NOT NULL DEFAULT 'active',
    created_at      TEXT NOT NULL,
    reviewed_by     INTEGER REFERENCES users(id),
    reviewed_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_annotations_item ON annotations(item_id);
CREATE INDEX IF NOT EXISTS idx_annotations_status ON annotations(status);
CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_id);
";

/// Create all tables and seed the default template. Idempotent.
///
/// Also enables foreign-key enforcement, which SQLite scopes per connection;
/// call this (or `configure_connection`) on every connection you open.
pub fn init_schema(conn: &Connection) -> Result<(), AnnotationError> {
    configure_connection(conn)?;
    conn.execute_batch(SCHEMA)?;

    let templates: i64 = conn.query_row("SELECT COUNT(*) FROM prompt_templates", [], |row| {
        row.get(0)
    })?;
    if templates == 0 {
        conn.execute(
            "INSERT INTO prompt_templates (name, category, body, is_active)
             VALUES (?1, ?2, ?3, 1)",
            params!["Default annotation", "annotation", DEFAULT_TEMPLATE_BODY],
        )?;
    }
    Ok(())
}

/// Per-connection pragmas (cascade deletes require enforced foreign keys).
pub fn configure_connection(conn: &Connection) -> Result<(), AnnotationError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

// ── Seed helpers ────────────────────────────────────────────────────────────
// Writes to the taxonomy/item/config tables belong to the surrounding
// application; these helpers exist for that layer and for tests.

pub fn insert_category(conn: &Connection, name: &str) -> Result<i64, AnnotationError> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_label(
    conn: &Connection,
    category_id: Option<i64>,
    name: &str,
    description: Option<&str>,
) -> Result<i64, AnnotationError> {
    conn.execute(
        "INSERT INTO labels (category_id, name, description, is_active) VALUES (?1, ?2, ?3, 1)",
        params![category_id, name, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_item(
    conn: &Connection,
    source_id: i64,
    content: &str,
) -> Result<i64, AnnotationError> {
    conn.execute(
        "INSERT INTO items (source_id, content) VALUES (?1, ?2)",
        params![source_id, content],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_template(conn: &Connection, name: &str, body: &str) -> Result<i64, AnnotationError> {
    conn.execute(
        "INSERT INTO prompt_templates (name, body, is_active) VALUES (?1, ?2, 1)",
        params![name, body],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert an inactive configuration; use `activate_provider_config` to make
/// it the live one.
pub fn insert_provider_config(
    conn: &Connection,
    provider: ProviderKind,
    base_url: Option<&str>,
    api_key: Option<&str>,
    model: &str,
) -> Result<i64, AnnotationError> {
    conn.execute(
        "INSERT INTO provider_configs (provider, base_url, api_key, model, is_active)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![provider.as_str(), base_url, api_key, model],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Store implementation ────────────────────────────────────────────────────

/// SQLite implementation of [`AnnotationStore`].
pub struct SqliteAnnotationStore;

impl SqliteAnnotationStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteAnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn config_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ProviderConfig, String)> {
    let provider_raw: String = row.get(1)?;
    let temperature: f64 = row.get(5)?;
    let max_tokens: i64 = row.get(6)?;
    Ok((
        ProviderConfig {
            id: row.get(0)?,
            // Placeholder; validated by the caller against provider_raw.
            provider: ProviderKind::Ollama,
            base_url: row.get(2)?,
            api_key: row.get(3)?,
            model: row.get(4)?,
            temperature: temperature as f32,
            max_tokens: max_tokens.max(0) as u32,
            system_prompt: row.get(7)?,
            template_id: row.get(8)?,
            is_active: row.get::<_, i64>(9)? != 0,
        },
        provider_raw,
    ))
}

impl AnnotationStore for SqliteAnnotationStore {
    fn get_active_provider_config(
        &self,
        conn: &Connection,
    ) -> Result<Option<ProviderConfig>, AnnotationError> {
        let row = conn
            .query_row(
                "SELECT id, provider, base_url, api_key, model, temperature, max_tokens,
                        system_prompt, template_id, is_active
                 FROM provider_configs WHERE is_active = 1 LIMIT 1",
                [],
                config_from_row,
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((mut config, provider_raw)) => {
                config.provider = ProviderKind::parse(&provider_raw).ok_or_else(|| {
                    AnnotationError::InvalidStored {
                        field: "provider".to_string(),
                        value: provider_raw,
                    }
                })?;
                Ok(Some(config))
            }
        }
    }

    fn activate_provider_config(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<(), AnnotationError> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("UPDATE provider_configs SET is_active = 0", [])?;
        let changed = tx.execute(
            "UPDATE provider_configs SET is_active = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed != 1 {
            return Err(AnnotationError::InvalidConfig(format!(
                "no provider configuration with id {id}"
            )));
        }
        tx.commit()?;
        Ok(())
    }

    fn get_active_labels(
        &self,
        conn: &Connection,
        categories: Option<&[String]>,
    ) -> Result<Vec<LabelInfo>, AnnotationError> {
        let base = "SELECT l.id, l.name, l.description, c.name,
                           (SELECT COUNT(*) FROM annotations a WHERE a.label_id = l.id)
                    FROM labels l
                    LEFT JOIN categories c ON c.id = l.category_id
                    WHERE l.is_active = 1";

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<LabelInfo> {
            Ok(LabelInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                category: row.get(3)?,
                usage_count: row.get(4)?,
            })
        };

        let mut labels = Vec::new();
        match categories {
            Some(names) if !names.is_empty() => {
                let placeholders = vec!["?"; names.len()].join(", ");
                let sql =
                    format!("{base} AND c.name IN ({placeholders}) ORDER BY c.name, l.name");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(names.iter()), map_row)?;
                for row in rows {
                    labels.push(row?);
                }
            }
            _ => {
                let sql = format!("{base} ORDER BY c.name, l.name");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], map_row)?;
                for row in rows {
                    labels.push(row?);
                }
            }
        }
        Ok(labels)
    }

    fn get_template(
        &self,
        conn: &Connection,
        template_id: Option<i64>,
    ) -> Result<Option<PromptTemplate>, AnnotationError> {
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<PromptTemplate> {
            Ok(PromptTemplate {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                body: row.get(3)?,
                is_active: row.get::<_, i64>(4)? != 0,
            })
        };

        if let Some(id) = template_id {
            let found = conn
                .query_row(
                    "SELECT id, name, category, body, is_active
                     FROM prompt_templates WHERE id = ?1 AND is_active = 1",
                    params![id],
                    map_row,
                )
                .optional()?;
            if let Some(template) = found {
                return Ok(Some(template));
            }
            tracing::debug!(template_id = id, "template not found, using first active");
        }

        Ok(conn
            .query_row(
                "SELECT id, name, category, body, is_active
                 FROM prompt_templates WHERE is_active = 1 ORDER BY id LIMIT 1",
                [],
                map_row,
            )
            .optional()?)
    }

    fn select_items(
        &self,
        conn: &Connection,
        source_id: i64,
        policy: SelectionPolicy,
    ) -> Result<Vec<AnnotatableItem>, AnnotationError> {
        let sql = match policy {
            // Only items no active or pending proposal touches.
            SelectionPolicy::New => {
                "SELECT i.id, i.source_id, i.content FROM items i
                 WHERE i.source_id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM annotations a
                       WHERE a.item_id = i.id
                         AND a.status IN ('active', 'pending_review'))
                 ORDER BY i.id"
            }
            SelectionPolicy::Additional | SelectionPolicy::Replace => {
                "SELECT i.id, i.source_id, i.content FROM items i
                 WHERE i.source_id = ?1 ORDER BY i.id"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok(AnnotatableItem {
                id: row.get(0)?,
                source_id: row.get(1)?,
                content: row.get(2)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn persist_proposals(
        &self,
        conn: &Connection,
        proposals: &[NewProposal],
        replace: bool,
    ) -> Result<u32, AnnotationError> {
        let tx = conn.unchecked_transaction()?;
        let created_at = now_timestamp();
        let mut cleared: std::collections::HashSet<i64> = std::collections::HashSet::new();
        let mut created = 0u32;

        for proposal in proposals {
            // Replace deletes each item's prior machine proposals exactly
            // once, before that item's first new row lands, in the same
            // transaction as the inserts.
            if replace && cleared.insert(proposal.item_id) {
                tx.execute(
                    "DELETE FROM annotations WHERE item_id = ?1 AND is_ai_generated = 1",
                    params![proposal.item_id],
                )?;
            }

            tx.execute(
                "INSERT INTO annotations
                 (item_id, label_id, user_id, is_ai_generated, confidence, model, provider,
                  status, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8)",
                params![
                    proposal.item_id,
                    proposal.label_id,
                    proposal.user_id,
                    proposal.confidence as f64,
                    proposal.model,
                    proposal.provider.as_str(),
                    ProposalStatus::PendingReview.as_str(),
                    created_at,
                ],
            )?;
            created += 1;
        }

        tx.commit()?;
        Ok(created)
    }

    fn delete_proposal(&self, conn: &Connection, id: i64) -> Result<(), AnnotationError> {
        conn.execute(
            "DELETE FROM annotations WHERE id = ?1 AND is_ai_generated = 1",
            params![id],
        )?;
        Ok(())
    }

    fn update_proposal_status(
        &self,
        conn: &Connection,
        id: i64,
        status: ProposalStatus,
        reviewer_id: i64,
    ) -> Result<bool, AnnotationError> {
        let changed = conn.execute(
            "UPDATE annotations
             SET status = ?1, reviewed_by = ?2, reviewed_at = ?3
             WHERE id = ?4 AND is_ai_generated = 1 AND status = 'pending_review'",
            params![status.as_str(), reviewer_id, now_timestamp(), id],
        )?;
        Ok(changed == 1)
    }

    fn list_pending(
        &self,
        conn: &Connection,
        source_id: Option<i64>,
    ) -> Result<Vec<ProposalView>, AnnotationError> {
        let base = "SELECT a.id, a.item_id, i.content, l.name, a.confidence, a.model,
                           a.provider, a.created_at
                    FROM annotations a
                    JOIN items i ON i.id = a.item_id
                    JOIN labels l ON l.id = a.label_id
                    WHERE a.is_ai_generated = 1 AND a.status = 'pending_review'";

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(ProposalView, String)> {
            let confidence: f64 = row.get(4)?;
            let provider_raw: String = row.get(6)?;
            Ok((
                ProposalView {
                    id: row.get(0)?,
                    item_id: row.get(1)?,
                    text: row.get(2)?,
                    label: row.get(3)?,
                    confidence: confidence as f32,
                    model: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    provider: ProviderKind::Ollama,
                    created_at: row.get(7)?,
                },
                provider_raw,
            ))
        };

        let mut raw_views = Vec::new();
        match source_id {
            Some(source) => {
                let sql = format!("{base} AND i.source_id = ?1 ORDER BY a.created_at, a.id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![source], map_row)?;
                for row in rows {
                    raw_views.push(row?);
                }
            }
            None => {
                let sql = format!("{base} ORDER BY a.created_at, a.id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], map_row)?;
                for row in rows {
                    raw_views.push(row?);
                }
            }
        }

        let mut views = Vec::with_capacity(raw_views.len());
        for (mut view, provider_raw) in raw_views {
            view.provider = ProviderKind::parse(&provider_raw).ok_or_else(|| {
                AnnotationError::InvalidStored {
                    field: "provider".to_string(),
                    value: provider_raw,
                }
            })?;
            views.push(view);
        }
        Ok(views)
    }

    fn get_or_create_system_user(&self, conn: &Connection) -> Result<i64, AnnotationError> {
        let existing = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![SYSTEM_USERNAME],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        match existing {
            Some(id) => Ok(id),
            None => {
                conn.execute(
                    "INSERT INTO users (username, role) VALUES (?1, 'annotator')",
                    params![SYSTEM_USERNAME],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    /// Category + two labels + two items, ready for proposal rows.
    fn seed_basics(conn: &Connection) -> (i64, i64, i64, i64, i64) {
        let cat = insert_category(conn, "Temi").unwrap();
        let label_a = insert_label(conn, Some(cat), "Efficienza", Some("speed")).unwrap();
        let label_b = insert_label(conn, Some(cat), "Qualità", None).unwrap();
        let item_a = insert_item(conn, 1, "primo testo").unwrap();
        let item_b = insert_item(conn, 1, "secondo testo").unwrap();
        (cat, label_a, label_b, item_a, item_b)
    }

    fn proposal(item_id: i64, label_id: i64, user_id: i64) -> NewProposal {
        NewProposal {
            item_id,
            label_id,
            user_id,
            confidence: 0.8,
            model: "llama3".to_string(),
            provider: ProviderKind::Ollama,
        }
    }

    #[test]
    fn init_schema_is_idempotent_and_seeds_default_template() {
        let conn = test_db();
        init_schema(&conn).unwrap();

        let store = SqliteAnnotationStore::new();
        let template = store.get_template(&conn, None).unwrap().unwrap();
        assert_eq!(template.name, "Default annotation");

        // Re-running must not duplicate the seed.
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM prompt_templates", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn activation_is_mutually_exclusive() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let a = insert_provider_config(
            &conn,
            ProviderKind::Ollama,
            Some("http://localhost:11434"),
            None,
            "llama3",
        )
        .unwrap();
        let b =
            insert_provider_config(&conn, ProviderKind::OpenRouter, None, Some("sk"), "gpt-4o")
                .unwrap();

        store.activate_provider_config(&conn, a).unwrap();
        assert_eq!(
            store.get_active_provider_config(&conn).unwrap().unwrap().id,
            a
        );

        store.activate_provider_config(&conn, b).unwrap();
        let active = store.get_active_provider_config(&conn).unwrap().unwrap();
        assert_eq!(active.id, b);
        assert_eq!(active.provider, ProviderKind::OpenRouter);

        let active_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM provider_configs WHERE is_active = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn activating_unknown_config_fails() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        assert!(matches!(
            store.activate_provider_config(&conn, 999),
            Err(AnnotationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn no_active_config_is_none_not_error() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        assert!(store.get_active_provider_config(&conn).unwrap().is_none());
    }

    #[test]
    fn active_labels_carry_usage_counts_and_category() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();

        let labels = store.get_active_labels(&conn, None).unwrap();
        assert_eq!(labels.len(), 2);
        let eff = labels.iter().find(|l| l.name == "Efficienza").unwrap();
        assert_eq!(eff.usage_count, 1);
        assert_eq!(eff.category.as_deref(), Some("Temi"));
    }

    #[test]
    fn inactive_labels_are_excluded() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        seed_basics(&conn);
        conn.execute("UPDATE labels SET is_active = 0 WHERE name = 'Qualità'", [])
            .unwrap();

        let labels = store.get_active_labels(&conn, None).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Efficienza");
    }

    #[test]
    fn category_filter_restricts_labels() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        seed_basics(&conn);
        let other = insert_category(&conn, "Altro").unwrap();
        insert_label(&conn, Some(other), "Fuori", None).unwrap();

        let labels = store
            .get_active_labels(&conn, Some(&["Temi".to_string()]))
            .unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|l| l.category.as_deref() == Some("Temi")));
    }

    #[test]
    fn template_falls_back_to_first_active() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let custom = insert_template(&conn, "Custom", "Label with care.").unwrap();

        // Unknown id falls back to the seeded default (lowest id).
        let fallback = store.get_template(&conn, Some(999)).unwrap().unwrap();
        assert_eq!(fallback.name, "Default annotation");

        let chosen = store.get_template(&conn, Some(custom)).unwrap().unwrap();
        assert_eq!(chosen.name, "Custom");
    }

    #[test]
    fn new_policy_skips_items_with_live_proposals() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();

        let all = store
            .select_items(&conn, 1, SelectionPolicy::New)
            .unwrap();
        assert_eq!(all.len(), 2);

        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();

        let remaining = store
            .select_items(&conn, 1, SelectionPolicy::New)
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, item_b);

        // Rejected proposals free the item up again.
        conn.execute("UPDATE annotations SET status = 'rejected'", [])
            .unwrap();
        let after_reject = store
            .select_items(&conn, 1, SelectionPolicy::New)
            .unwrap();
        assert_eq!(after_reject.len(), 2);
    }

    #[test]
    fn additional_policy_selects_everything() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();

        let items = store
            .select_items(&conn, 1, SelectionPolicy::Additional)
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn replace_deletes_prior_machine_proposals_only() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();

        // Two prior machine proposals plus one human annotation on the item.
        store
            .persist_proposals(
                &conn,
                &[
                    proposal(item_a, label_a, user),
                    proposal(item_a, label_b, user),
                ],
                false,
            )
            .unwrap();
        conn.execute(
            "INSERT INTO annotations (item_id, label_id, user_id, is_ai_generated, status, created_at)
             VALUES (?1, ?2, ?3, 0, 'active', ?4)",
            params![item_a, label_a, user, now_timestamp()],
        )
        .unwrap();

        store
            .persist_proposals(
                &conn,
                &[
                    proposal(item_a, label_a, user),
                    proposal(item_a, label_b, user),
                ],
                true,
            )
            .unwrap();

        let machine: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM annotations WHERE item_id = ?1 AND is_ai_generated = 1",
                params![item_a],
                |r| r.get(0),
            )
            .unwrap();
        let human: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM annotations WHERE item_id = ?1 AND is_ai_generated = 0",
                params![item_a],
                |r| r.get(0),
            )
            .unwrap();
        // Exactly the replacement rows survive; the human row is untouched.
        assert_eq!(machine, 2);
        assert_eq!(human, 1);
    }

    #[test]
    fn status_update_is_guarded() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();
        let id: i64 = conn
            .query_row("SELECT id FROM annotations", [], |r| r.get(0))
            .unwrap();

        assert!(store
            .update_proposal_status(&conn, id, ProposalStatus::Active, user)
            .unwrap());
        // Second transition is a no-op, and the first decision stands.
        assert!(!store
            .update_proposal_status(&conn, id, ProposalStatus::Rejected, user)
            .unwrap());
        let status: String = conn
            .query_row("SELECT status FROM annotations WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "active");
        // Unknown id is also a quiet no-op.
        assert!(!store
            .update_proposal_status(&conn, 999, ProposalStatus::Active, user)
            .unwrap());
    }

    #[test]
    fn pending_listing_joins_text_and_label() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();

        let pending = store.list_pending(&conn, Some(1)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "primo testo");
        assert_eq!(pending[0].label, "Efficienza");
        assert_eq!(pending[0].provider, ProviderKind::Ollama);

        assert!(store.list_pending(&conn, Some(2)).unwrap().is_empty());
    }

    #[test]
    fn delete_proposal_only_touches_machine_rows() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();
        conn.execute(
            "INSERT INTO annotations (item_id, label_id, user_id, is_ai_generated, status, created_at)
             VALUES (?1, ?2, ?3, 0, 'active', ?4)",
            params![item_a, label_a, user, now_timestamp()],
        )
        .unwrap();
        let machine_id: i64 = conn
            .query_row(
                "SELECT id FROM annotations WHERE is_ai_generated = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let human_id: i64 = conn
            .query_row(
                "SELECT id FROM annotations WHERE is_ai_generated = 0",
                [],
                |r| r.get(0),
            )
            .unwrap();

        // Human annotations are out of reach for this primitive.
        store.delete_proposal(&conn, human_id).unwrap();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 2);

        store.delete_proposal(&conn, machine_id).unwrap();
        assert!(store.list_pending(&conn, None).unwrap().is_empty());
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn system_user_is_created_once() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let first = store.get_or_create_system_user(&conn).unwrap();
        let second = store.get_or_create_system_user(&conn).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn deleting_an_item_cascades_to_its_proposals() {
        let conn = test_db();
        let store = SqliteAnnotationStore::new();
        let (_cat, label_a, _label_b, item_a, _item_b) = seed_basics(&conn);
        let user = store.get_or_create_system_user(&conn).unwrap();
        store
            .persist_proposals(&conn, &[proposal(item_a, label_a, user)], false)
            .unwrap();

        conn.execute("DELETE FROM items WHERE id = ?1", params![item_a])
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
