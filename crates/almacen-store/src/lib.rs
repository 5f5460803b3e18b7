// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use almacen_app::{ClientStore, NavigationIntent, RowId, TableId, VisibilityOverrides};

pub const APP_NAME: &str = "almacen";

/// Durable client-side preference store: visibility overrides, the single-use
/// navigation intent, and per-table search text, namespaced by user.
pub struct Store {
    conn: Connection,
    user: String,
}

impl Store {
    pub fn open(path: &Path, user: &str) -> Result<Self> {
        validate_user(user)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open preference store at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            user: user.to_owned(),
        })
    }

    pub fn open_memory(user: &str) -> Result<Self> {
        validate_user(user)?;
        let conn = Connection::open_in_memory().context("open in-memory preference store")?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            user: user.to_owned(),
        })
    }

    pub fn bootstrap(&self) -> Result<()> {
        self.conn
            .execute_batch(include_str!("sql/schema.sql"))
            .context("create preference schema")
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl ClientStore for Store {
    fn load_overrides(&mut self, table_id: TableId) -> Result<VisibilityOverrides> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_key, visible FROM column_prefs
                 WHERE user_name = ? AND table_id = ?",
            )
            .context("prepare override query")?;
        let rows = stmt
            .query_map(params![self.user, table_id.get()], |row| {
                let key: String = row.get(0)?;
                let visible: bool = row.get(1)?;
                Ok((key, visible))
            })
            .context("query overrides")?;

        let mut overrides = VisibilityOverrides::new();
        for entry in rows {
            let (key, visible) = entry.context("read override row")?;
            overrides.set(&key, visible);
        }
        Ok(overrides)
    }

    fn save_overrides(
        &mut self,
        table_id: TableId,
        overrides: &VisibilityOverrides,
    ) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("begin override save")?;
        tx.execute(
            "DELETE FROM column_prefs WHERE user_name = ? AND table_id = ?",
            params![self.user, table_id.get()],
        )
        .context("clear previous overrides")?;
        for (key, visible) in overrides.entries() {
            tx.execute(
                "INSERT INTO column_prefs (user_name, table_id, column_key, visible, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![self.user, table_id.get(), key, visible, now],
            )
            .with_context(|| format!("save override for column {key}"))?;
        }
        tx.commit().context("commit override save")
    }

    fn store_intent(&mut self, intent: &NavigationIntent) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO navigation_intent (user_name, table_id, row_id, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (user_name) DO UPDATE
                 SET table_id = excluded.table_id,
                     row_id = excluded.row_id,
                     created_at = excluded.created_at",
                params![
                    self.user,
                    intent.table_id.get(),
                    intent.row_id.get(),
                    now
                ],
            )
            .context("store navigation intent")?;
        Ok(())
    }

    fn take_intent(&mut self) -> Result<Option<NavigationIntent>> {
        let tx = self.conn.transaction().context("begin intent take")?;
        let intent = tx
            .query_row(
                "SELECT table_id, row_id FROM navigation_intent WHERE user_name = ?",
                params![self.user],
                |row| {
                    let table_id: i64 = row.get(0)?;
                    let row_id: i64 = row.get(1)?;
                    Ok(NavigationIntent {
                        table_id: TableId::new(table_id),
                        row_id: RowId::new(row_id),
                    })
                },
            )
            .optional()
            .context("read navigation intent")?;
        tx.execute(
            "DELETE FROM navigation_intent WHERE user_name = ?",
            params![self.user],
        )
        .context("clear navigation intent")?;
        tx.commit().context("commit intent take")?;
        Ok(intent)
    }

    fn load_search_text(&mut self, table_id: TableId) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT pattern FROM search_prefs WHERE user_name = ? AND table_id = ?",
                params![self.user, table_id.get()],
                |row| row.get(0),
            )
            .optional()
            .context("read search text")
    }

    fn save_search_text(&mut self, table_id: TableId, text: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO search_prefs (user_name, table_id, pattern, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (user_name, table_id) DO UPDATE
                 SET pattern = excluded.pattern, updated_at = excluded.updated_at",
                params![self.user, table_id.get(), text, now],
            )
            .context("save search text")?;
        Ok(())
    }
}

pub fn default_store_path() -> Result<PathBuf> {
    let data_root = dirs::data_dir()
        .context("cannot resolve data directory; set [storage].store_path in the config")?;
    Ok(data_root.join(APP_NAME).join("prefs.db"))
}

fn validate_user(user: &str) -> Result<()> {
    if user.trim().is_empty() {
        bail!("store user name must not be empty; set [user].name in the config");
    }
    Ok(())
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

#[cfg(test)]
mod tests {
    use super::{Store, default_store_path};
    use almacen_app::{ClientStore, NavigationIntent, RowId, TableId, VisibilityOverrides};
    use anyhow::Result;

    fn store() -> Result<Store> {
        let store = Store::open_memory("avery")?;
        store.bootstrap()?;
        Ok(store)
    }

    #[test]
    fn overrides_round_trip_per_table() -> Result<()> {
        let mut store = store()?;
        let mut overrides = VisibilityOverrides::new();
        overrides.set("sku", false);
        overrides.set("created_at", true);
        store.save_overrides(TableId::new(3), &overrides)?;

        assert_eq!(store.load_overrides(TableId::new(3))?, overrides);
        assert!(store.load_overrides(TableId::new(4))?.is_empty());
        Ok(())
    }

    #[test]
    fn saving_overrides_replaces_previous_entries() -> Result<()> {
        let mut store = store()?;
        let mut first = VisibilityOverrides::new();
        first.set("sku", false);
        store.save_overrides(TableId::new(3), &first)?;

        let mut second = VisibilityOverrides::new();
        second.set("vendor", false);
        store.save_overrides(TableId::new(3), &second)?;

        assert_eq!(store.load_overrides(TableId::new(3))?, second);
        Ok(())
    }

    #[test]
    fn take_intent_is_read_and_clear() -> Result<()> {
        let mut store = store()?;
        let intent = NavigationIntent {
            table_id: TableId::new(7),
            row_id: RowId::new(42),
        };
        store.store_intent(&intent)?;

        assert_eq!(store.take_intent()?, Some(intent));
        assert_eq!(store.take_intent()?, None, "a taken intent is gone");
        Ok(())
    }

    #[test]
    fn storing_a_new_intent_overwrites_the_old_one() -> Result<()> {
        let mut store = store()?;
        store.store_intent(&NavigationIntent {
            table_id: TableId::new(1),
            row_id: RowId::new(1),
        })?;
        let newer = NavigationIntent {
            table_id: TableId::new(2),
            row_id: RowId::new(9),
        };
        store.store_intent(&newer)?;

        assert_eq!(store.take_intent()?, Some(newer));
        Ok(())
    }

    #[test]
    fn search_text_round_trips_per_table() -> Result<()> {
        let mut store = store()?;
        store.save_search_text(TableId::new(1), "abc")?;
        store.save_search_text(TableId::new(2), "xyz")?;
        store.save_search_text(TableId::new(1), "abcd")?;

        assert_eq!(store.load_search_text(TableId::new(1))?, Some("abcd".to_owned()));
        assert_eq!(store.load_search_text(TableId::new(2))?, Some("xyz".to_owned()));
        assert_eq!(store.load_search_text(TableId::new(3))?, None);
        Ok(())
    }

    #[test]
    fn users_do_not_see_each_others_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("prefs.db");

        let mut avery = Store::open(&path, "avery")?;
        avery.bootstrap()?;
        avery.store_intent(&NavigationIntent {
            table_id: TableId::new(7),
            row_id: RowId::new(42),
        })?;
        avery.save_search_text(TableId::new(1), "abc")?;

        let mut jordan = Store::open(&path, "jordan")?;
        jordan.bootstrap()?;
        assert_eq!(jordan.take_intent()?, None);
        assert_eq!(jordan.load_search_text(TableId::new(1))?, None);

        assert!(avery.take_intent()?.is_some());
        Ok(())
    }

    #[test]
    fn empty_user_name_is_rejected() {
        assert!(Store::open_memory("  ").is_err());
    }

    #[test]
    fn default_path_ends_with_the_app_database() -> Result<()> {
        let path = default_store_path()?;
        assert!(path.ends_with("almacen/prefs.db"));
        Ok(())
    }
}
