use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Favorite, FamilyMember, Ingredient, IngredientCategory, NewFamilyMember, RecipeHistory,
    ShoppingMemo, User, UserCredentials,
};
use crate::store::RowStore;

pub struct Database {
    conn: Connection,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

fn json_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS family_members (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    age INTEGER NOT NULL,
                    gender TEXT NOT NULL,
                    height REAL NOT NULL,
                    weight REAL NOT NULL,
                    dislikes TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    user_request TEXT NOT NULL,
                    ai_response TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS favorites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    recipe TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_family_user ON family_members(user_id);
                CREATE INDEX IF NOT EXISTS idx_ingredients_user_category ON ingredients(user_id, category);
                CREATE INDEX IF NOT EXISTS idx_history_user ON recipe_history(user_id);
                CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS shopping_memos (
                    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                    content TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    fn family_member_from_row(row: &rusqlite::Row) -> rusqlite::Result<FamilyMember> {
        Ok(FamilyMember {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            age: row.get(3)?,
            gender: row.get(4)?,
            height: row.get(5)?,
            weight: row.get(6)?,
            dislikes: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        let label: String = row.get(3)?;
        let category = IngredientCategory::from_label(&label).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown ingredient category '{label}'").into(),
            )
        })?;
        Ok(Ingredient {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            category,
            created_at: row.get(4)?,
        })
    }

    fn history_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeHistory> {
        Ok(RecipeHistory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            user_request: row.get(2)?,
            ai_response: json_column(row, 3)?,
            created_at: row.get(4)?,
        })
    }

    fn favorite_from_row(row: &rusqlite::Row) -> rusqlite::Result<Favorite> {
        Ok(Favorite {
            id: row.get(0)?,
            user_id: row.get(1)?,
            recipe: json_column(row, 2)?,
            created_at: row.get(3)?,
        })
    }

    fn get_family_member(&self, user_id: &str, id: i64) -> Result<Option<FamilyMember>> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, age, gender, height, weight, dislikes, created_at
                 FROM family_members WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::family_member_from_row,
            )
            .optional()
            .context("Failed to load family member")
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl RowStore for Database {
    // --- Users and sessions ---

    fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            created_at: now(),
        };
        self.conn
            .execute(
                "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.email, password_hash, user.created_at],
            )
            .with_context(|| format!("Failed to create user '{email}'"))?;
        Ok(user)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        self.conn
            .query_row(
                "SELECT id, email, created_at, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(UserCredentials {
                        user: Self::user_from_row(row)?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to look up user")
    }

    fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_session(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![token_hash, user_id, now(), timestamp(expires_at)],
            )
            .context("Failed to create session")?;
        Ok(())
    }

    fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT u.id, u.email, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2",
                params![token_hash, timestamp(now)],
                Self::user_from_row,
            )
            .optional()
            .context("Failed to resolve session")
    }

    fn delete_session(&self, token_hash: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(())
    }

    fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        keep_token_hash: &str,
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin password transaction")?;
        tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE user_id = ?1 AND token_hash != ?2",
            params![user_id, keep_token_hash],
        )?;
        tx.commit().context("Failed to update password")?;
        Ok(())
    }

    // --- Family ---

    fn list_family(&self, user_id: &str) -> Result<Vec<FamilyMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, age, gender, height, weight, dislikes, created_at
             FROM family_members WHERE user_id = ?1 ORDER BY created_at, id",
        )?;
        let members = stmt
            .query_map(params![user_id], Self::family_member_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn insert_family_member(
        &self,
        user_id: &str,
        member: &NewFamilyMember,
    ) -> Result<FamilyMember> {
        self.conn
            .execute(
                "INSERT INTO family_members (user_id, name, age, gender, height, weight, dislikes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user_id,
                    member.name,
                    member.age,
                    member.gender,
                    member.height,
                    member.weight,
                    member.dislikes,
                    now(),
                ],
            )
            .context("Failed to insert family member")?;
        let id = self.conn.last_insert_rowid();
        self.get_family_member(user_id, id)?
            .context("Family member vanished after insert")
    }

    fn update_family_member(
        &self,
        user_id: &str,
        id: i64,
        member: &NewFamilyMember,
    ) -> Result<Option<FamilyMember>> {
        self.conn
            .execute(
                "UPDATE family_members
                 SET name = ?1, age = ?2, gender = ?3, height = ?4, weight = ?5, dislikes = ?6
                 WHERE id = ?7 AND user_id = ?8",
                params![
                    member.name,
                    member.age,
                    member.gender,
                    member.height,
                    member.weight,
                    member.dislikes,
                    id,
                    user_id,
                ],
            )
            .context("Failed to update family member")?;
        self.get_family_member(user_id, id)
    }

    fn delete_family_member(&self, user_id: &str, id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM family_members WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(())
    }

    // --- Ingredients ---

    fn list_ingredients(&self, user_id: &str) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, category, created_at
             FROM ingredients WHERE user_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn replace_ingredients(
        &self,
        user_id: &str,
        category: IngredientCategory,
        names: &[String],
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin ingredient transaction")?;
        tx.execute(
            "DELETE FROM ingredients WHERE user_id = ?1 AND category = ?2",
            params![user_id, category.label()],
        )?;
        {
            let created_at = now();
            let mut stmt = tx.prepare(
                "INSERT INTO ingredients (user_id, name, category, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for name in names {
                stmt.execute(params![user_id, name, category.label(), created_at])?;
            }
        }
        tx.commit().context("Failed to save ingredients")?;
        Ok(())
    }

    fn delete_ingredient(&self, user_id: &str, id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM ingredients WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(())
    }

    // --- History, favorites, memo ---

    fn insert_history(
        &self,
        user_id: &str,
        request: &str,
        response: &Value,
    ) -> Result<RecipeHistory> {
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO recipe_history (user_id, user_request, ai_response, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, request, response.to_string(), created_at],
            )
            .context("Failed to insert recipe history")?;
        Ok(RecipeHistory {
            id: self.conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            user_request: request.to_string(),
            ai_response: response.clone(),
            created_at,
        })
    }

    fn list_history(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<RecipeHistory>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, user_request, ai_response, created_at
             FROM recipe_history WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], Self::history_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_favorite(&self, user_id: &str, recipe: &Value) -> Result<Favorite> {
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO favorites (user_id, recipe, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, recipe.to_string(), created_at],
            )
            .context("Failed to insert favorite")?;
        Ok(Favorite {
            id: self.conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            recipe: recipe.clone(),
            created_at,
        })
    }

    fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, recipe, created_at
             FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::favorite_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_favorite(&self, user_id: &str, id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM favorites WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(())
    }

    fn shopping_memo(&self, user_id: &str) -> Result<Option<ShoppingMemo>> {
        self.conn
            .query_row(
                "SELECT user_id, content, updated_at FROM shopping_memos WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(ShoppingMemo {
                        user_id: row.get(0)?,
                        content: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to load shopping memo")
    }

    fn save_shopping_memo(&self, user_id: &str, content: &str) -> Result<ShoppingMemo> {
        let updated_at = now();
        self.conn
            .execute(
                "INSERT INTO shopping_memos (user_id, content, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
                params![user_id, content, updated_at],
            )
            .context("Failed to save shopping memo")?;
        Ok(ShoppingMemo {
            user_id: user_id.to_string(),
            content: content.to_string(),
            updated_at,
        })
    }
}
