use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{
    Favorite, FamilyMember, Ingredient, IngredientCategory, NewFamilyMember, RecipeHistory,
    ShoppingMemo, User, UserCredentials,
};

/// User-scoped persistence plus the session API.
///
/// Every row operation takes the owning user's id and never touches another
/// user's rows. Updates and deletes of absent rows are silent no-ops.
pub trait RowStore: Send {
    // --- Users and sessions ---

    fn create_user(&self, email: &str, password_hash: &str) -> Result<User>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>>;
    fn email_exists(&self, email: &str) -> Result<bool>;
    fn create_session(&self, token_hash: &str, user_id: &str, expires_at: DateTime<Utc>)
    -> Result<()>;
    /// The user owning an unexpired session, if any.
    fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>>;
    fn delete_session(&self, token_hash: &str) -> Result<()>;
    /// Replace the user's password hash and revoke every session except
    /// `keep_token_hash`, atomically.
    fn update_password(&self, user_id: &str, password_hash: &str, keep_token_hash: &str)
    -> Result<()>;

    // --- Family ---

    fn list_family(&self, user_id: &str) -> Result<Vec<FamilyMember>>;
    fn insert_family_member(&self, user_id: &str, member: &NewFamilyMember)
    -> Result<FamilyMember>;
    fn update_family_member(
        &self,
        user_id: &str,
        id: i64,
        member: &NewFamilyMember,
    ) -> Result<Option<FamilyMember>>;
    fn delete_family_member(&self, user_id: &str, id: i64) -> Result<()>;

    // --- Ingredients ---

    fn list_ingredients(&self, user_id: &str) -> Result<Vec<Ingredient>>;
    /// Delete every ingredient of `category` for the user and insert `names`,
    /// atomically.
    fn replace_ingredients(
        &self,
        user_id: &str,
        category: IngredientCategory,
        names: &[String],
    ) -> Result<()>;
    fn delete_ingredient(&self, user_id: &str, id: i64) -> Result<()>;

    // --- History, favorites, memo ---

    fn insert_history(&self, user_id: &str, request: &str, response: &Value)
    -> Result<RecipeHistory>;
    /// Newest first.
    fn list_history(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<RecipeHistory>>;
    fn insert_favorite(&self, user_id: &str, recipe: &Value) -> Result<Favorite>;
    /// Newest first.
    fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>>;
    fn delete_favorite(&self, user_id: &str, id: i64) -> Result<()>;
    fn shopping_memo(&self, user_id: &str) -> Result<Option<ShoppingMemo>>;
    fn save_shopping_memo(&self, user_id: &str, content: &str) -> Result<ShoppingMemo>;
}

/// Lock a shared store, recovering from poisoning. The guard must never be
/// held across an `.await`.
pub fn lock(store: &Mutex<dyn RowStore>) -> MutexGuard<'_, dyn RowStore + 'static> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
