use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::completion::{
    Attachment, CompletionModel, CompletionRequest, DEFAULT_MODELS, complete_with_fallback,
};
use crate::json_extract::JsonShape;
use crate::models::{FamilyMember, PhotoCandidates, servings_label};
use crate::normalize::{normalize_details, normalize_photo_candidates, normalize_suggestions};
use crate::pattern::Pattern;
use crate::prompts::{NO_REQUEST, PHOTO_PROMPT, detail_prompt, suggestion_prompt};
use crate::response::{parse_fenced_json, parse_model_json};
use crate::store::{RowStore, lock};

/// Runs the three model-backed operations: suggestions, recipe details and
/// photo ingredient recognition.
///
/// The planner is immutable and shared across requests. It holds no store
/// handle; the `*_for_user` variants take one and release the lock before
/// calling the model.
pub struct RecipePlanner {
    model: Arc<dyn CompletionModel>,
    candidates: Vec<String>,
}

impl RecipePlanner {
    /// An empty candidate list falls back to [`DEFAULT_MODELS`].
    pub fn new(model: Arc<dyn CompletionModel>, candidates: Vec<String>) -> Self {
        let candidates = if candidates.is_empty() {
            DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect()
        } else {
            candidates
        };
        Self { model, candidates }
    }

    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let completion = complete_with_fallback(self.model.as_ref(), &self.candidates, request)
            .await
            .context("model call failed")?;
        Ok(completion.text)
    }

    /// Three normalized suggestions for `pattern`.
    pub async fn suggest(
        &self,
        family: &[FamilyMember],
        ingredients: &[String],
        request: &str,
        pattern: Pattern,
    ) -> Result<Vec<Value>> {
        let prompt = suggestion_prompt(family, ingredients, request, pattern);
        let raw = self.complete(&CompletionRequest::json(prompt)).await?;

        let parsed = parse_model_json(&raw, JsonShape::Array).inspect_err(|e| {
            tracing::error!(error = %e, raw = %e.raw, "unreadable suggestion response");
        })?;
        Ok(normalize_suggestions(parsed, pattern))
    }

    /// Shopping list, per-dish ingredients and cooking steps for a chosen
    /// suggestion. The pattern comes from the suggestion itself.
    pub async fn details(
        &self,
        selected_menu: &Value,
        ingredients: &[String],
        family_size: usize,
    ) -> Result<Value> {
        let pattern = Pattern::of_recipe(selected_menu).unwrap_or_default();
        let servings = servings_label(family_size);
        let prompt = detail_prompt(selected_menu, ingredients, &servings, pattern);
        let raw = self.complete(&CompletionRequest::json(prompt)).await?;

        let parsed = parse_model_json(&raw, JsonShape::Object).inspect_err(|e| {
            tracing::error!(error = %e, raw = %e.raw, "unreadable recipe detail response");
        })?;
        Ok(normalize_details(parsed, pattern, &servings))
    }

    pub async fn ingredients_from_photo(
        &self,
        image: Vec<u8>,
        mime_type: &str,
    ) -> Result<PhotoCandidates> {
        let request =
            CompletionRequest::json(PHOTO_PROMPT.to_string()).with_attachment(Attachment {
                mime_type: mime_type.to_string(),
                data: image,
            });
        let raw = self.complete(&request).await?;

        let parsed = parse_fenced_json(&raw).inspect_err(|e| {
            let head: String = e.raw.chars().take(500).collect();
            tracing::error!(error = %e, raw = %head, "unreadable photo analysis response");
        })?;
        Ok(normalize_photo_candidates(&parsed))
    }

    /// Suggest from the user's stored family and ingredients, then record the
    /// result in their history. A history write failure is logged and the
    /// suggestions are still returned.
    pub async fn suggest_for_user(
        &self,
        store: &Mutex<dyn RowStore>,
        user_id: &str,
        request: &str,
        pattern: Pattern,
    ) -> Result<Vec<Value>> {
        let (family, ingredients) = {
            let store = lock(store);
            let family = store
                .list_family(user_id)
                .context("failed to load family members")?;
            let ingredients: Vec<String> = store
                .list_ingredients(user_id)
                .context("failed to load ingredients")?
                .into_iter()
                .map(|i| i.name)
                .collect();
            (family, ingredients)
        };

        let request = match request.trim() {
            "" => NO_REQUEST,
            trimmed => trimmed,
        };
        let suggestions = self
            .suggest(&family, &ingredients, request, pattern)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %format!("{e:#}"),
                    family = family.len(),
                    ingredients = ingredients.len(),
                    "recipe suggestion failed"
                );
            })?;

        let record = Value::Array(suggestions.clone());
        if let Err(e) = lock(store).insert_history(user_id, request, &record) {
            tracing::error!(error = %format!("{e:#}"), "failed to save recipe history");
        }
        Ok(suggestions)
    }

    /// Details sized for the user's family.
    pub async fn details_for_user(
        &self,
        store: &Mutex<dyn RowStore>,
        user_id: &str,
        selected_menu: &Value,
        ingredients: &[String],
    ) -> Result<Value> {
        let family_size = lock(store)
            .list_family(user_id)
            .context("failed to load family members")?
            .len();
        self.details(selected_menu, ingredients, family_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ModelError;
    use crate::completion::testing::ScriptedModel;
    use crate::db::Database;
    use crate::models::{IngredientCategory, NewFamilyMember};
    use serde_json::json;

    fn planner(replies: Vec<Result<String, ModelError>>) -> (RecipePlanner, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(replies));
        let planner = RecipePlanner::new(model.clone(), vec!["m1".to_string(), "m2".to_string()]);
        (planner, model)
    }

    fn store_with_user() -> (Arc<Mutex<Database>>, String) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("a@example.com", "x").unwrap();
        db.insert_family_member(
            &user.id,
            &NewFamilyMember {
                name: "太郎".to_string(),
                age: 8,
                gender: "男性".to_string(),
                height: 128.0,
                weight: 26.0,
                dislikes: "ピーマン".to_string(),
            },
        )
        .unwrap();
        db.replace_ingredients(&user.id, IngredientCategory::MeatFish, &["鶏肉".to_string()])
            .unwrap();
        (Arc::new(Mutex::new(db)), user.id)
    }

    #[test]
    fn test_empty_candidates_use_defaults() {
        let planner = RecipePlanner::new(Arc::new(ScriptedModel::default()), Vec::new());
        assert_eq!(planner.candidates().len(), DEFAULT_MODELS.len());
        assert_eq!(planner.candidates()[0], "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_suggest_normalizes_fenced_response() {
        let (planner, model) = planner(vec![Ok(
            "```json\n[{\"menu_name\": \"親子丼\", \"dishes\": {\"single\": \"親子丼\"}}]\n```"
                .to_string(),
        )]);
        let out = planner
            .suggest(&[], &["卵".to_string()], "", Pattern::OneBowl)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["pattern"], json!("one_bowl"));
        assert!(model.last_prompt().contains("卵"));
    }

    #[tokio::test]
    async fn test_suggest_unparseable_is_error() {
        let (planner, _) = planner(vec![Ok("I cannot help with that.".to_string())]);
        let err = planner
            .suggest(&[], &[], "", Pattern::FullMeal)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_details_repairs_and_adds_servings() {
        let (planner, model) = planner(vec![Ok(
            "{\n  \"shopping_list\": [\n    \"卵 (2個)\"\n    \"ねぎ\"\n  ]\n}".to_string(),
        )]);
        let menu = json!({ "pattern": "one_bowl", "dishes": { "single": "親子丼" } });
        let out = planner.details(&menu, &["鶏肉".to_string()], 3).await.unwrap();
        assert_eq!(out["shopping_list"], json!(["卵 (2個)", "ねぎ"]));
        assert_eq!(out["servings"], json!("3人前"));
        assert_eq!(out["cooking_steps"], json!({ "single": [] }));
        assert!(model.last_prompt().contains("3人前"));
    }

    #[tokio::test]
    async fn test_details_default_pattern_and_single_serving() {
        let (planner, model) = planner(vec![Ok("{}".to_string())]);
        let menu = json!({ "dishes": { "main": "生姜焼き", "side": "サラダ", "soup": "味噌汁" } });
        let out = planner.details(&menu, &[], 0).await.unwrap();
        assert_eq!(out["servings"], json!("1人前"));
        assert_eq!(out["ingredients"], json!({ "main": [] }));
        assert!(model.last_prompt().contains("生姜焼き"));
    }

    #[tokio::test]
    async fn test_photo_sends_attachment_and_groups() {
        let (planner, model) = planner(vec![Ok(
            "[{\"name\": \"卵\", \"category\": \"その他\", \"maybe\": false}]".to_string(),
        )]);
        let out = planner
            .ingredients_from_photo(vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(out.other[0].name, "卵");

        let calls = model.calls.lock().unwrap();
        let attachment = calls[0].1.attachment.as_ref().unwrap();
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_photo_does_not_repair() {
        let (planner, _) = planner(vec![Ok("[\n  卵\n  牛乳\n]".to_string())]);
        assert!(
            planner
                .ingredients_from_photo(vec![0], "image/jpeg")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_model_fallback_applies() {
        let (planner, model) = planner(vec![
            Err(ModelError::Api {
                model: "m1".to_string(),
                status: 404,
                message: "not found".to_string(),
            }),
            Ok("[]".to_string()),
        ]);
        let out = planner.suggest(&[], &[], "", Pattern::Bento).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(model.called_models(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_suggest_for_user_records_history() {
        let (store, user_id) = store_with_user();
        let (planner, model) = planner(vec![Ok("[{\"menu_name\": \"唐揚げ弁当\"}]".to_string())]);

        let out = planner
            .suggest_for_user(store.as_ref(), &user_id, "  ", Pattern::Bento)
            .await
            .unwrap();
        assert_eq!(out[0]["dishes"], json!({ "items": [] }));

        let prompt = model.last_prompt();
        assert!(prompt.contains("太郎"));
        assert!(prompt.contains("鶏肉"));

        let history = store.lock().unwrap().list_history(&user_id, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_request, NO_REQUEST);
        assert_eq!(history[0].ai_response, Value::Array(out));
    }

    #[tokio::test]
    async fn test_history_failure_still_returns_suggestions() {
        let (store, user_id) = store_with_user();
        store
            .lock()
            .unwrap()
            .execute_raw("DROP TABLE recipe_history;")
            .unwrap();
        let (planner, _) = planner(vec![Ok("[{\"menu_name\": \"A\"}]".to_string())]);

        let out = planner
            .suggest_for_user(store.as_ref(), &user_id, "和食", Pattern::FullMeal)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_details_for_user_uses_family_size() {
        let (store, user_id) = store_with_user();
        let (planner, _) = planner(vec![Ok("{}".to_string())]);
        let out = planner
            .details_for_user(store.as_ref(), &user_id, &json!({}), &[])
            .await
            .unwrap();
        assert_eq!(out["servings"], json!("1人前"));
    }
}
