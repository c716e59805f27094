use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, Request, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use kondate_core::auth::{
    SESSION_TTL_DAYS, generate_session_token, hash_password, hash_session_token, session_expiry,
    verify_password,
};
use kondate_core::models::{
    FamilyMember, IngredientCategory, NewFamilyMember, PhotoCandidates, User,
    clean_ingredient_names, validate_email, validate_family_member, validate_password,
};
use kondate_core::pattern::Pattern;
use kondate_core::service::RecipePlanner;
use kondate_core::store::{RowStore, lock};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const PHOTO_LIMIT: usize = 8 * 1024 * 1024; // 8 MB
const SESSION_COOKIE: &str = "kondate_session";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<dyn RowStore>>,
    /// `None` when no API key is configured.
    pub planner: Option<Arc<RecipePlanner>>,
}

impl AppState {
    fn planner(&self) -> Result<&RecipePlanner, ApiError> {
        self.planner
            .as_deref()
            .ok_or(ApiError::Misconfigured("GOOGLE_API_KEY is not set"))
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CredentialsRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct PasswordRequest {
    password: Option<String>,
}

#[derive(Deserialize)]
struct CheckEmailRequest {
    email: Option<String>,
}

#[derive(Serialize)]
struct AccountResponse {
    id: String,
    email: String,
}

#[derive(Deserialize)]
struct FamilyRequest {
    name: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    height: Option<f64>,
    weight: Option<f64>,
    dislikes: Option<String>,
}

#[derive(Deserialize)]
struct SaveIngredientsRequest {
    category: Option<String>,
    ingredients: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestRequest {
    user_request: Option<String>,
    pattern: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsRequest {
    selected_menu: Option<Value>,
    ingredients_list: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct FavoriteRequest {
    recipe: Option<Value>,
}

#[derive(Deserialize)]
struct DeleteFavoriteRequest {
    id: Option<i64>,
}

#[derive(Deserialize)]
struct MemoRequest {
    content: Option<String>,
}

#[derive(Serialize)]
struct PhotoResponse {
    candidates: PhotoCandidates,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    TooLarge(String),
    Unauthorized(&'static str),
    Misconfigured(&'static str),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::TooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            Self::Misconfigured(detail) => {
                tracing::error!(detail, "server configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                )
            }
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn rejected(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge(text)
    } else {
        ApiError::BadRequest(text)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

// --- Extractors ---

/// `Json` whose rejections come back as `{error}`: 400, or 413 when oversized.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

struct ApiPath<T>(T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

struct ApiQuery<T>(T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

// --- Sessions ---

/// The signed-in user, resolved from the session cookie or a bearer token.
struct CurrentUser(User);

fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthorized("Not signed in"))?;
        let user = lock(&state.store)
            .session_user(&hash_session_token(&token), Utc::now())
            .context("failed to resolve session")?;
        user.map(CurrentUser)
            .ok_or(ApiError::Unauthorized("Session expired or invalid"))
    }
}

fn session_cookie(token: &str) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_TTL_DAYS * 24 * 60 * 60
    )
}

fn cleared_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn start_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let token = generate_session_token();
    lock(&state.store)
        .create_session(
            &hash_session_token(&token),
            &user.id,
            session_expiry(Utc::now()),
        )
        .context("failed to create session")?;
    Ok(token)
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let email = validate_email(req.email.as_deref().unwrap_or_default()).map_err(|e| bad_request(&e))?;
    let password = req.password.unwrap_or_default();
    validate_password(&password).map_err(|e| bad_request(&e))?;

    let password_hash = hash_password(&password)?;
    let user = {
        let store = lock(&state.store);
        if store.email_exists(&email).context("failed to check email")? {
            return Err(ApiError::BadRequest(format!(
                "An account for '{email}' already exists"
            )));
        }
        store.create_user(&email, &password_hash)?
    };
    let token = start_session(&state, &user)?;
    tracing::info!(user_id = %user.id, "account created");

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(AccountResponse {
            id: user.id,
            email: user.email,
        }),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    };
    let email = email.trim().to_lowercase();

    let credentials = lock(&state.store)
        .find_user_by_email(&email)
        .context("failed to look up user")?;
    let user = credentials
        .filter(|c| verify_password(&password, &c.password_hash))
        .map(|c| c.user)
        .ok_or(ApiError::Unauthorized("Invalid email or password"))?;
    let token = start_session(&state, &user)?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(AccountResponse {
            id: user.id,
            email: user.email,
        }),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        lock(&state.store)
            .delete_session(&hash_session_token(&token))
            .context("failed to delete session")?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, cleared_cookie())]),
    )
        .into_response())
}

async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    ApiJson(req): ApiJson<PasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let password = req.password.unwrap_or_default();
    validate_password(&password).map_err(|e| bad_request(&e))?;
    let current = session_token(&headers).ok_or(ApiError::Unauthorized("Not signed in"))?;

    let password_hash = hash_password(&password)?;
    lock(&state.store)
        .update_password(&user.id, &password_hash, &hash_session_token(&current))
        .context("failed to update password")?;
    tracing::info!(user_id = %user.id, "password changed; other sessions revoked");
    Ok(Json(json!({ "ok": true })))
}

async fn check_email(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::BadRequest("email is required".to_string()))?;
    let exists = lock(&state.store)
        .email_exists(&email)
        .context("email lookup failed")?;
    Ok(Json(json!({ "exists": exists })))
}

// --- Family ---

async fn list_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<FamilyMember>>, ApiError> {
    let members = lock(&state.store)
        .list_family(&user.id)
        .context("failed to list family members")?;
    Ok(Json(members))
}

fn validated_member(req: &FamilyRequest) -> Result<NewFamilyMember, ApiError> {
    validate_family_member(
        req.name.as_deref(),
        req.age,
        req.gender.as_deref(),
        req.height,
        req.weight,
        req.dislikes.as_deref(),
    )
    .map_err(|e| bad_request(&e))
}

async fn create_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<FamilyRequest>,
) -> Result<Json<FamilyMember>, ApiError> {
    let member = validated_member(&req)?;
    let created = lock(&state.store)
        .insert_family_member(&user.id, &member)
        .context("failed to insert family member")?;
    Ok(Json(created))
}

async fn update_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<FamilyRequest>,
) -> Result<Json<Option<FamilyMember>>, ApiError> {
    let member = validated_member(&req)?;
    let updated = lock(&state.store)
        .update_family_member(&user.id, id, &member)
        .context("failed to update family member")?;
    Ok(Json(updated))
}

async fn delete_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    lock(&state.store)
        .delete_family_member(&user.id, id)
        .context("failed to delete family member")?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Ingredients ---

async fn list_ingredients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let rows = lock(&state.store)
        .list_ingredients(&user.id)
        .context("failed to list ingredients")?;
    Ok(Json(serde_json::to_value(rows).context("failed to serialize ingredients")?))
}

async fn save_ingredients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<SaveIngredientsRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(label), Some(names)) = (req.category, req.ingredients) else {
        return Err(ApiError::BadRequest(
            "category and an ingredients array are required".to_string(),
        ));
    };
    let category = IngredientCategory::from_label(&label)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown ingredient category '{label}'")))?;
    let names = clean_ingredient_names(&names);

    lock(&state.store)
        .replace_ingredients(&user.id, category, &names)
        .context("failed to save ingredients")?;
    Ok(Json(json!({ "message": format!("{category}の食材リストを更新しました。") })))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    lock(&state.store)
        .delete_ingredient(&user.id, id)
        .context("failed to delete ingredient")?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ingredients_from_photo(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let planner = state.planner()?;
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let mime_type = field
                .content_type()
                .filter(|m| !m.is_empty())
                .unwrap_or("image/jpeg")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            upload = Some((bytes, mime_type));
            break;
        }
    }

    let (bytes, mime_type) =
        upload.ok_or_else(|| ApiError::BadRequest("No image file in field 'file'".to_string()))?;
    if bytes.is_empty() || bytes.len() > PHOTO_LIMIT {
        return Err(ApiError::BadRequest(
            "Image must be between 1 byte and 8 MB".to_string(),
        ));
    }

    let candidates = planner
        .ingredients_from_photo(bytes.to_vec(), &mime_type)
        .await
        .context("photo analysis failed")?;
    Ok(Json(PhotoResponse { candidates }))
}

// --- Recipes ---

async fn suggest_recipes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<SuggestRequest>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let planner = state.planner()?;
    let pattern = Pattern::from_code_or_default(req.pattern.as_deref());
    let request = req.user_request.unwrap_or_default();

    let suggestions = planner
        .suggest_for_user(&state.store, &user.id, &request, pattern)
        .await?;
    Ok(Json(suggestions))
}

async fn generate_recipe_details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<DetailsRequest>,
) -> Result<Json<Value>, ApiError> {
    let planner = state.planner()?;
    let (Some(menu), Some(ingredients)) = (
        req.selected_menu.filter(|m| !m.is_null()),
        req.ingredients_list,
    ) else {
        return Err(ApiError::BadRequest(
            "selectedMenu and ingredientsList are required".to_string(),
        ));
    };

    let details = planner
        .details_for_user(&state.store, &user.id, &menu, &ingredients)
        .await
        .context("recipe detail generation failed")?;
    Ok(Json(details))
}

async fn list_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let rows = lock(&state.store)
        .list_history(&user.id, query.limit)
        .context("failed to list history")?;
    Ok(Json(serde_json::to_value(rows).context("failed to serialize history")?))
}

// --- Favorites ---

async fn list_favorites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let rows = lock(&state.store)
        .list_favorites(&user.id)
        .context("failed to list favorites")?;
    Ok(Json(serde_json::to_value(rows).context("failed to serialize favorites")?))
}

async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<FavoriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let recipe = req
        .recipe
        .filter(|r| !r.is_null())
        .ok_or_else(|| ApiError::BadRequest("recipe is required".to_string()))?;
    let favorite = lock(&state.store)
        .insert_favorite(&user.id, &recipe)
        .context("failed to save favorite")?;
    Ok(Json(serde_json::to_value(favorite).context("failed to serialize favorite")?))
}

async fn delete_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<DeleteFavoriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = req
        .id
        .ok_or_else(|| ApiError::BadRequest("id is required".to_string()))?;
    lock(&state.store)
        .delete_favorite(&user.id, id)
        .context("failed to delete favorite")?;
    Ok(Json(json!({ "ok": true })))
}

// --- Shopping memo ---

async fn get_shopping_memo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let memo = lock(&state.store)
        .shopping_memo(&user.id)
        .context("failed to load shopping memo")?;
    Ok(Json(match memo {
        Some(m) => json!({ "content": m.content, "updated_at": m.updated_at }),
        None => json!({ "content": "", "updated_at": null }),
    }))
}

async fn save_shopping_memo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<MemoRequest>,
) -> Result<Json<Value>, ApiError> {
    let content = req
        .content
        .ok_or_else(|| ApiError::BadRequest("content is required".to_string()))?;
    let memo = lock(&state.store)
        .save_shopping_memo(&user.id, &content)
        .context("failed to save shopping memo")?;
    Ok(Json(serde_json::to_value(memo).context("failed to serialize memo")?))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/check-email", post(check_email))
        .route("/api/auth/update-password", post(update_password))
        .route("/api/family", get(list_family).post(create_family_member))
        .route(
            "/api/family/{id}",
            put(update_family_member).delete(delete_family_member),
        )
        .route("/api/ingredients", get(list_ingredients).post(save_ingredients))
        .route("/api/ingredients/{id}", delete(delete_ingredient))
        .route("/api/ingredients/from-photo", post(ingredients_from_photo))
        .route("/api/suggest-recipes", post(suggest_recipes))
        .route("/api/generate-recipe-details", post(generate_recipe_details))
        .route("/api/history", get(list_history))
        .route(
            "/api/favorites",
            get(list_favorites).post(add_favorite).delete(delete_favorite),
        )
        .route(
            "/api/shopping-memo",
            get(get_shopping_memo).put(save_shopping_memo),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(state: AppState, port: u16, bind: &str) -> anyhow::Result<()> {
    match &state.planner {
        Some(planner) => tracing::info!(models = ?planner.candidates(), "model fallback order"),
        None => tracing::warn!("GOOGLE_API_KEY is not set; AI endpoints will return errors"),
    }
    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!(bind, "listening beyond localhost; sessions travel over plain HTTP");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
