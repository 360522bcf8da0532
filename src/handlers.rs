//! HTTP surface: route table, request shapes, and the per-endpoint flows.
//!
//! Handlers stay thin; the multi-step flows (image intake, post generation,
//! publishing, scraping) are plain async functions over [`AppState`] so the
//! integration tests can drive them with fake collaborators.
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, instrument};

use crate::draft;
use crate::error::ApiError;
use crate::gcs;
use crate::model::{PostDraft, UserRecord, WebsiteMetadata};
use crate::openai::ChatMessage;
use crate::scrape;
use crate::state::AppState;
use crate::wordpress::{self, BlogCredentials};

/// Post generation only ever reads the first four image slots.
const DRAFT_SLOTS: [&str; 4] = ["image1", "image2", "image3", "image4"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/Check_Existing_User", post(check_existing_user))
        .route("/Save_UserData_in_Firestore", post(save_user_data))
        .route("/Save_Image_in_Bucket", post(save_image))
        .route(
            "/Save_businessInfo_against_UserData",
            post(save_business_info),
        )
        .route("/Update_UserData_in_Firestore", post(update_user_data))
        .route("/GetPOSTDATA", get(generate_post))
        .route("/GetWebsiteAddress", get(get_website_address))
        .route("/post_to_wordpress", post(publish_post))
        .route("/scrape", post(scrape_website))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(format!("{name} is required"))),
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(Json(req): Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !has(&req.email) || !has(&req.password) {
        return Err(ApiError::bad_request("Email and password are required."));
    }
    let email = req.email.unwrap_or_default();
    Ok(Json(json!({ "message": format!("Welcome, {email}!") })))
}

#[derive(Debug, Deserialize)]
struct UserLookupRequest {
    #[serde(rename = "userID")]
    user_id: Option<String>,
}

async fn check_existing_user(
    State(state): State<AppState>,
    Json(req): Json<UserLookupRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = required(req.user_id, "userID")?;
    let user = state
        .store
        .get_user(&user_id)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    Ok(Json(match user {
        Some(user) => json!({ "found": true, "Data": user.projection() }),
        None => json!({ "found": false }),
    }))
}

#[derive(Debug, Deserialize)]
struct SaveUserRequest {
    session: Option<String>,
    person: Option<String>,
    url: Option<String>,
    #[serde(rename = "businessInfo")]
    business_info: Option<String>,
}

async fn save_user_data(
    State(state): State<AppState>,
    Json(req): Json<SaveUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = required(req.session, "session")?;
    let person = required(req.person, "person")?;
    let url = required(req.url, "url")?;
    let business_info = required(req.business_info, "businessInfo")?;

    let user = UserRecord::new(person.clone(), url, business_info);
    state
        .store
        .put_user(&session, &user)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    info!(session, "saved user record");
    Ok(Json(json!({
        "Status": true,
        "Message": format!("Thanks, {person}. I’ve saved your information.")
    })))
}

#[derive(Debug, Deserialize)]
struct BusinessInfoRequest {
    #[serde(rename = "userID")]
    user_id: Option<String>,
    #[serde(rename = "businessInfo")]
    business_info: Option<String>,
}

async fn save_business_info(
    State(state): State<AppState>,
    Json(req): Json<BusinessInfoRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = required(req.user_id, "userID")?;
    let business_info = required(req.business_info, "businessInfo")?;
    state
        .store
        .set_business_info(&user_id, &business_info)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    Ok(Json(
        json!({ "Status": true, "Message": "Business Info Updated" }),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    session: Option<String>,
    #[serde(rename = "newField")]
    new_field: Option<String>,
}

async fn update_user_data(
    State(state): State<AppState>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = required(req.session, "session")?;
    let new_field = required(req.new_field, "newField")?;
    state
        .store
        .set_schedule(&session, &new_field)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    Ok(Json(json!({
        "Status": true,
        "Message": "User data updated successfully. New field added."
    })))
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

async fn get_website_address(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("User ID not provided"))?;
    let user = state
        .store
        .get_user(&user_id)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "website_address": user.website })))
}

async fn save_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    let mut session: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("invalid multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("id") => {
                session = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::bad_request("invalid multipart body"))?,
                );
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("invalid multipart body"))?;
                upload = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let session = required(session, "id")?;
    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file part"))?;
    if filename.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }
    let receipt = intake_image(&state, &session, &filename, bytes).await?;
    Ok(Json(receipt))
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub file_name: String,
    pub file_url: String,
    pub last_image_label: Vec<String>,
    pub upload_counter: i64,
}

/// The session's uploads already counted for `today`, and whether the stored
/// quota belongs to an earlier day (or no record exists) and must restart.
fn effective_upload_count(user: Option<&UserRecord>, today: &str) -> (i64, bool) {
    match user {
        Some(user) if user.upload_date.as_deref() == Some(today) => (user.upload_count, false),
        _ => (0, true),
    }
}

/// Store, label, and record one uploaded image for a session.
#[instrument(skip(state, bytes))]
pub async fn intake_image(
    state: &AppState,
    session: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<UploadReceipt, ApiError> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let user = state
        .store
        .get_user(session)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    let (used_today, reset) = effective_upload_count(user.as_ref(), &today);
    if used_today >= i64::from(state.upload_daily_limit) {
        return Err(ApiError::bad_request(format!(
            "You have reached the limit of {} uploads per day",
            state.upload_daily_limit
        )));
    }

    let object = gcs::object_path(session, filename);
    let file_url = state
        .media
        .store(&object, gcs::content_type_for(filename), bytes.clone())
        .await
        .map_err(|e| ApiError::upstream("object storage", e))?;

    let labels = state
        .labeler
        .detect_labels(&bytes)
        .await
        .map_err(|e| ApiError::upstream("label detection", e))?;

    // Read-modify-write; a single writer per session is assumed.
    let mut batch = state
        .store
        .get_labels(session)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?
        .unwrap_or_default();
    let slot = batch.append(labels.clone(), Utc::now());
    state
        .store
        .put_labels(session, &batch)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    state
        .store
        .record_upload(session, &today, reset)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;

    info!(session, slot, file = filename, "stored and labeled upload");
    Ok(UploadReceipt {
        file_name: filename.to_string(),
        file_url,
        last_image_label: labels,
        upload_counter: used_today + 1,
    })
}

#[derive(Debug, Deserialize)]
struct ConvoQuery {
    convo_id: Option<String>,
}

async fn generate_post(
    State(state): State<AppState>,
    Query(query): Query<ConvoQuery>,
) -> Result<Json<Value>, ApiError> {
    let session = required(query.convo_id, "convo_id")?;
    let draft = build_post_draft(&state, &session).await?;
    Ok(Json(json!({
        "headline": draft.headline,
        "content": draft.content,
        "tags": draft.tags,
        "image_urls": draft.image_urls,
        "image_length": draft.image_count,
    })))
}

/// Generate and persist a post draft from the session's business info and
/// accumulated labels. Overwrites any previous draft.
#[instrument(skip(state))]
pub async fn build_post_draft(state: &AppState, session: &str) -> Result<PostDraft, ApiError> {
    let user = state
        .store
        .get_user(session)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    let business_info = user
        .map(|u| u.business_info)
        .filter(|info| !info.trim().is_empty());
    let batch = state
        .store
        .get_labels(session)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    let (Some(business_info), Some(batch)) = (business_info, batch) else {
        return Err(ApiError::bad_request(
            "Both labelsData and businessInfo are required.",
        ));
    };

    let labels = batch.labels_for_slots(&DRAFT_SLOTS).join(", ");
    let messages = [
        ChatMessage::system(draft::ASSISTANT_PERSONA),
        ChatMessage::user(draft::post_prompt(&business_info, &labels)),
    ];
    let raw = state
        .llm
        .complete_json(&messages, "post_draft", &draft::draft_schema())
        .await
        .map_err(|e| ApiError::upstream("completion", e))?;
    let (headline, content, tags) = draft::split_draft(&raw);

    // The bucket listing is authoritative for image URLs, not the batch.
    let image_urls = state
        .media
        .list(&format!("{session}/"))
        .await
        .map_err(|e| ApiError::upstream("object storage", e))?;

    let draft = PostDraft {
        headline,
        content,
        tags,
        image_count: image_urls.len() as i64,
        image_urls,
    };
    state
        .store
        .put_draft(session, &draft)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    info!(session, images = draft.image_count, "persisted post draft");
    Ok(draft)
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    #[serde(rename = "userName")]
    user_name: Option<String>,
    #[serde(rename = "passWord")]
    password: Option<String>,
    website: Option<String>,
}

async fn publish_post(
    State(state): State<AppState>,
    Query(query): Query<ConvoQuery>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = required(query.convo_id, "convo_id")?;
    let creds = BlogCredentials {
        base_url: required(req.website, "website")?,
        username: required(req.user_name, "userName")?,
        password: required(req.password, "passWord")?,
    };
    publish_draft(&state, &session, &creds).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created successfully." })),
    ))
}

/// Publish the stored draft to the caller's blog. The blog API is only
/// contacted once the draft is known to be complete.
#[instrument(skip(state, creds))]
pub async fn publish_draft(
    state: &AppState,
    session: &str,
    creds: &BlogCredentials,
) -> Result<(), ApiError> {
    let draft = state
        .store
        .get_draft(session)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?
        .ok_or_else(|| ApiError::not_found(format!("No document found for convo_id: {session}")))?;

    if draft.headline.trim().is_empty()
        || draft.content.trim().is_empty()
        || draft.image_urls.is_empty()
    {
        return Err(ApiError::bad_request("Missing required data on the server"));
    }

    let content = format!(
        "{}{}",
        wordpress::image_gallery_html(&draft.image_urls),
        draft.content
    );
    state
        .publisher
        .publish(creds, &draft.headline, &content)
        .await
        .map_err(|e| ApiError::upstream("wordpress", e))?;
    info!(session, "published draft");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ScrapeRequest {
    website_url: Option<String>,
    id: Option<String>,
}

async fn scrape_website(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> Result<Json<WebsiteMetadata>, ApiError> {
    let website_url = req
        .website_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No website URL provided"))?;
    let session = required(req.id, "id")?;
    let meta = scrape_and_store(&state, &session, &website_url).await?;
    Ok(Json(meta))
}

/// Scrape a site, persist the combined metadata as a fresh sub-record, and
/// return it.
#[instrument(skip(state))]
pub async fn scrape_and_store(
    state: &AppState,
    session: &str,
    website_url: &str,
) -> Result<WebsiteMetadata, ApiError> {
    let meta = scrape::scrape_site(&state.http, &state.geo_base, state.llm.as_ref(), website_url)
        .await
        .map_err(|e| ApiError::upstream("scrape target", e))?;
    state
        .store
        .add_site_metadata(session, &meta)
        .await
        .map_err(|e| ApiError::upstream("document store", e))?;
    info!(session, website_url, "stored website metadata");
    Ok(meta)
}
