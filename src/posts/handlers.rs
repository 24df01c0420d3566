use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::PublicUser,
        extractors::AuthUser,
        repo::User,
    },
    posts::{
        dto::{CreatePostRequest, FeedPage, PageQuery, PostResponse, UpdatePostRequest},
        repo::{Post, PostError},
    },
    state::AppState,
    validation::{check_post_content, check_post_title, FieldError},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(feed))
        .route("/home", get(feed))
        .route("/post/new", get(new_post_page).post(create_post))
        .route("/post/:id", get(get_post))
        .route("/post/:id/update", get(edit_post_page).post(update_post))
        .route("/post/:id/delete", post(delete_post))
        .route("/user/:username", get(user_posts))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn map_post_error(e: PostError) -> (StatusCode, String) {
    match e {
        PostError::NotFound => (StatusCode::NOT_FOUND, "Post not found".into()),
        PostError::Forbidden => (
            StatusCode::FORBIDDEN,
            "Only the author may change this post".into(),
        ),
        PostError::Db(e) => {
            error!(error = %e, "post query failed");
            internal(e)
        }
    }
}

fn title_content_errors(title: &str, content: &str) -> Vec<FieldError> {
    [check_post_title(title), check_post_content(content)]
        .into_iter()
        .flatten()
        .collect()
}

#[instrument(skip(state))]
pub async fn feed(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<FeedPage>, (StatusCode, String)> {
    let page = Post::list_page(&state.db, q.page)
        .await
        .map_err(map_post_error)?;
    Ok(Json(FeedPage::from_page(&state, page)))
}

pub async fn new_post_page(AuthUser(_user_id): AuthUser) -> StatusCode {
    StatusCode::OK
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Response, (StatusCode, String)> {
    let errors = title_content_errors(&payload.title, &payload.content);
    if !errors.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": errors })),
        )
            .into_response());
    }

    let post = Post::create(&state.db, user_id, &payload.title, &payload.content)
        .await
        .map_err(map_post_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        format!("/post/{}", post.id).parse().map_err(internal)?,
    );

    info!(post_id = %post.id, author_id = %user_id, "post created");
    Ok((StatusCode::CREATED, headers, Json(post)).into_response())
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostResponse>, (StatusCode, String)> {
    let row = Post::get(&state.db, id).await.map_err(map_post_error)?;
    Ok(Json(PostResponse::from_row(&state, row)))
}

/// Prefill for the edit form; the same ownership rule as the update
/// itself.
#[instrument(skip(state))]
pub async fn edit_post_page(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PostResponse>, (StatusCode, String)> {
    let row = Post::get(&state.db, id).await.map_err(map_post_error)?;
    if row.author_id != user_id {
        return Err(map_post_error(PostError::Forbidden));
    }
    Ok(Json(PostResponse::from_row(&state, row)))
}

#[instrument(skip(state, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Response, (StatusCode, String)> {
    let errors = title_content_errors(&payload.title, &payload.content);
    if !errors.is_empty() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": errors })),
        )
            .into_response());
    }

    let post = Post::update(&state.db, id, user_id, &payload.title, &payload.content)
        .await
        .map_err(map_post_error)?;

    info!(post_id = %post.id, author_id = %user_id, "post updated");
    Ok(Json(post).into_response())
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    Post::delete(&state.db, id, user_id)
        .await
        .map_err(map_post_error)?;
    info!(post_id = %id, author_id = %user_id, "post deleted");
    Ok(Json(json!({ "message": "Your post has been deleted." })))
}

/// Public author page: profile plus that author's posts, newest first.
#[instrument(skip(state))]
pub async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let user = User::find_by_username(&state.db, &username)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    let page = Post::list_by_author(&state.db, user.id, q.page)
        .await
        .map_err(map_post_error)?;

    Ok(Json(json!({
        "user": PublicUser::from_user(&state, &user),
        "posts": FeedPage::from_page(&state, page),
    })))
}
