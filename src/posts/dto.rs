use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    posts::repo::{PostPage, PostWithAuthor},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}
fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct PostAuthor {
    pub id: Uuid,
    pub username: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub author: PostAuthor,
}

impl PostResponse {
    pub fn from_row(state: &AppState, row: PostWithAuthor) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            author: PostAuthor {
                id: row.author_id,
                username: row.author_username,
                image_url: state.storage.public_url(&row.author_image),
            },
        }
    }
}

/// One page of the feed, with the numbers a pager needs.
#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub items: Vec<PostResponse>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl FeedPage {
    pub fn from_page(state: &AppState, page: PostPage) -> Self {
        Self {
            items: page
                .items
                .into_iter()
                .map(|row| PostResponse::from_row(state, row))
                .collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}
