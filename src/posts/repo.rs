use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Feed pages are a fixed five posts.
pub const PAGE_SIZE: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub author_id: Uuid,
}

/// Post row with its author resolved by join; the feed and the post page
/// both need the author's name and avatar.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithAuthor {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub author_id: Uuid,
    pub author_username: String,
    pub author_image: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("not the author of this post")]
    Forbidden,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// One page of posts plus the numbers a pager needs.
#[derive(Debug)]
pub struct PostPage {
    pub items: Vec<PostWithAuthor>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Pages are 1-based; anything below is treated as the first page.
fn normalize_page(page: i64) -> i64 {
    page.max(1)
}

fn page_offset(page: i64) -> i64 {
    (normalize_page(page) - 1) * PAGE_SIZE
}

fn total_pages(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

const POST_WITH_AUTHOR: &str = r#"
    SELECT p.id, p.title, p.content, p.created_at, p.author_id,
           u.username AS author_username, u.image_file AS author_image
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

impl Post {
    pub async fn create(
        db: &PgPool,
        author_id: Uuid,
        title: &str,
        content: &str,
    ) -> Result<Post, PostError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, content, author_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, created_at, author_id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(author_id)
        .fetch_one(db)
        .await?;
        Ok(post)
    }

    pub async fn get(db: &PgPool, id: Uuid) -> Result<PostWithAuthor, PostError> {
        let sql = format!("{POST_WITH_AUTHOR} WHERE p.id = $1");
        sqlx::query_as::<_, PostWithAuthor>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or(PostError::NotFound)
    }

    /// Ownership is re-checked here, on every call, regardless of how the
    /// post was previously looked up.
    async fn check_owner(db: &PgPool, id: Uuid, acting_user: Uuid) -> Result<(), PostError> {
        let author = sqlx::query_scalar::<_, Uuid>(r#"SELECT author_id FROM posts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or(PostError::NotFound)?;
        if author != acting_user {
            return Err(PostError::Forbidden);
        }
        Ok(())
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        acting_user: Uuid,
        title: &str,
        content: &str,
    ) -> Result<Post, PostError> {
        Self::check_owner(db, id, acting_user).await?;
        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
               SET title = $2, content = $3
             WHERE id = $1
            RETURNING id, title, content, created_at, author_id
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_optional(db)
        .await?
        .ok_or(PostError::NotFound)?;
        Ok(post)
    }

    pub async fn delete(db: &PgPool, id: Uuid, acting_user: Uuid) -> Result<(), PostError> {
        Self::check_owner(db, id, acting_user).await?;
        sqlx::query(r#"DELETE FROM posts WHERE id = $1"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Newest first, ties broken by id so pagination is stable across
    /// calls. Pages past the end come back empty.
    pub async fn list_page(db: &PgPool, page: i64) -> Result<PostPage, PostError> {
        let page = normalize_page(page);
        let total = sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM posts"#)
            .fetch_one(db)
            .await?;
        let sql = format!("{POST_WITH_AUTHOR} ORDER BY p.created_at DESC, p.id DESC LIMIT $1 OFFSET $2");
        let items = sqlx::query_as::<_, PostWithAuthor>(&sql)
            .bind(PAGE_SIZE)
            .bind(page_offset(page))
            .fetch_all(db)
            .await?;
        Ok(PostPage {
            items,
            page,
            per_page: PAGE_SIZE,
            total,
            total_pages: total_pages(total),
        })
    }

    pub async fn list_by_author(
        db: &PgPool,
        author_id: Uuid,
        page: i64,
    ) -> Result<PostPage, PostError> {
        let page = normalize_page(page);
        let total =
            sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM posts WHERE author_id = $1"#)
                .bind(author_id)
                .fetch_one(db)
                .await?;
        let sql = format!(
            "{POST_WITH_AUTHOR} WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3"
        );
        let items = sqlx::query_as::<_, PostWithAuthor>(&sql)
            .bind(author_id)
            .bind(PAGE_SIZE)
            .bind(page_offset(page))
            .fetch_all(db)
            .await?;
        Ok(PostPage {
            items,
            page,
            per_page: PAGE_SIZE,
            total,
            total_pages: total_pages(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_below_one_clamp_to_first() {
        assert_eq!(normalize_page(-3), 1);
        assert_eq!(normalize_page(0), 1);
        assert_eq!(normalize_page(1), 1);
        assert_eq!(normalize_page(7), 7);
    }

    #[test]
    fn offsets_step_by_page_size() {
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(2), 5);
        assert_eq!(page_offset(4), 15);
        assert_eq!(page_offset(0), 0);
    }

    #[test]
    fn total_pages_is_ceiling_division() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(1), 1);
        assert_eq!(total_pages(5), 1);
        assert_eq!(total_pages(6), 2);
        assert_eq!(total_pages(11), 3);
    }
}
