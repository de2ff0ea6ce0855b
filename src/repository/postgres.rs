use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};

use super::{Repository, duplicate_review};
use crate::{
    error::{AppError, AppResult},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, CreateTaxonRequest,
        CreateTitleRequest, CreateUserRequest, Page, Pagination, Review, Taxon, TaxonKind, Title,
        TitleFilter, TitleRow, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
        UpdateUserRequest, User, UserRow,
    },
};

const USER_COLUMNS: &str =
    "id, username, email, role, bio, first_name, last_name, is_superuser, confirmation_code";

const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           ROUND(AVG(r.score))::INT4 AS rating,
           c.name AS category_name, c.slug AS category_slug
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    LEFT JOIN reviews r ON r.title_id = t.id
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id AS title, u.username AS author, r.author_id,
           r.text, r.score, r.pub_date
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id AS review, u.username AS author, c.author_id,
           c.text, c.pub_date
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// One (title, genre) pair, used to attach genres to a batch of titles.
#[derive(FromRow)]
struct TitleGenreRow {
    title_id: i64,
    name: String,
    slug: String,
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Integrity rules live in the schema
/// (`migrations/`): UNIQUE constraints, `ON DELETE CASCADE` / `SET NULL`, and the
/// `(author_id, title_id)` constraint on reviews.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, sql: &str, value: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_pair(&self, username: &str, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND email = $2");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Loads the genres of every title in `ids`, keyed by title id.
    async fn load_genres(&self, ids: &[i64]) -> AppResult<HashMap<i64, Vec<Taxon>>> {
        let rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT tg.title_id, g.name, g.slug
            FROM title_genres tg
            JOIN genres g ON g.id = tg.genre_id
            WHERE tg.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_title: HashMap<i64, Vec<Taxon>> = HashMap::new();
        for row in rows {
            by_title.entry(row.title_id).or_default().push(Taxon {
                name: row.name,
                slug: row.slug,
            });
        }
        Ok(by_title)
    }

    async fn attach_genres(&self, rows: Vec<TitleRow>) -> AppResult<Vec<Title>> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut genres = self.load_genres(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let genre = genres.remove(&row.id).unwrap_or_default();
                row.into_title(genre)
            })
            .collect())
    }
}

/// Maps a unique violation to `Conflict`, naming the offending column when the
/// constraint follows the default `<table>_<column>_key` naming.
fn conflict_or_db(e: sqlx::Error, entity: &str) -> AppError {
    let constraint = match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    };

    match constraint {
        Some(name) => {
            let field = name
                .strip_suffix("_key")
                .and_then(|rest| rest.split_once('_'))
                .map(|(_, column)| column.to_string())
                .unwrap_or_else(|| "value".to_string());
            AppError::conflict(format!("{entity} with this {field}"))
        }
        None => AppError::Database(e),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Appends the `GET /titles` filters. Expects `t` (titles) and `c` (categories) in scope.
/// `%needle%` for ILIKE with the needle's `\\`, `%` and `_` taken literally.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_title_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    builder.push(" WHERE TRUE");

    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ");
        builder.push_bind(category.clone());
    }

    if let Some(genre) = &filter.genre {
        builder.push(
            " AND EXISTS (SELECT 1 FROM title_genres tg JOIN genres g ON g.id = tg.genre_id \
             WHERE tg.title_id = t.id AND g.slug = ",
        );
        builder.push_bind(genre.clone());
        builder.push(")");
    }

    if let Some(name) = &filter.name {
        builder.push(" AND t.name ILIKE ");
        builder.push_bind(like_pattern(name));
    }

    if let Some(year) = filter.year {
        builder.push(" AND t.year = ");
        builder.push_bind(year);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        self.fetch_user(&sql, username).await
    }

    async fn list_users(&self, search: Option<&str>, page: Pagination) -> AppResult<Page<User>> {
        let search = search.map(like_pattern);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE ($1::TEXT IS NULL OR username ILIKE $1)",
        )
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::TEXT IS NULL OR username ILIKE $1) \
             ORDER BY username LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(search.as_deref())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let results = rows
            .into_iter()
            .map(User::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Page { count, results })
    }

    async fn create_user(&self, req: CreateUserRequest) -> AppResult<User> {
        let role = req.role.unwrap_or_default();
        let sql = format!(
            "INSERT INTO users (username, email, role, bio, first_name, last_name) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&req.username)
            .bind(&req.email)
            .bind(role.as_str())
            .bind(&req.bio)
            .bind(&req.first_name)
            .bind(&req.last_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or_db(e, "user"))?;
        User::try_from(row)
    }

    /// Partial update via `COALESCE`: only fields present in `req` change.
    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                bio = COALESCE($5, bio),
                first_name = COALESCE($6, first_name),
                last_name = COALESCE($7, last_name)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&req.username)
            .bind(&req.email)
            .bind(req.role.map(|role| role.as_str()))
            .bind(&req.bio)
            .bind(&req.first_name)
            .bind(&req.last_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict_or_db(e, "user"))?
            .map(User::try_from)
            .transpose()
    }

    async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_user(&self, username: &str, email: &str) -> AppResult<User> {
        if let Some(user) = self.find_user_pair(username, email).await? {
            return Ok(user);
        }

        let sql = format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .bind(email)
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(row) => User::try_from(row),
            // A concurrent signup with the same pair may have won the insert.
            Err(e) if is_unique_violation(&e) => self
                .find_user_pair(username, email)
                .await?
                .ok_or_else(|| conflict_or_db(e, "user")),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_confirmation_code(&self, id: i64, code: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE users SET confirmation_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_superuser(&self, username: &str, email: &str) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (username, email, role, is_superuser)
            VALUES ($1, $2, 'admin', TRUE)
            ON CONFLICT (username) DO UPDATE SET role = 'admin', is_superuser = TRUE
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or_db(e, "user"))?;
        User::try_from(row)
    }

    // --- Categories & Genres ---

    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: Pagination,
    ) -> AppResult<Page<Taxon>> {
        let table = kind.table();
        let search = search.map(like_pattern);
        let filter = "($1::TEXT IS NULL OR name ILIKE $1)";

        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {filter}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT name, slug FROM {table} WHERE {filter} ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        let results = sqlx::query_as::<_, Taxon>(&sql)
            .bind(search.as_deref())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { count, results })
    }

    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<Option<Taxon>> {
        let sql = format!("SELECT name, slug FROM {} WHERE slug = $1", kind.table());
        Ok(sqlx::query_as::<_, Taxon>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_taxon(&self, kind: TaxonKind, req: CreateTaxonRequest) -> AppResult<Taxon> {
        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING name, slug",
            kind.table()
        );
        sqlx::query_as::<_, Taxon>(&sql)
            .bind(&req.name)
            .bind(&req.slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or_db(e, kind.label()))
    }

    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<bool> {
        let sql = format!("DELETE FROM {} WHERE slug = $1", kind.table());
        let result = sqlx::query(&sql).bind(slug).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Titles ---

    /// Filtered listing built with `QueryBuilder`, so every user-supplied value is
    /// bound rather than interpolated.
    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Page<Title>> {
        let page = filter.pagination();

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM titles t LEFT JOIN categories c ON c.id = t.category_id",
        );
        push_title_filters(&mut count_builder, filter);
        let count = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        push_title_filters(&mut builder, filter);
        builder.push(" GROUP BY t.id, c.id ORDER BY t.id DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        let rows = builder
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await?;

        let results = self.attach_genres(rows).await?;
        Ok(Page { count, results })
    }

    async fn get_title(&self, id: i64) -> AppResult<Option<Title>> {
        let sql = format!("{TITLE_SELECT} WHERE t.id = $1 GROUP BY t.id, c.id");
        let row = sqlx::query_as::<_, TitleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_genres(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_title(&self, req: CreateTitleRequest) -> AppResult<Title> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO titles (name, year, description, category_id)
            VALUES ($1, $2, $3, (SELECT id FROM categories WHERE slug = $4))
            RETURNING id
            "#,
        )
        .bind(&req.name)
        .bind(req.year)
        .bind(&req.description)
        .bind(req.category.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "title"))?;

        sqlx::query(
            "INSERT INTO title_genres (title_id, genre_id) SELECT $1, id FROM genres WHERE slug = ANY($2)",
        )
        .bind(id)
        .bind(req.genre.as_slice())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_title(id)
            .await?
            .ok_or_else(|| AppError::internal(format!("title {id} vanished after insert")))
    }

    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> AppResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = CASE
                    WHEN $5::TEXT IS NULL THEN category_id
                    ELSE (SELECT id FROM categories WHERE slug = $5)
                END
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(req.year)
        .bind(&req.description)
        .bind(req.category.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "title"))?;

        if updated.is_none() {
            return Ok(None);
        }

        if let Some(genre) = &req.genre {
            sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO title_genres (title_id, genre_id) SELECT $1, id FROM genres WHERE slug = ANY($2)",
            )
            .bind(id)
            .bind(genre.as_slice())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_title(id).await
    }

    async fn delete_title(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Reviews ---

    async fn list_reviews(&self, title_id: i64, page: Pagination) -> AppResult<Page<Review>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.id LIMIT $2 OFFSET $3");
        let results = sqlx::query_as::<_, Review>(&sql)
            .bind(title_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { count, results })
    }

    async fn get_review(&self, title_id: i64, id: i64) -> AppResult<Option<Review>> {
        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2");
        Ok(sqlx::query_as::<_, Review>(&sql)
            .bind(title_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn has_review(&self, title_id: i64, author_id: i64) -> AppResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE title_id = $1 AND author_id = $2)",
        )
        .bind(title_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Insert-and-join in one statement. The `(author_id, title_id)` constraint is
    /// the authority on duplicates; its violation becomes the duplicate-review error.
    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        req: CreateReviewRequest,
    ) -> AppResult<Review> {
        sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id AS title, u.username AS author, i.author_id,
                   i.text, i.score, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(title_id)
        .bind(author_id)
        .bind(&req.text)
        .bind(req.score)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_review()
            } else if is_foreign_key_violation(&e) {
                AppError::NotFound
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn update_review(&self, id: i64, req: UpdateReviewRequest) -> AppResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text),
                    score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id AS title, u.username AS author, i.author_id,
                   i.text, i.score, i.pub_date
            FROM updated i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(id)
        .bind(&req.text)
        .bind(req.score)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Comments ---

    async fn list_comments(&self, review_id: i64, page: Pagination) -> AppResult<Page<Comment>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.id DESC LIMIT $2 OFFSET $3"
        );
        let results = sqlx::query_as::<_, Comment>(&sql)
            .bind(review_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { count, results })
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> AppResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(review_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        req: CreateCommentRequest,
    ) -> AppResult<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id AS review, u.username AS author, i.author_id,
                   i.text, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review_id)
        .bind(author_id)
        .bind(&req.text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::NotFound
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn update_comment(
        &self,
        id: i64,
        req: UpdateCommentRequest,
    ) -> AppResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = COALESCE($2, text)
                WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id AS review, u.username AS author, i.author_id,
                   i.text, i.pub_date
            FROM updated i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(id)
        .bind(&req.text)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
