use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{Repository, contains_ci, duplicate_review};
use crate::{
    error::{AppError, AppResult},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, CreateTaxonRequest,
        CreateTitleRequest, CreateUserRequest, Page, Pagination, Review, Role, Taxon, TaxonKind,
        Title, TitleFilter, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
        UpdateUserRequest, User,
    },
};

struct TaxonRecord {
    id: i64,
    name: String,
    slug: String,
}

struct TitleRecord {
    id: i64,
    name: String,
    year: Option<i32>,
    description: Option<String>,
    category_id: Option<i64>,
    genre_ids: Vec<i64>,
}

struct ReviewRecord {
    id: i64,
    title_id: i64,
    author_id: i64,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

struct CommentRecord {
    id: i64,
    review_id: i64,
    author_id: i64,
    text: String,
    pub_date: DateTime<Utc>,
}

/// Relational state held behind a single lock. Records reference each other by
/// id, like rows, and are joined into read models on the way out.
#[derive(Default)]
struct Store {
    last_id: i64,
    users: Vec<User>,
    categories: Vec<TaxonRecord>,
    genres: Vec<TaxonRecord>,
    titles: Vec<TitleRecord>,
    reviews: Vec<ReviewRecord>,
    comments: Vec<CommentRecord>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn taxa(&self, kind: TaxonKind) -> &Vec<TaxonRecord> {
        match kind {
            TaxonKind::Category => &self.categories,
            TaxonKind::Genre => &self.genres,
        }
    }

    fn taxa_mut(&mut self, kind: TaxonKind) -> &mut Vec<TaxonRecord> {
        match kind {
            TaxonKind::Category => &mut self.categories,
            TaxonKind::Genre => &mut self.genres,
        }
    }

    fn taxon_id(&self, kind: TaxonKind, slug: &str) -> Option<i64> {
        self.taxa(kind)
            .iter()
            .find(|record| record.slug == slug)
            .map(|record| record.id)
    }

    fn genre_ids(&self, slugs: &[String]) -> Vec<i64> {
        let mut ids: Vec<i64> = slugs
            .iter()
            .filter_map(|slug| self.taxon_id(TaxonKind::Genre, slug))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn username_of(&self, user_id: i64) -> String {
        self.users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    /// Rejects a username or email already held by an account other than `except`.
    fn check_user_unique(&self, username: &str, email: &str, except: Option<i64>) -> AppResult<()> {
        let others = self.users.iter().filter(|user| Some(user.id) != except);
        for user in others {
            if user.username == username {
                return Err(AppError::conflict("user with this username"));
            }
            if user.email == email {
                return Err(AppError::conflict("user with this email"));
            }
        }
        Ok(())
    }

    fn rating(&self, title_id: i64) -> Option<i32> {
        let scores: Vec<i32> = self
            .reviews
            .iter()
            .filter(|review| review.title_id == title_id)
            .map(|review| review.score)
            .collect();
        if scores.is_empty() {
            return None;
        }
        let mean = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64;
        Some(mean.round() as i32)
    }

    fn title_view(&self, record: &TitleRecord) -> Title {
        let taxon = |r: &TaxonRecord| Taxon {
            name: r.name.clone(),
            slug: r.slug.clone(),
        };

        let mut genre: Vec<Taxon> = self
            .genres
            .iter()
            .filter(|g| record.genre_ids.contains(&g.id))
            .map(taxon)
            .collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));

        let category = record
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(taxon);

        Title {
            id: record.id,
            name: record.name.clone(),
            year: record.year,
            description: record.description.clone(),
            rating: self.rating(record.id),
            genre,
            category,
        }
    }

    fn review_view(&self, record: &ReviewRecord) -> Review {
        Review {
            id: record.id,
            title: record.title_id,
            author: self.username_of(record.author_id),
            author_id: record.author_id,
            text: record.text.clone(),
            score: record.score,
            pub_date: record.pub_date,
        }
    }

    fn comment_view(&self, record: &CommentRecord) -> Comment {
        Comment {
            id: record.id,
            review: record.review_id,
            author: self.username_of(record.author_id),
            author_id: record.author_id,
            text: record.text.clone(),
            pub_date: record.pub_date,
        }
    }

    /// Drops the given reviews and every comment under them.
    fn remove_reviews(&mut self, doomed: impl Fn(&ReviewRecord) -> bool) {
        let review_ids: Vec<i64> = self
            .reviews
            .iter()
            .filter(|r| doomed(*r))
            .map(|r| r.id)
            .collect();
        self.reviews.retain(|r| !review_ids.contains(&r.id));
        self.comments.retain(|c| !review_ids.contains(&c.review_id));
    }
}

/// MemoryRepository
///
/// `Repository` kept entirely in process. Backs the test suites and local runs
/// without a database, and enforces the same uniqueness and cascade rules as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    // --- Users ---

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store.users.iter().find(|user| user.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list_users(&self, search: Option<&str>, page: Pagination) -> AppResult<Page<User>> {
        let store = self.store.lock().await;
        let mut users: Vec<User> = store
            .users
            .iter()
            .filter(|user| search.is_none_or(|needle| contains_ci(&user.username, needle)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(page.slice(users))
    }

    async fn create_user(&self, req: CreateUserRequest) -> AppResult<User> {
        let mut store = self.store.lock().await;
        store.check_user_unique(&req.username, &req.email, None)?;

        let user = User {
            id: store.next_id(),
            username: req.username,
            email: req.email,
            role: req.role.unwrap_or_default(),
            bio: req.bio,
            first_name: req.first_name,
            last_name: req.last_name,
            is_superuser: false,
            confirmation_code: None,
        };
        store.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> AppResult<Option<User>> {
        let mut store = self.store.lock().await;
        let Some(current) = store.users.iter().find(|user| user.id == id).cloned() else {
            return Ok(None);
        };

        let username = req.username.unwrap_or(current.username);
        let email = req.email.unwrap_or(current.email);
        store.check_user_unique(&username, &email, Some(id))?;

        let updated = User {
            username,
            email,
            role: req.role.unwrap_or(current.role),
            bio: req.bio.or(current.bio),
            first_name: req.first_name.or(current.first_name),
            last_name: req.last_name.or(current.last_name),
            ..current
        };

        if let Some(slot) = store.users.iter_mut().find(|user| user.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.users.len();
        store.users.retain(|user| user.id != id);
        if store.users.len() == before {
            return Ok(false);
        }

        store.remove_reviews(|review| review.author_id == id);
        store.comments.retain(|comment| comment.author_id != id);
        Ok(true)
    }

    async fn get_or_create_user(&self, username: &str, email: &str) -> AppResult<User> {
        let mut store = self.store.lock().await;
        if let Some(user) = store
            .users
            .iter()
            .find(|user| user.username == username && user.email == email)
        {
            return Ok(user.clone());
        }

        store.check_user_unique(username, email, None)?;
        let user = User {
            id: store.next_id(),
            username: username.to_string(),
            email: email.to_string(),
            ..User::default()
        };
        store.users.push(user.clone());
        Ok(user)
    }

    async fn set_confirmation_code(&self, id: i64, code: Option<&str>) -> AppResult<()> {
        let mut store = self.store.lock().await;
        if let Some(user) = store.users.iter_mut().find(|user| user.id == id) {
            user.confirmation_code = code.map(str::to_string);
        }
        Ok(())
    }

    async fn ensure_superuser(&self, username: &str, email: &str) -> AppResult<User> {
        let mut store = self.store.lock().await;
        if let Some(user) = store.users.iter_mut().find(|user| user.username == username) {
            user.role = Role::Admin;
            user.is_superuser = true;
            return Ok(user.clone());
        }

        store.check_user_unique(username, email, None)?;
        let user = User {
            id: store.next_id(),
            username: username.to_string(),
            email: email.to_string(),
            role: Role::Admin,
            is_superuser: true,
            ..User::default()
        };
        store.users.push(user.clone());
        Ok(user)
    }

    // --- Categories & Genres ---

    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: Pagination,
    ) -> AppResult<Page<Taxon>> {
        let store = self.store.lock().await;
        let taxa: Vec<Taxon> = store
            .taxa(kind)
            .iter()
            .rev()
            .filter(|record| search.is_none_or(|needle| contains_ci(&record.name, needle)))
            .map(|record| Taxon {
                name: record.name.clone(),
                slug: record.slug.clone(),
            })
            .collect();
        Ok(page.slice(taxa))
    }

    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<Option<Taxon>> {
        let store = self.store.lock().await;
        Ok(store
            .taxa(kind)
            .iter()
            .find(|record| record.slug == slug)
            .map(|record| Taxon {
                name: record.name.clone(),
                slug: record.slug.clone(),
            }))
    }

    async fn create_taxon(&self, kind: TaxonKind, req: CreateTaxonRequest) -> AppResult<Taxon> {
        let mut store = self.store.lock().await;
        for record in store.taxa(kind) {
            if record.name == req.name {
                return Err(AppError::conflict(format!("{} with this name", kind.label())));
            }
            if record.slug == req.slug {
                return Err(AppError::conflict(format!("{} with this slug", kind.label())));
            }
        }

        let id = store.next_id();
        store.taxa_mut(kind).push(TaxonRecord {
            id,
            name: req.name.clone(),
            slug: req.slug.clone(),
        });
        Ok(Taxon {
            name: req.name,
            slug: req.slug,
        })
    }

    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<bool> {
        let mut store = self.store.lock().await;
        let Some(id) = store.taxon_id(kind, slug) else {
            return Ok(false);
        };
        store.taxa_mut(kind).retain(|record| record.id != id);

        for title in store.titles.iter_mut() {
            match kind {
                TaxonKind::Category if title.category_id == Some(id) => title.category_id = None,
                TaxonKind::Genre => title.genre_ids.retain(|&genre_id| genre_id != id),
                _ => {}
            }
        }
        Ok(true)
    }

    // --- Titles ---

    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Page<Title>> {
        let store = self.store.lock().await;
        let category_id = filter
            .category
            .as_deref()
            .map(|slug| store.taxon_id(TaxonKind::Category, slug));
        let genre_id = filter
            .genre
            .as_deref()
            .map(|slug| store.taxon_id(TaxonKind::Genre, slug));

        let titles: Vec<Title> = store
            .titles
            .iter()
            .rev()
            .filter(|t| category_id.is_none_or(|id| id.is_some() && t.category_id == id))
            .filter(|t| genre_id.is_none_or(|id| id.is_some_and(|id| t.genre_ids.contains(&id))))
            .filter(|t| {
                filter
                    .name
                    .as_deref()
                    .is_none_or(|needle| contains_ci(&t.name, needle))
            })
            .filter(|t| filter.year.is_none_or(|year| t.year == Some(year)))
            .map(|t| store.title_view(t))
            .collect();

        Ok(filter.pagination().slice(titles))
    }

    async fn get_title(&self, id: i64) -> AppResult<Option<Title>> {
        let store = self.store.lock().await;
        Ok(store
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|t| store.title_view(t)))
    }

    async fn create_title(&self, req: CreateTitleRequest) -> AppResult<Title> {
        let mut store = self.store.lock().await;
        if store.titles.iter().any(|t| t.name == req.name) {
            return Err(AppError::conflict("title with this name"));
        }

        let record = TitleRecord {
            id: store.next_id(),
            name: req.name,
            year: req.year,
            description: req.description,
            category_id: req
                .category
                .as_deref()
                .and_then(|slug| store.taxon_id(TaxonKind::Category, slug)),
            genre_ids: store.genre_ids(&req.genre),
        };
        let title = store.title_view(&record);
        store.titles.push(record);
        Ok(title)
    }

    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> AppResult<Option<Title>> {
        let mut store = self.store.lock().await;
        if !store.titles.iter().any(|t| t.id == id) {
            return Ok(None);
        }
        let name_taken = req
            .name
            .as_ref()
            .is_some_and(|name| store.titles.iter().any(|t| t.id != id && &t.name == name));
        if name_taken {
            return Err(AppError::conflict("title with this name"));
        }

        let category_id = req
            .category
            .as_deref()
            .map(|slug| store.taxon_id(TaxonKind::Category, slug));
        let genre_ids = req.genre.as_deref().map(|slugs| store.genre_ids(slugs));

        let Some(record) = store.titles.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            record.name = name;
        }
        if let Some(year) = req.year {
            record.year = Some(year);
        }
        if let Some(description) = req.description {
            record.description = Some(description);
        }
        if let Some(category_id) = category_id {
            record.category_id = category_id;
        }
        if let Some(genre_ids) = genre_ids {
            record.genre_ids = genre_ids;
        }

        Ok(store
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|t| store.title_view(t)))
    }

    async fn delete_title(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.titles.len();
        store.titles.retain(|t| t.id != id);
        if store.titles.len() == before {
            return Ok(false);
        }
        store.remove_reviews(|review| review.title_id == id);
        Ok(true)
    }

    // --- Reviews ---

    async fn list_reviews(&self, title_id: i64, page: Pagination) -> AppResult<Page<Review>> {
        let store = self.store.lock().await;
        let reviews: Vec<Review> = store
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| store.review_view(r))
            .collect();
        Ok(page.slice(reviews))
    }

    async fn get_review(&self, title_id: i64, id: i64) -> AppResult<Option<Review>> {
        let store = self.store.lock().await;
        Ok(store
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == id)
            .map(|r| store.review_view(r)))
    }

    async fn has_review(&self, title_id: i64, author_id: i64) -> AppResult<bool> {
        let store = self.store.lock().await;
        Ok(store
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id))
    }

    /// The existence check and the insert share one lock acquisition, so two
    /// concurrent submissions cannot both pass.
    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        req: CreateReviewRequest,
    ) -> AppResult<Review> {
        let mut store = self.store.lock().await;
        if !store.titles.iter().any(|t| t.id == title_id)
            || !store.users.iter().any(|u| u.id == author_id)
        {
            return Err(AppError::NotFound);
        }
        if store
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id)
        {
            return Err(duplicate_review());
        }

        let record = ReviewRecord {
            id: store.next_id(),
            title_id,
            author_id,
            text: req.text,
            score: req.score,
            pub_date: Utc::now(),
        };
        let review = store.review_view(&record);
        store.reviews.push(record);
        Ok(review)
    }

    async fn update_review(&self, id: i64, req: UpdateReviewRequest) -> AppResult<Option<Review>> {
        let mut store = self.store.lock().await;
        let Some(record) = store.reviews.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(text) = req.text {
            record.text = text;
        }
        if let Some(score) = req.score {
            record.score = score;
        }

        Ok(store
            .reviews
            .iter()
            .find(|r| r.id == id)
            .map(|r| store.review_view(r)))
    }

    async fn delete_review(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.lock().await;
        let existed = store.reviews.iter().any(|r| r.id == id);
        store.remove_reviews(|review| review.id == id);
        Ok(existed)
    }

    // --- Comments ---

    async fn list_comments(&self, review_id: i64, page: Pagination) -> AppResult<Page<Comment>> {
        let store = self.store.lock().await;
        let comments: Vec<Comment> = store
            .comments
            .iter()
            .rev()
            .filter(|c| c.review_id == review_id)
            .map(|c| store.comment_view(c))
            .collect();
        Ok(page.slice(comments))
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> AppResult<Option<Comment>> {
        let store = self.store.lock().await;
        Ok(store
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == id)
            .map(|c| store.comment_view(c)))
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        req: CreateCommentRequest,
    ) -> AppResult<Comment> {
        let mut store = self.store.lock().await;
        if !store.reviews.iter().any(|r| r.id == review_id)
            || !store.users.iter().any(|u| u.id == author_id)
        {
            return Err(AppError::NotFound);
        }

        let record = CommentRecord {
            id: store.next_id(),
            review_id,
            author_id,
            text: req.text,
            pub_date: Utc::now(),
        };
        let comment = store.comment_view(&record);
        store.comments.push(record);
        Ok(comment)
    }

    async fn update_comment(
        &self,
        id: i64,
        req: UpdateCommentRequest,
    ) -> AppResult<Option<Comment>> {
        let mut store = self.store.lock().await;
        let Some(record) = store.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(text) = req.text {
            record.text = text;
        }

        Ok(store
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| store.comment_view(c)))
    }

    async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.comments.len();
        store.comments.retain(|c| c.id != id);
        Ok(store.comments.len() != before)
    }
}
