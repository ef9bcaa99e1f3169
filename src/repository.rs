use crate::models::{Project, ProjectDraft};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// Contract for every operation on the hosted `projects` table. Handlers only see
/// this trait, so the Postgres backend and the in-memory backend are interchangeable.
///
/// Store failures never propagate: implementations log them and return the
/// "nothing happened" value (`vec![]`, `None`, `false`). Callers treat that as
/// "leave the screen as it was".
#[async_trait]
pub trait Repository: Send + Sync {
    /// All projects, newest first.
    async fn list_projects(&self) -> Vec<Project>;
    /// Single project, used to load the edit selection into the form.
    async fn get_project(&self, id: Uuid) -> Option<Project>;
    /// Inserts a draft. The store assigns `id`, `created_at` and `updated_at`.
    async fn create_project(&self, draft: ProjectDraft) -> Option<Project>;
    /// Replaces the four editable fields of `id`. `None` when the id is unknown.
    async fn update_project(&self, id: Uuid, draft: ProjectDraft) -> Option<Project>;
    /// Returns true if a row was removed.
    async fn delete_project(&self, id: Uuid) -> bool;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// Backed by the hosted Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_projects(&self) -> Vec<Project> {
        match sqlx::query_as::<_, Project>(
            r#"SELECT id, title, description, url, image_url, created_at, updated_at
               FROM projects
               ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("list_projects error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_project(&self, id: Uuid) -> Option<Project> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, title, description, url, image_url, created_at, updated_at
               FROM projects
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_project error: {:?}", e);
            None
        })
    }

    async fn create_project(&self, draft: ProjectDraft) -> Option<Project> {
        match sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (title, description, url, image_url)
               VALUES ($1, $2, $3, $4)
               RETURNING id, title, description, url, image_url, created_at, updated_at"#,
        )
        .bind(draft.title)
        .bind(draft.description)
        .bind(draft.url)
        .bind(draft.image_url)
        .fetch_one(&self.pool)
        .await
        {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::error!("create_project error: {:?}", e);
                None
            }
        }
    }

    /// update_project
    ///
    /// `updated_at` is stamped by the query; `created_at` is never touched, so the
    /// gallery order is stable across edits.
    async fn update_project(&self, id: Uuid, draft: ProjectDraft) -> Option<Project> {
        sqlx::query_as::<_, Project>(
            r#"UPDATE projects
               SET title = $2, description = $3, url = $4, image_url = $5, updated_at = now()
               WHERE id = $1
               RETURNING id, title, description, url, image_url, created_at, updated_at"#,
        )
        .bind(id)
        .bind(draft.title)
        .bind(draft.description)
        .bind(draft.url)
        .bind(draft.image_url)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_project error: {:?}", e);
            None
        })
    }

    async fn delete_project(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_project error: {:?}", e);
                false
            }
        }
    }
}

/// MemoryRepository
///
/// Process-local table used when no `DATABASE_URL` is configured in `Env::Local`,
/// and by the test suite. Keeps rows in insertion order; listing sorts newest first.
#[derive(Default)]
pub struct MemoryRepository {
    rows: RwLock<Vec<Project>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table, e.g. with fixtures carrying fixed timestamps.
    pub fn with_projects(projects: Vec<Project>) -> Self {
        Self {
            rows: RwLock::new(projects),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_projects(&self) -> Vec<Project> {
        let mut projects = self.rows.read().await.clone();
        // Stable sort: rows created in the same instant keep "later insert first".
        projects.reverse();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    async fn get_project(&self, id: Uuid) -> Option<Project> {
        self.rows.read().await.iter().find(|p| p.id == id).cloned()
    }

    async fn create_project(&self, draft: ProjectDraft) -> Option<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            url: draft.url,
            image_url: draft.image_url,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(project.clone());
        Some(project)
    }

    async fn update_project(&self, id: Uuid, draft: ProjectDraft) -> Option<Project> {
        let mut rows = self.rows.write().await;
        let project = rows.iter_mut().find(|p| p.id == id)?;
        project.title = draft.title;
        project.description = draft.description;
        project.url = draft.url;
        project.image_url = draft.image_url;
        project.updated_at = Utc::now();
        Some(project.clone())
    }

    async fn delete_project(&self, id: Uuid) -> bool {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|p| p.id != id);
        rows.len() != before
    }
}
