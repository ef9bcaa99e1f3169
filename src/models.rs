use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Project
///
/// A portfolio entry from the `projects` table. The `id` and both timestamps are
/// assigned by the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    // Link to the live project or its repository.
    pub url: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// The gallery card shows a GitHub marker instead of the generic external-link one.
    pub fn is_github(&self) -> bool {
        self.url.contains("github.com")
    }

    pub fn draft(&self) -> ProjectDraft {
        ProjectDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// ProjectDraft
///
/// The four editable fields. Used as the insert payload and as the full
/// replacement payload of an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image_url: String,
}

impl ProjectDraft {
    /// Name of the first blank field, if any. "Present" is the only validation applied.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("title", &self.title),
            ("description", &self.description),
            ("url", &self.url),
            ("image_url", &self.image_url),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// ProjectForm
///
/// The management form as posted by the browser. An empty or absent `editing_id`
/// means "add", a set one means "update that record".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub editing_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image_url: String,
}

impl ProjectForm {
    pub fn draft(&self) -> ProjectDraft {
        ProjectDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// SessionStatus
///
/// Read-only projection of the visitor's authentication state (GET /api/session).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatus {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    // Email of the signed-in visitor, when known.
    pub email: Option<String>,
}
