//! Tag service
//!
//! Implements business logic for tag management:
//! - Slug normalisation of every tag name
//! - Create, rename and delete with the soft-delete rules below
//! - Lookups used by the site service and the public tag list
//!
//! Tag names are unique across deleted rows too. Creating a name that only
//! a deleted tag holds restores that tag; renaming onto it purges it.

use crate::cache::{keys, Cache};
use crate::db::repositories::TagRepository;
use crate::models::{total_pages, ListParams, Tag, TagOrder};
use crate::services::validation::FieldErrors;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// Minimum slug length
pub const TAG_MIN_LENGTH: usize = 3;
/// Maximum slug length
pub const TAG_MAX_LENGTH: usize = 50;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    /// An active tag already has the slug
    #[error("Tag already exists: {0}")]
    AlreadyExists(String),

    /// The tag is attached to live sites
    #[error("Tag is in use by {0} site(s)")]
    InUse(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Entry of the public tag list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: i64,
    pub name: String,
}

/// One page of the admin tag listing
#[derive(Debug, Clone)]
pub struct TagPage {
    pub tags: Vec<Tag>,
    pub total: i64,
    pub total_pages: u32,
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Option<Arc<Cache>>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo, cache: None }
    }

    /// Cache the public tag list in `cache`
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Admin listing, 25 per page
    pub async fn list_tags(
        &self,
        page: u32,
        search: Option<&str>,
        order: TagOrder,
    ) -> Result<TagPage, TagServiceError> {
        let params = ListParams::admin(page);
        let (tags, total) = self.repo.list_page(search, order, &params).await?;
        Ok(TagPage {
            tags,
            total,
            total_pages: total_pages(total, params.per_page),
        })
    }

    /// Every non-deleted tag, by name
    pub async fn list_all_tags(&self) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list_all().await?)
    }

    /// `[{id, name}]` for the public API, cached
    pub async fn public_tags(&self) -> Result<Vec<TagSummary>, TagServiceError> {
        let load = || async {
            let tags = self.repo.list_all().await?;
            Ok::<_, TagServiceError>(
                tags.into_iter()
                    .map(|t| TagSummary { id: t.id, name: t.name })
                    .collect(),
            )
        };

        match &self.cache {
            Some(cache) => cache.get_or_load(keys::PUBLIC_TAGS, load).await,
            None => load().await,
        }
    }

    pub async fn get_tag(&self, id: i64) -> Result<Option<Tag>, TagServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    pub async fn get_tags_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.get_by_ids(ids).await?)
    }

    /// Active tags whose slug matches one of `names` after slugification
    pub async fn get_tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut slugs: Vec<String> = names
            .iter()
            .map(|n| slugify(n))
            .filter(|s| !s.is_empty())
            .collect();
        slugs.sort();
        slugs.dedup();
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.repo.get_by_names(&slugs).await?)
    }

    pub async fn tags_for_site(&self, site_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list_for_site(site_id).await?)
    }

    /// Create a tag, restoring a soft-deleted one with the same slug.
    ///
    /// # Errors
    ///
    /// - `ValidationError` when the slug is empty or out of 3..=50 characters
    /// - `AlreadyExists` when an active tag has the slug
    pub async fn create_tag(&self, name: &str) -> Result<Tag, TagServiceError> {
        let slug = validate_name(name)?;

        let tag = match self.repo.find_by_name_any(&slug).await? {
            Some(existing) if !existing.deleted => {
                tracing::warn!("Tag {} already exists", slug);
                return Err(TagServiceError::AlreadyExists(slug));
            }
            Some(deleted) => {
                self.repo.restore(deleted.id).await?;
                tracing::info!("Restored tag {} ({})", deleted.id, slug);
                Tag {
                    deleted: false,
                    ..deleted
                }
            }
            None => {
                let tag = self.repo.create(&slug).await?;
                tracing::info!("Created tag {} ({})", tag.id, slug);
                tag
            }
        };

        self.invalidate().await;
        Ok(tag)
    }

    /// Rename a tag.
    ///
    /// A soft-deleted tag holding the new slug is purged first.
    pub async fn update_tag(&self, id: i64, name: &str) -> Result<Tag, TagServiceError> {
        let slug = validate_name(name)?;
        let tag = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(TagServiceError::NotFound)?;

        if tag.name == slug {
            tracing::debug!("Tag {} unchanged", id);
            return Ok(tag);
        }

        if let Some(holder) = self.repo.find_by_name_any(&slug).await? {
            if !holder.deleted {
                return Err(TagServiceError::AlreadyExists(slug));
            }
            self.repo.hard_delete(holder.id).await?;
            tracing::info!("Purged deleted tag {} to free {}", holder.id, slug);
        }

        self.repo.rename(id, &slug).await?;
        tracing::info!("Renamed tag {} from {} to {}", id, tag.name, slug);
        self.invalidate().await;

        Ok(Tag { name: slug, ..tag })
    }

    /// Soft delete a tag that no live site uses
    pub async fn delete_tag(&self, id: i64) -> Result<(), TagServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(TagServiceError::NotFound);
        }

        let in_use = self.repo.count_active_sites(id).await?;
        if in_use > 0 {
            tracing::warn!("Refused to delete tag {} used by {} site(s)", id, in_use);
            return Err(TagServiceError::InUse(in_use));
        }

        self.repo.soft_delete(id).await?;
        tracing::info!("Deleted tag {}", id);
        self.invalidate().await;
        Ok(())
    }

    async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(keys::PUBLIC_TAGS).await;
        }
    }
}

/// Slugify and length-check a submitted tag name
fn validate_name(name: &str) -> Result<String, TagServiceError> {
    if name.trim().is_empty() {
        return Err(TagServiceError::ValidationError(FieldErrors::single(
            "name",
            "This field is required",
        )));
    }

    let slug = slugify(name);
    let len = slug.chars().count();
    if !(TAG_MIN_LENGTH..=TAG_MAX_LENGTH).contains(&len) {
        return Err(TagServiceError::ValidationError(FieldErrors::single(
            "name",
            format!(
                "Must be between {} and {} characters once normalised",
                TAG_MIN_LENGTH, TAG_MAX_LENGTH
            ),
        )));
    }
    Ok(slug)
}

/// URL-safe form of a tag name.
///
/// Decomposes accents (NFKD) and drops what is left outside ASCII, then
/// lowercases and collapses every run of other characters into one `-`.
///
/// ```ignore
/// assert_eq!(slugify("Época Colonial"), "epoca-colonial");
/// ```
pub fn slugify(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.to_ascii_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
