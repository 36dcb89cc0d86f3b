//! Review service
//!
//! Visitors write reviews through the public API; they stay pending until a
//! moderator approves them. Only approved, non-deleted reviews are public
//! and count towards a site's rating.

use crate::db::repositories::{ReviewRepository, SiteRepository};
use crate::models::{
    ListParams, PagedResult, Review, ReviewFilter, ReviewState, ReviewView, SortDirection,
};
use crate::services::validation::FieldErrors;
use std::sync::Arc;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
pub const MIN_COMMENT_LENGTH: usize = 20;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_REJECTION_REASON_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ReviewServiceError {
    #[error("Review not found")]
    NotFound,

    #[error("Site not found")]
    SiteNotFound,

    /// The user already reviewed the site
    #[error("You have already reviewed this site")]
    AlreadyExists,

    /// The review is not in a state that allows the operation
    #[error("{0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for ReviewServiceError {
    fn from(errors: FieldErrors) -> Self {
        ReviewServiceError::ValidationError(errors)
    }
}

pub struct ReviewService {
    reviews: Arc<dyn ReviewRepository>,
    sites: Arc<dyn SiteRepository>,
}

impl ReviewService {
    pub fn new(reviews: Arc<dyn ReviewRepository>, sites: Arc<dyn SiteRepository>) -> Self {
        Self { reviews, sites }
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    /// Admin listing, 25 per page
    pub async fn list_reviews_admin(
        &self,
        filter: &ReviewFilter,
        page: u32,
    ) -> Result<PagedResult<ReviewView>, ReviewServiceError> {
        let params = ListParams::admin(page);
        let (reviews, total) = self.reviews.list_admin(filter, &params).await?;
        Ok(PagedResult::new(reviews, total, &params))
    }

    pub async fn get_review(&self, id: i64) -> Result<Option<ReviewView>, ReviewServiceError> {
        Ok(self.reviews.get_view(id).await?)
    }

    pub async fn approve_review(&self, id: i64) -> Result<(), ReviewServiceError> {
        let review = self.existing(id).await?;
        self.reviews.set_state(review.id, ReviewState::Approved, None).await?;
        tracing::info!("Approved review {} of site {}", review.id, review.site_id);
        Ok(())
    }

    /// Reject with a mandatory reason of at most 200 characters
    pub async fn reject_review(&self, id: i64, reason: Option<&str>) -> Result<(), ReviewServiceError> {
        let review = self.existing(id).await?;
        if review.state == ReviewState::Rejected {
            return Err(ReviewServiceError::Conflict(
                "The review is already rejected".to_string(),
            ));
        }

        let mut errors = FieldErrors::new();
        let reason = errors.require("reason", reason);
        if let Some(reason) = &reason {
            errors.max_len("reason", reason, MAX_REJECTION_REASON_LENGTH);
        }
        errors.into_result()?;

        self.reviews
            .set_state(review.id, ReviewState::Rejected, reason.as_deref())
            .await?;
        tracing::info!("Rejected review {} of site {}", review.id, review.site_id);
        Ok(())
    }

    pub async fn delete_review(&self, id: i64) -> Result<(), ReviewServiceError> {
        let review = self.existing(id).await?;
        self.reviews.soft_delete(review.id).await?;
        tracing::info!("Deleted review {} of site {}", review.id, review.site_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public API
    // ------------------------------------------------------------------

    /// Create a pending review.
    ///
    /// # Errors
    ///
    /// - `SiteNotFound` when the site is missing or deleted
    /// - `AlreadyExists` when the user has a non-deleted review of the site
    /// - `ValidationError` for a rating outside 1..=5 or a comment outside
    ///   20..=1000 characters
    pub async fn create_review(
        &self,
        user_id: i64,
        site_id: i64,
        rating: Option<i64>,
        comment: Option<&str>,
    ) -> Result<Review, ReviewServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(ReviewServiceError::SiteNotFound);
        }
        if self.reviews.exists_for(user_id, site_id).await? {
            tracing::warn!("User {} tried to review site {} twice", user_id, site_id);
            return Err(ReviewServiceError::AlreadyExists);
        }

        let (rating, comment) = validate_review(rating, comment)?;
        let review = self.reviews.create(site_id, user_id, rating, &comment).await?;
        tracing::info!("User {} reviewed site {} ({}/5)", user_id, site_id, rating);
        Ok(review)
    }

    /// A review of the given site, whatever its state
    pub async fn review_of_site(
        &self,
        site_id: i64,
        review_id: i64,
    ) -> Result<ReviewView, ReviewServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(ReviewServiceError::SiteNotFound);
        }
        self.reviews
            .get_view(review_id)
            .await?
            .filter(|r| r.site_id == site_id)
            .ok_or(ReviewServiceError::NotFound)
    }

    /// Approved reviews of a site, newest first
    pub async fn approved_for_site(
        &self,
        site_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<ReviewView>, ReviewServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(ReviewServiceError::SiteNotFound);
        }
        let (reviews, total) = self.reviews.approved_for_site(site_id, params).await?;
        Ok(PagedResult::new(reviews, total, params))
    }

    /// Approved reviews written by a user
    pub async fn approved_for_user(
        &self,
        user_id: i64,
        direction: SortDirection,
        params: &ListParams,
    ) -> Result<PagedResult<ReviewView>, ReviewServiceError> {
        let (reviews, total) = self
            .reviews
            .approved_for_user(user_id, direction, params)
            .await?;
        Ok(PagedResult::new(reviews, total, params))
    }

    async fn existing(&self, id: i64) -> Result<Review, ReviewServiceError> {
        self.reviews
            .get_by_id(id)
            .await?
            .ok_or(ReviewServiceError::NotFound)
    }
}

/// Check a rating and comment pair, returning the trimmed comment
pub fn validate_review(rating: Option<i64>, comment: Option<&str>) -> Result<(i64, String), FieldErrors> {
    let mut errors = FieldErrors::new();

    match rating {
        Some(r) if (MIN_RATING..=MAX_RATING).contains(&r) => {}
        Some(_) => errors.add(
            "rating",
            format!("Must be between {} and {}", MIN_RATING, MAX_RATING),
        ),
        None => errors.add("rating", "This field is required"),
    }

    let comment = errors.require("comment", comment);
    if let Some(comment) = &comment {
        let length = comment.chars().count();
        if !(MIN_COMMENT_LENGTH..=MAX_COMMENT_LENGTH).contains(&length) {
            errors.add(
                "comment",
                format!(
                    "Must be between {} and {} characters",
                    MIN_COMMENT_LENGTH, MAX_COMMENT_LENGTH
                ),
            );
        }
    }

    errors.into_result()?;
    match (rating, comment) {
        (Some(rating), Some(comment)) => Ok((rating, comment)),
        _ => Err(FieldErrors::single("general", "Invalid review")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_site, insert_user, setup_pool};
    use crate::db::repositories::{SqlxReviewRepository, SqlxSiteRepository};
    use proptest::prelude::*;

    const COMMENT: &str = "Un lugar hermoso, muy bien conservado";

    async fn setup() -> (ReviewService, i64, i64) {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "visitor@example.com").await;
        let site_id = insert_site(&pool, "Catedral").await;
        let service = ReviewService::new(
            SqlxReviewRepository::boxed(pool.clone()),
            SqlxSiteRepository::boxed(pool),
        );
        (service, user_id, site_id)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_review() {
        assert_eq!(
            validate_review(Some(5), Some(&format!("  {}  ", COMMENT))).unwrap(),
            (5, COMMENT.to_string())
        );

        let errors = validate_review(Some(6), Some("corto")).unwrap_err();
        assert!(errors.has("rating"));
        assert!(errors.has("comment"));

        let errors = validate_review(None, None).unwrap_err();
        assert!(errors.has("rating"));
        assert!(errors.has("comment"));

        assert!(validate_review(Some(1), Some(&"a".repeat(1001))).is_err());
        assert!(validate_review(Some(1), Some(&"a".repeat(1000))).is_ok());
    }

    proptest! {
        #[test]
        fn prop_rating_bounds(rating in -10i64..20) {
            let ok = validate_review(Some(rating), Some(COMMENT)).is_ok();
            prop_assert_eq!(ok, (1..=5).contains(&rating));
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_create_once_per_user_and_site() {
        let (service, user_id, site_id) = setup().await;

        let review = service
            .create_review(user_id, site_id, Some(4), Some(COMMENT))
            .await
            .unwrap();
        assert_eq!(review.state, ReviewState::Pending);

        assert!(matches!(
            service.create_review(user_id, site_id, Some(3), Some(COMMENT)).await,
            Err(ReviewServiceError::AlreadyExists)
        ));
        assert!(matches!(
            service.create_review(user_id, 9999, Some(3), Some(COMMENT)).await,
            Err(ReviewServiceError::SiteNotFound)
        ));

        // deleting frees the slot
        service.delete_review(review.id).await.unwrap();
        assert!(service
            .create_review(user_id, site_id, Some(3), Some(COMMENT))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_moderation() {
        let (service, user_id, site_id) = setup().await;
        let review = service
            .create_review(user_id, site_id, Some(2), Some(COMMENT))
            .await
            .unwrap();
        let params = ListParams::default();

        assert_eq!(service.approved_for_site(site_id, &params).await.unwrap().total, 0);

        assert!(matches!(
            service.reject_review(review.id, Some("  ")).await,
            Err(ReviewServiceError::ValidationError(e)) if e.has("reason")
        ));
        assert!(service.reject_review(review.id, Some(&"x".repeat(201))).await.is_err());

        service.reject_review(review.id, Some("Lenguaje ofensivo")).await.unwrap();
        let rejected = service.get_review(review.id).await.unwrap().unwrap();
        assert_eq!(rejected.state, ReviewState::Rejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("Lenguaje ofensivo"));
        assert!(matches!(
            service.reject_review(review.id, Some("Otra vez")).await,
            Err(ReviewServiceError::Conflict(_))
        ));

        service.approve_review(review.id).await.unwrap();
        let approved = service.get_review(review.id).await.unwrap().unwrap();
        assert_eq!(approved.state, ReviewState::Approved);
        assert_eq!(approved.rejected_reason, None);

        let public = service.approved_for_site(site_id, &params).await.unwrap();
        assert_eq!(public.total, 1);
        let mine = service
            .approved_for_user(user_id, SortDirection::Asc, &params)
            .await
            .unwrap();
        assert_eq!(mine.items[0].id, review.id);

        assert!(matches!(
            service.approve_review(9999).await,
            Err(ReviewServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_review_of_site_checks_owner_site() {
        let (service, user_id, site_id) = setup().await;
        let review = service
            .create_review(user_id, site_id, Some(5), Some(COMMENT))
            .await
            .unwrap();

        assert_eq!(service.review_of_site(site_id, review.id).await.unwrap().id, review.id);
        assert!(matches!(
            service.review_of_site(9999, review.id).await,
            Err(ReviewServiceError::SiteNotFound)
        ));

        let admin_page = service
            .list_reviews_admin(&ReviewFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(admin_page.total, 1);
        assert_eq!(admin_page.per_page, 25);
    }
}
