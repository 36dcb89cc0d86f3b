//! Historic site service
//!
//! Implements business logic for historic sites:
//! - Validation of admin and API site payloads
//! - Create, update and delete, each recorded in the modification trail
//! - Admin and public listings, CSV export
//! - Assembly of the detail view (tags, categories, images, rating, reviews)
//! - Categories and favourites

use crate::cache::{keys, Cache};
use crate::db::repositories::{
    FavoriteRepository, ImageRepository, ModificationRepository, ReviewRepository, SiteRepository,
    TagRepository,
};
use crate::models::{
    AdminSiteFilter, Category, ConservationState, HistoricSite, ListParams, Modification,
    ModificationFilter, ModificationKind, PagedResult, PublicSiteQuery, SiteDetails, SiteInput,
};
use crate::services::tag::slugify;
use crate::services::validation::FieldErrors;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Locations closer than this (degrees) count as unchanged
pub const LOCATION_TOLERANCE: f64 = 1e-7;

/// Accepted inauguration years
pub const INAUGURATION_YEARS: std::ops::RangeInclusive<i64> = 1500..=2100;

/// Header row of the CSV export
pub const CSV_HEADERS: [&str; 12] = [
    "ID",
    "Nombre",
    "Descripcion breve",
    "Ciudad",
    "Provincia",
    "Estado de conservacion",
    "Anio de inauguracion",
    "Fecha de registro",
    "Latitud",
    "Longitud",
    "Visible",
    "Tags asociados",
];

/// Error types for site service operations
#[derive(Debug, thiserror::Error)]
pub enum SiteServiceError {
    #[error("Site not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for SiteServiceError {
    fn from(errors: FieldErrors) -> Self {
        SiteServiceError::ValidationError(errors)
    }
}

/// Raw site payload from the admin panel or the public API.
///
/// The API sends tag names in `tags`; the admin panel sends `tag_ids`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteForm {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude")]
    pub long: Option<f64>,
    pub state_of_conservation: Option<String>,
    pub inauguration_year: Option<i64>,
    pub visible: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub tag_ids: Option<Vec<i64>>,
    pub category_ids: Option<Vec<i64>>,
}

/// CSV export ready to download
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
}

pub struct SiteService {
    sites: Arc<dyn SiteRepository>,
    tags: Arc<dyn TagRepository>,
    images: Arc<dyn ImageRepository>,
    reviews: Arc<dyn ReviewRepository>,
    modifications: Arc<dyn ModificationRepository>,
    favorites: Arc<dyn FavoriteRepository>,
    cache: Option<Arc<Cache>>,
}

impl SiteService {
    pub fn new(
        sites: Arc<dyn SiteRepository>,
        tags: Arc<dyn TagRepository>,
        images: Arc<dyn ImageRepository>,
        reviews: Arc<dyn ReviewRepository>,
        modifications: Arc<dyn ModificationRepository>,
        favorites: Arc<dyn FavoriteRepository>,
    ) -> Self {
        Self {
            sites,
            tags,
            images,
            reviews,
            modifications,
            favorites,
            cache: None,
        }
    }

    /// Cache the province list in `cache`
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    // ------------------------------------------------------------------
    // Lookups and listings
    // ------------------------------------------------------------------

    pub async fn get_site(&self, id: i64) -> Result<Option<HistoricSite>, SiteServiceError> {
        Ok(self.sites.get_by_id(id).await?)
    }

    pub async fn get_site_by_name(&self, name: &str) -> Result<Option<HistoricSite>, SiteServiceError> {
        Ok(self.sites.get_by_name(name).await?)
    }

    pub async fn list_sites(&self) -> Result<Vec<HistoricSite>, SiteServiceError> {
        Ok(self.sites.list_all().await?)
    }

    /// Admin listing, 25 per page
    pub async fn list_sites_admin(
        &self,
        filter: &AdminSiteFilter,
        page: u32,
    ) -> Result<PagedResult<HistoricSite>, SiteServiceError> {
        let params = ListParams::admin(page);
        let (sites, total) = self.sites.list_admin(filter, Some(&params)).await?;
        Ok(PagedResult::new(sites, total, &params))
    }

    /// Public listing of visible sites
    pub async fn search_sites(&self, query: &PublicSiteQuery) -> Result<PagedResult<HistoricSite>, SiteServiceError> {
        let (sites, total) = self.sites.search_public(query).await?;
        Ok(PagedResult::new(sites, total, &query.params))
    }

    /// Everything the detail views render for a site
    pub async fn details(&self, site: HistoricSite) -> Result<SiteDetails, SiteServiceError> {
        let id = site.id;
        Ok(SiteDetails {
            tags: self.tags.list_for_site(id).await?,
            categories: self.sites.categories_for_site(id).await?,
            images: self.images.list_active(id).await?,
            rating: self.reviews.average_rating(id).await?,
            user_id: self.modifications.first_author(id).await?,
            reviews: self.reviews.all_approved_for_site(id).await?,
            site,
        })
    }

    pub async fn details_page(
        &self,
        page: PagedResult<HistoricSite>,
    ) -> Result<PagedResult<SiteDetails>, SiteServiceError> {
        let mut items = Vec::with_capacity(page.items.len());
        for site in page.items {
            items.push(self.details(site).await?);
        }
        Ok(PagedResult {
            items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Public detail view; counts the visit
    pub async fn visit_site(&self, id: i64) -> Result<SiteDetails, SiteServiceError> {
        if self.sites.get_by_id(id).await?.is_none() {
            return Err(SiteServiceError::NotFound);
        }
        self.sites.increment_visit_count(id).await?;

        let site = self.sites.get_by_id(id).await?.ok_or(SiteServiceError::NotFound)?;
        self.details(site).await
    }

    pub async fn increment_visit_count(&self, id: i64) -> Result<(), SiteServiceError> {
        Ok(self.sites.increment_visit_count(id).await?)
    }

    pub async fn list_cities(&self) -> Result<Vec<String>, SiteServiceError> {
        Ok(self.sites.list_cities().await?)
    }

    /// Distinct provinces, cached when a cache is configured
    pub async fn list_provinces(&self) -> Result<Vec<String>, SiteServiceError> {
        let load = || async { Ok::<_, SiteServiceError>(self.sites.list_provinces().await?) };
        match &self.cache {
            Some(cache) => cache.get_or_load(keys::PROVINCES, load).await,
            None => load().await,
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate a payload into [`SiteInput`].
    ///
    /// Tag names are slugified and unknown ones dropped; unknown tag and
    /// category ids are dropped as well.
    pub async fn validate_form(&self, form: &SiteForm) -> Result<SiteInput, SiteServiceError> {
        let mut errors = FieldErrors::new();

        let mut text = |field: &str, value: &Option<String>, max: usize| {
            let value = errors.require(field, value.as_deref());
            if let Some(v) = &value {
                errors.max_len(field, v, max);
            }
            value.unwrap_or_default()
        };
        let name = text("name", &form.name, 100);
        let short_description = text("short_description", &form.short_description, 255);
        let description = text("description", &form.description, 1000);
        let city = text("city", &form.city, 50);
        let province = text("province", &form.province, 50);

        match form.lat {
            None => errors.add("lat", "This field is required"),
            Some(lat) if !(-90.0..=90.0).contains(&lat) => errors.add("lat", "Must be a valid latitude"),
            _ => {}
        }
        match form.long {
            None => errors.add("long", "This field is required"),
            Some(long) if !(-180.0..=180.0).contains(&long) => {
                errors.add("long", "Must be a valid longitude")
            }
            _ => {}
        }

        let state = match form.state_of_conservation.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("state_of_conservation", "This field is required");
                None
            }
            Some(value) => match value.parse::<ConservationState>() {
                Ok(state) => Some(state),
                Err(_) => {
                    errors.add("state_of_conservation", "Must be one of: bueno, regular, malo");
                    None
                }
            },
        };

        match form.inauguration_year {
            None => errors.add("inauguration_year", "This field is required"),
            Some(year) if !INAUGURATION_YEARS.contains(&year) => errors.add(
                "inauguration_year",
                format!(
                    "Must be between {} and {}",
                    INAUGURATION_YEARS.start(),
                    INAUGURATION_YEARS.end()
                ),
            ),
            _ => {}
        }

        errors.into_result()?;
        let (Some(lat), Some(long), Some(state), Some(year)) =
            (form.lat, form.long, state, form.inauguration_year)
        else {
            return Err(FieldErrors::single("general", "Invalid site data").into());
        };

        Ok(SiteInput {
            name,
            short_description,
            description,
            city,
            province,
            latitude: lat,
            longitude: long,
            state_of_conservation: state,
            inauguration_year: year as i32,
            visible: form.visible.unwrap_or(false),
            tag_ids: self.resolve_tags(form).await?,
            category_ids: self.resolve_categories(form).await?,
        })
    }

    async fn resolve_tags(&self, form: &SiteForm) -> Result<Vec<i64>, SiteServiceError> {
        let mut ids = BTreeSet::new();

        if let Some(names) = &form.tags {
            let slugs: Vec<String> = names
                .iter()
                .map(|n| slugify(n))
                .filter(|s| !s.is_empty())
                .collect();
            ids.extend(self.tags.get_by_names(&slugs).await?.into_iter().map(|t| t.id));
        }
        if let Some(tag_ids) = &form.tag_ids {
            ids.extend(self.tags.get_by_ids(tag_ids).await?.into_iter().map(|t| t.id));
        }
        Ok(ids.into_iter().collect())
    }

    async fn resolve_categories(&self, form: &SiteForm) -> Result<Vec<i64>, SiteServiceError> {
        let Some(requested) = &form.category_ids else {
            return Ok(Vec::new());
        };
        let ids: BTreeSet<i64> = self
            .sites
            .get_categories_by_ids(requested)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn check_unique_name(&self, name: &str, current: Option<i64>) -> Result<(), SiteServiceError> {
        if let Some(existing) = self.sites.get_by_name(name).await? {
            if Some(existing.id) != current {
                tracing::warn!("Site name {} is already taken by {}", name, existing.id);
                return Err(FieldErrors::single("name", "A site with this name already exists").into());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a site and record its `creation` modification
    pub async fn create_site(&self, user_id: i64, input: &SiteInput) -> Result<HistoricSite, SiteServiceError> {
        self.check_unique_name(&input.name, None).await?;

        let id = self.sites.create(input).await?;
        self.modifications
            .create(id, user_id, &[ModificationKind::Creation])
            .await?;
        self.invalidate().await;

        tracing::info!("Site {} ({}) created by user {}", id, input.name, user_id);
        self.sites.get_by_id(id).await?.ok_or(SiteServiceError::NotFound)
    }

    /// Update a site; `None` when it does not exist.
    ///
    /// The modification is recorded even when nothing changed.
    pub async fn update_site(
        &self,
        id: i64,
        user_id: i64,
        input: &SiteInput,
    ) -> Result<Option<HistoricSite>, SiteServiceError> {
        let Some(current) = self.sites.get_by_id(id).await? else {
            return Ok(None);
        };
        self.check_unique_name(&input.name, Some(id)).await?;

        let current_tags = self.sites.tag_ids(id).await?;
        let current_categories = self.sites.category_ids(id).await?;
        let kinds = modification_kinds(&current, &current_tags, &current_categories, input);

        self.sites.update(id, input).await?;
        self.modifications.create(id, user_id, &kinds).await?;
        self.invalidate().await;

        if kinds.is_empty() {
            tracing::debug!("Site {} saved without changes by user {}", id, user_id);
        } else {
            tracing::info!("Site {} updated by user {}: {:?}", id, user_id, kinds);
        }
        Ok(self.sites.get_by_id(id).await?)
    }

    /// Soft delete a site and record its `deletion`
    pub async fn delete_site(&self, id: i64, user_id: i64) -> Result<(), SiteServiceError> {
        if self.sites.get_by_id(id).await?.is_none() {
            return Err(SiteServiceError::NotFound);
        }
        self.sites.soft_delete(id).await?;
        self.modifications
            .create(id, user_id, &[ModificationKind::Deletion])
            .await?;
        self.invalidate().await;

        tracing::info!("Site {} deleted by user {}", id, user_id);
        Ok(())
    }

    async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(keys::PROVINCES).await;
        }
    }

    // ------------------------------------------------------------------
    // Modifications
    // ------------------------------------------------------------------

    /// A site's audit trail, newest first, 25 per page
    pub async fn list_modifications(
        &self,
        site_id: i64,
        filter: &ModificationFilter,
        page: u32,
    ) -> Result<PagedResult<Modification>, SiteServiceError> {
        let params = ListParams::admin(page);
        let (items, total) = self.modifications.list(site_id, filter, &params).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    // ------------------------------------------------------------------
    // CSV export
    // ------------------------------------------------------------------

    /// Every site matching the admin filter, as CSV
    pub async fn export_csv(&self, filter: &AdminSiteFilter) -> Result<CsvExport, SiteServiceError> {
        self.export_csv_at(filter, Utc::now()).await
    }

    async fn export_csv_at(
        &self,
        filter: &AdminSiteFilter,
        now: DateTime<Utc>,
    ) -> Result<CsvExport, SiteServiceError> {
        let (sites, _) = self.sites.list_admin(filter, None).await?;

        let mut content = csv_line(CSV_HEADERS.iter().map(|h| h.to_string()));
        for site in &sites {
            let tags: Vec<String> = self
                .tags
                .list_for_site(site.id)
                .await?
                .into_iter()
                .map(|t| t.name)
                .collect();

            content.push_str(&csv_line([
                site.id.to_string(),
                site.name.clone(),
                site.short_description.clone(),
                site.city.clone(),
                site.province.clone(),
                site.state_of_conservation.to_string(),
                site.inauguration_year.to_string(),
                site.inserted_at.format("%Y-%m-%d").to_string(),
                site.latitude.to_string(),
                site.longitude.to_string(),
                if site.visible { "Si" } else { "No" }.to_string(),
                tags.join("|"),
            ]));
        }

        tracing::info!("Exported {} site(s) to CSV", sites.len());
        Ok(CsvExport {
            file_name: format!("sitios_{}.csv", now.format("%Y%m%d_%H%M")),
            content,
        })
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn create_category(&self, name: &str) -> Result<Category, SiteServiceError> {
        let mut errors = FieldErrors::new();
        let Some(name) = errors.require("name", Some(name)) else {
            return Err(errors.into());
        };
        errors.max_len("name", &name, 50);

        let existing = self.sites.list_categories().await?;
        if existing.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
            errors.add("name", "A category with this name already exists");
        }
        errors.into_result()?;

        let category = self.sites.create_category(&name).await?;
        tracing::info!("Created category {} ({})", category.id, category.name);
        Ok(category)
    }

    pub async fn get_categories_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>, SiteServiceError> {
        Ok(self.sites.get_categories_by_ids(ids).await?)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, SiteServiceError> {
        Ok(self.sites.list_categories().await?)
    }

    // ------------------------------------------------------------------
    // Favourites
    // ------------------------------------------------------------------

    pub async fn add_favorite(&self, user_id: i64, site_id: i64) -> Result<(), SiteServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(SiteServiceError::NotFound);
        }
        self.favorites.add(user_id, site_id).await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, user_id: i64, site_id: i64) -> Result<(), SiteServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(SiteServiceError::NotFound);
        }
        self.favorites.remove(user_id, site_id).await?;
        Ok(())
    }

    pub async fn is_favorite(&self, user_id: i64, site_id: i64) -> Result<bool, SiteServiceError> {
        Ok(self.favorites.is_favorite(user_id, site_id).await?)
    }

    pub async fn list_favorites(
        &self,
        user_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<HistoricSite>, SiteServiceError> {
        let (sites, total) = self.favorites.list(user_id, params).await?;
        Ok(PagedResult::new(sites, total, params))
    }
}

/// Kinds of change between a stored site and an update
pub fn modification_kinds(
    current: &HistoricSite,
    current_tags: &[i64],
    current_categories: &[i64],
    input: &SiteInput,
) -> Vec<ModificationKind> {
    let mut kinds = BTreeSet::new();

    if as_set(current_tags) != as_set(&input.tag_ids) {
        kinds.insert(ModificationKind::TagsChange);
    }
    if current.state_of_conservation != input.state_of_conservation {
        kinds.insert(ModificationKind::StateChange);
    }

    let moved = (current.latitude - input.latitude).abs() > LOCATION_TOLERANCE
        || (current.longitude - input.longitude).abs() > LOCATION_TOLERANCE;
    let edited = current.name != input.name
        || current.short_description != input.short_description
        || current.description != input.description
        || current.city != input.city
        || current.province != input.province
        || current.inauguration_year != input.inauguration_year
        || current.visible != input.visible
        || as_set(current_categories) != as_set(&input.category_ids);
    if moved || edited {
        kinds.insert(ModificationKind::Edit);
    }

    kinds.into_iter().collect()
}

fn as_set(ids: &[i64]) -> BTreeSet<i64> {
    ids.iter().copied().collect()
}

/// One CSV record, quoted where needed, ending in CRLF
fn csv_line(fields: impl IntoIterator<Item = String>) -> String {
    let fields: Vec<String> = fields
        .into_iter()
        .map(|field| {
            if field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field
            }
        })
        .collect();
    format!("{}\r\n", fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::{
        SqlxFavoriteRepository, SqlxImageRepository, SqlxModificationRepository,
        SqlxReviewRepository, SqlxSiteRepository, SqlxTagRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::PublicSiteOrder;
    use chrono::TimeZone;
    use proptest::prelude::*;

    struct Fixture {
        pool: DynDatabasePool,
        service: SiteService,
        tags: Arc<dyn TagRepository>,
        user_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let tags = SqlxTagRepository::boxed(pool.clone());
        let service = SiteService::new(
            SqlxSiteRepository::boxed(pool.clone()),
            tags.clone(),
            SqlxImageRepository::boxed(pool.clone()),
            SqlxReviewRepository::boxed(pool.clone()),
            SqlxModificationRepository::boxed(pool.clone()),
            SqlxFavoriteRepository::boxed(pool.clone()),
        );
        let user_id = insert_user(&pool, "editor@example.com").await;
        Fixture {
            pool,
            service,
            tags,
            user_id,
        }
    }

    fn form(name: &str) -> SiteForm {
        SiteForm {
            name: Some(name.to_string()),
            short_description: Some("Edificio emblemático".into()),
            description: Some("Sede del gobierno colonial".into()),
            city: Some("Buenos Aires".into()),
            province: Some("CABA".into()),
            lat: Some(-34.6081),
            long: Some(-58.3737),
            state_of_conservation: Some("Bueno".into()),
            inauguration_year: Some(1725),
            visible: Some(true),
            ..Default::default()
        }
    }

    fn site(input: &SiteInput) -> HistoricSite {
        HistoricSite {
            id: 1,
            name: input.name.clone(),
            short_description: input.short_description.clone(),
            description: input.description.clone(),
            city: input.city.clone(),
            province: input.province.clone(),
            latitude: input.latitude,
            longitude: input.longitude,
            state_of_conservation: input.state_of_conservation,
            inauguration_year: input.inauguration_year,
            visible: input.visible,
            deleted: false,
            visit_count: 0,
            inserted_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[tokio::test]
    async fn test_validate_form_reports_every_field() {
        let f = fixture().await;
        let bad = SiteForm {
            lat: Some(95.0),
            long: Some(-200.0),
            state_of_conservation: Some("excelente".into()),
            inauguration_year: Some(1200),
            ..Default::default()
        };

        let Err(SiteServiceError::ValidationError(errors)) = f.service.validate_form(&bad).await else {
            panic!("expected validation errors");
        };
        for field in [
            "name",
            "short_description",
            "description",
            "city",
            "province",
            "lat",
            "long",
            "state_of_conservation",
            "inauguration_year",
        ] {
            assert!(errors.has(field), "missing error for {}", field);
        }
    }

    #[tokio::test]
    async fn test_validate_form_resolves_tags() {
        let f = fixture().await;
        let colonial = f.tags.create("epoca-colonial").await.unwrap();
        let museo = f.tags.create("museo").await.unwrap();

        let mut payload = form("Cabildo");
        payload.tags = Some(vec!["Época Colonial".into(), "inexistente".into()]);
        payload.tag_ids = Some(vec![museo.id, 999]);

        let input = f.service.validate_form(&payload).await.unwrap();
        assert_eq!(input.state_of_conservation, ConservationState::Bueno);
        assert_eq!(input.tag_ids, vec![colonial.id, museo.id]);
        assert!(input.visible);
    }

    // ========================================================================
    // Create / update / delete
    // ========================================================================

    #[tokio::test]
    async fn test_create_records_creation_and_rejects_duplicates() {
        let f = fixture().await;
        let input = f.service.validate_form(&form("Cabildo")).await.unwrap();

        let site = f.service.create_site(f.user_id, &input).await.unwrap();
        let details = f.service.details(site.clone()).await.unwrap();
        assert_eq!(details.user_id, Some(f.user_id));
        assert_eq!(details.rating, None);

        let trail = f
            .service
            .list_modifications(site.id, &ModificationFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(trail.total, 1);
        assert_eq!(trail.items[0].kinds, vec![ModificationKind::Creation]);

        assert!(matches!(
            f.service.create_site(f.user_id, &input).await,
            Err(SiteServiceError::ValidationError(e)) if e.has("name")
        ));
    }

    #[tokio::test]
    async fn test_update_collects_kinds_and_always_records() {
        let f = fixture().await;
        let tag = f.tags.create("museo").await.unwrap();
        let input = f.service.validate_form(&form("Cabildo")).await.unwrap();
        let site = f.service.create_site(f.user_id, &input).await.unwrap();

        let unchanged = f.service.update_site(site.id, f.user_id, &input).await.unwrap();
        assert!(unchanged.is_some());

        let mut changed = input.clone();
        changed.state_of_conservation = ConservationState::Malo;
        changed.tag_ids = vec![tag.id];
        changed.latitude += 1e-9;
        f.service.update_site(site.id, f.user_id, &changed).await.unwrap();

        let trail = f
            .service
            .list_modifications(site.id, &ModificationFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(trail.total, 3);
        assert_eq!(
            trail.items[0].kinds,
            vec![ModificationKind::StateChange, ModificationKind::TagsChange]
        );
        assert!(trail.items[1].kinds.is_empty());

        assert!(f.service.update_site(9999, f.user_id, &input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_update_records_nothing() {
        let f = fixture().await;
        let input = f.service.validate_form(&form("Cabildo")).await.unwrap();
        let site = f.service.create_site(f.user_id, &input).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_site_update BEFORE UPDATE ON historic_sites BEGIN SELECT RAISE(ABORT, 'read only'); END",
        )
        .execute(f.pool.sqlite().unwrap())
        .await
        .unwrap();

        let mut changed = input.clone();
        changed.state_of_conservation = ConservationState::Malo;
        assert!(matches!(
            f.service.update_site(site.id, f.user_id, &changed).await,
            Err(SiteServiceError::InternalError(_))
        ));

        let trail = f
            .service
            .list_modifications(site.id, &ModificationFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(trail.total, 1);
        assert_eq!(trail.items[0].kinds, vec![ModificationKind::Creation]);
    }

    #[tokio::test]
    async fn test_update_rejects_name_of_other_site() {
        let f = fixture().await;
        let a = f.service.validate_form(&form("Cabildo")).await.unwrap();
        let b = f.service.validate_form(&form("Catedral")).await.unwrap();
        f.service.create_site(f.user_id, &a).await.unwrap();
        let second = f.service.create_site(f.user_id, &b).await.unwrap();

        assert!(matches!(
            f.service.update_site(second.id, f.user_id, &a).await,
            Err(SiteServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_site() {
        let f = fixture().await;
        let input = f.service.validate_form(&form("Cabildo")).await.unwrap();
        let site = f.service.create_site(f.user_id, &input).await.unwrap();

        f.service.delete_site(site.id, f.user_id).await.unwrap();
        assert!(f.service.get_site(site.id).await.unwrap().is_none());
        assert!(matches!(
            f.service.delete_site(site.id, f.user_id).await,
            Err(SiteServiceError::NotFound)
        ));

        // the name is free again
        f.service.create_site(f.user_id, &input).await.unwrap();
    }

    #[test]
    fn test_modification_kinds() {
        let input = SiteInput {
            name: "Faro".into(),
            short_description: "s".into(),
            description: "d".into(),
            city: "Mar del Plata".into(),
            province: "Buenos Aires".into(),
            latitude: -38.0,
            longitude: -57.5,
            state_of_conservation: ConservationState::Regular,
            inauguration_year: 1890,
            visible: false,
            tag_ids: vec![1, 2],
            category_ids: vec![3],
        };
        let current = site(&input);

        assert!(modification_kinds(&current, &[2, 1], &[3], &input).is_empty());

        let mut moved = input.clone();
        moved.longitude += 1e-6;
        assert_eq!(modification_kinds(&current, &[1, 2], &[3], &moved), vec![ModificationKind::Edit]);

        let mut recategorised = input.clone();
        recategorised.category_ids = vec![];
        assert_eq!(
            modification_kinds(&current, &[1, 2], &[3], &recategorised),
            vec![ModificationKind::Edit]
        );

        let mut retagged = input.clone();
        retagged.tag_ids = vec![1];
        retagged.visible = true;
        assert_eq!(
            modification_kinds(&current, &[1, 2], &[3], &retagged),
            vec![ModificationKind::Edit, ModificationKind::TagsChange]
        );
    }

    proptest! {
        #[test]
        fn prop_sub_tolerance_moves_are_not_edits(dlat in -9e-8f64..9e-8, dlon in -9e-8f64..9e-8) {
            let input = SiteInput {
                name: "Faro".into(),
                short_description: "s".into(),
                description: "d".into(),
                city: "c".into(),
                province: "p".into(),
                latitude: -38.0,
                longitude: -57.5,
                state_of_conservation: ConservationState::Bueno,
                inauguration_year: 1890,
                visible: true,
                tag_ids: vec![],
                category_ids: vec![],
            };
            let current = site(&input);
            let mut moved = input.clone();
            moved.latitude += dlat;
            moved.longitude += dlon;
            prop_assert!(modification_kinds(&current, &[], &[], &moved).is_empty());
        }
    }

    // ========================================================================
    // Listings, export, favourites
    // ========================================================================

    #[tokio::test]
    async fn test_visit_site_counts_and_hidden_sites_are_not_listed() {
        let f = fixture().await;
        let mut hidden = form("Oculto");
        hidden.visible = Some(false);
        let hidden = f.service.validate_form(&hidden).await.unwrap();
        let site = f.service.create_site(f.user_id, &hidden).await.unwrap();

        let details = f.service.visit_site(site.id).await.unwrap();
        assert_eq!(details.site.visit_count, 1);
        assert!(matches!(f.service.visit_site(9999).await, Err(SiteServiceError::NotFound)));

        let listed = f
            .service
            .search_sites(&PublicSiteQuery {
                order: PublicSiteOrder::Latest,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.total, 0);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let f = fixture().await;
        let tag = f.tags.create("museo").await.unwrap();
        let mut payload = form("Cabildo, \"viejo\"");
        payload.tag_ids = Some(vec![tag.id]);
        let input = f.service.validate_form(&payload).await.unwrap();
        f.service.create_site(f.user_id, &input).await.unwrap();

        let now = Utc.with_ymd_and_hms(2024, 5, 25, 9, 7, 0).unwrap();
        let export = f.service.export_csv_at(&AdminSiteFilter::default(), now).await.unwrap();
        assert_eq!(export.file_name, "sitios_20240525_0907.csv");

        let mut lines = export.content.lines();
        assert_eq!(lines.next(), Some(CSV_HEADERS.join(",").as_str()));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Cabildo, \"\"viejo\"\"\""));
        assert!(row.contains(",bueno,1725,"));
        assert!(row.ends_with(",Si,museo"));
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn test_categories() {
        let f = fixture().await;

        let category = f.service.create_category(" Religioso ").await.unwrap();
        assert_eq!(category.name, "Religioso");
        assert!(f.service.create_category("religioso").await.is_err());
        assert!(f.service.create_category("   ").await.is_err());

        let mut payload = form("Catedral");
        payload.category_ids = Some(vec![category.id, 77]);
        let input = f.service.validate_form(&payload).await.unwrap();
        assert_eq!(input.category_ids, vec![category.id]);
        assert_eq!(f.service.list_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_favorites_are_idempotent() {
        let f = fixture().await;
        let input = f.service.validate_form(&form("Cabildo")).await.unwrap();
        let site = f.service.create_site(f.user_id, &input).await.unwrap();
        let fan = insert_user(&f.pool, "fan@example.com").await;

        f.service.add_favorite(fan, site.id).await.unwrap();
        f.service.add_favorite(fan, site.id).await.unwrap();
        assert!(f.service.is_favorite(fan, site.id).await.unwrap());
        let page = f.service.list_favorites(fan, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);

        f.service.remove_favorite(fan, site.id).await.unwrap();
        f.service.remove_favorite(fan, site.id).await.unwrap();
        assert!(!f.service.is_favorite(fan, site.id).await.unwrap());
        assert!(matches!(
            f.service.add_favorite(fan, 9999).await,
            Err(SiteServiceError::NotFound)
        ));
    }

    #[test]
    fn test_csv_line_quoting() {
        assert_eq!(
            csv_line(["a".to_string(), "b,c".to_string(), "d\"e".to_string()]),
            "a,\"b,c\",\"d\"\"e\"\r\n"
        );
    }
}
