//! Site image service
//!
//! Gallery management for historic sites: uploads with the per-site limit,
//! cover selection, soft deletion and reordering.

use crate::config::StorageConfig;
use crate::db::repositories::{ImageRepository, SiteRepository};
use crate::models::{Image, NewImage, MAX_IMAGES_PER_SITE};
use crate::storage::{site_image_key, validate_image, ObjectStorage, StorageError, UploadedFile};
use std::sync::Arc;

/// Title used when neither a title nor a usable file name is given
pub const UNTITLED: &str = "Sin título";

/// Titles shorter than this are replaced by `Imagen N`
const MIN_TITLE_LENGTH: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ImageServiceError {
    #[error("Site not found")]
    SiteNotFound,

    /// The request cannot be applied to the gallery
    #[error("{0}")]
    Invalid(String),

    /// The image belongs to another site
    #[error("Permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Upload(#[from] StorageError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// One file of an upload batch with its optional form metadata
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file: UploadedFile,
    pub title: Option<String>,
    pub description: Option<String>,
}

pub struct ImageService {
    images: Arc<dyn ImageRepository>,
    sites: Arc<dyn SiteRepository>,
    storage: Arc<dyn ObjectStorage>,
    config: StorageConfig,
}

impl ImageService {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        sites: Arc<dyn SiteRepository>,
        storage: Arc<dyn ObjectStorage>,
        config: StorageConfig,
    ) -> Self {
        Self {
            images,
            sites,
            storage,
            config,
        }
    }

    /// Non-deleted images of a site by `order_index`
    pub async fn active_images(&self, site_id: i64) -> Result<Vec<Image>, ImageServiceError> {
        Ok(self.images.list_active(site_id).await?)
    }

    /// Store a batch of images.
    ///
    /// Every file is validated before anything is written. The first image
    /// of a gallery becomes its cover.
    ///
    /// # Errors
    ///
    /// - `SiteNotFound` for a missing site
    /// - `Invalid` when the batch would exceed the per-site limit
    /// - `Upload` when a file is empty, too large or not an accepted image
    pub async fn upload_images(
        &self,
        site_id: i64,
        uploads: Vec<ImageUpload>,
    ) -> Result<Vec<Image>, ImageServiceError> {
        if self.sites.get_by_id(site_id).await?.is_none() {
            return Err(ImageServiceError::SiteNotFound);
        }
        let active = self.images.count_active(site_id).await? as usize;
        if active + uploads.len() > MAX_IMAGES_PER_SITE {
            tracing::warn!(
                "Rejected {} image(s) for site {} holding {}",
                uploads.len(),
                site_id,
                active
            );
            return Err(ImageServiceError::Invalid(format!(
                "A site can have at most {} images",
                MAX_IMAGES_PER_SITE
            )));
        }

        let mut extensions = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            extensions.push(validate_image(&self.config, &upload.file)?);
        }

        let mut created = Vec::with_capacity(uploads.len());
        for (position, (upload, extension)) in uploads.into_iter().zip(extensions).enumerate() {
            let key = site_image_key(site_id, extension);
            let stored = self
                .storage
                .put_object(&key, &upload.file.data, &upload.file.content_type)
                .await?;

            let title = image_title(upload.title.as_deref(), upload.file.stem(), active + position + 1);
            let new_image = NewImage {
                site_id,
                url: stored.url,
                object_key: stored.key,
                title,
                description: upload
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                order_index: (active + position) as i64,
                is_cover: active == 0 && position == 0,
                content_type: upload.file.content_type.clone(),
                size: upload.file.data.len() as i64,
            };

            match self.images.create(&new_image).await {
                Ok(image) => created.push(image),
                Err(e) => {
                    if let Err(cleanup) = self.storage.delete_object(&key).await {
                        tracing::warn!("Failed to remove orphaned object {}: {:#}", key, cleanup);
                    }
                    return Err(e.into());
                }
            }
        }

        tracing::info!("Uploaded {} image(s) to site {}", created.len(), site_id);
        Ok(created)
    }

    /// Make an image the only cover of its site
    pub async fn set_cover(&self, site_id: i64, image_id: i64) -> Result<(), ImageServiceError> {
        let image = self.images.get_by_id(image_id).await?;
        match image {
            Some(image) if image.site_id == site_id && !image.deleted => {
                self.images.set_cover(site_id, image_id).await?;
                tracing::info!("Image {} is now the cover of site {}", image_id, site_id);
                Ok(())
            }
            _ => Err(ImageServiceError::Invalid("Invalid image".to_string())),
        }
    }

    /// Soft delete an image; the cover must be changed first
    pub async fn delete_image(&self, site_id: i64, image_id: i64) -> Result<(), ImageServiceError> {
        let image = self
            .images
            .get_by_id(image_id)
            .await?
            .ok_or_else(|| ImageServiceError::Invalid("Invalid image".to_string()))?;

        if image.site_id != site_id {
            tracing::warn!("Image {} does not belong to site {}", image_id, site_id);
            return Err(ImageServiceError::PermissionDenied);
        }
        if image.is_cover {
            return Err(ImageServiceError::Invalid(
                "The cover image cannot be deleted. Choose another cover first.".to_string(),
            ));
        }

        self.images.soft_delete(image_id).await?;
        tracing::info!("Deleted image {} of site {}", image_id, site_id);
        Ok(())
    }

    /// Set `order_index` to the position in `image_ids`; foreign ids are skipped
    pub async fn reorder_images(&self, site_id: i64, image_ids: &[i64]) -> Result<(), ImageServiceError> {
        for (position, image_id) in image_ids.iter().enumerate() {
            self.images.set_order(site_id, *image_id, position as i64).await?;
        }
        tracing::debug!("Reordered {} image(s) of site {}", image_ids.len(), site_id);
        Ok(())
    }
}

/// Given title, else file stem, else [`UNTITLED`]; a stem shorter than
/// [`MIN_TITLE_LENGTH`] becomes `Imagen {number}`
fn image_title(title: Option<&str>, stem: Option<&str>, number: usize) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    match stem {
        Some(stem) if stem.chars().count() < MIN_TITLE_LENGTH => format!("Imagen {}", number),
        Some(stem) => stem.to_string(),
        None => UNTITLED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_site, setup_pool};
    use crate::db::repositories::{SqlxImageRepository, SqlxSiteRepository};
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    struct Fixture {
        service: ImageService,
        site_id: i64,
        other_site_id: i64,
        dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let site_id = insert_site(&pool, "Catedral").await;
        let other_site_id = insert_site(&pool, "Cabildo").await;
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let service = ImageService::new(
            SqlxImageRepository::boxed(pool.clone()),
            SqlxSiteRepository::boxed(pool),
            LocalStorage::boxed(&config),
            config,
        );
        Fixture {
            service,
            site_id,
            other_site_id,
            dir,
        }
    }

    fn upload(name: &str, title: Option<&str>) -> ImageUpload {
        ImageUpload {
            file: UploadedFile {
                file_name: name.to_string(),
                content_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
            title: title.map(str::to_string),
            description: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_image_title() {
        assert_eq!(image_title(Some(" Fachada "), Some("img"), 1), "Fachada");
        assert_eq!(image_title(None, Some("nave central"), 1), "nave central");
        assert_eq!(image_title(Some(" "), None, 1), UNTITLED);
        assert_eq!(image_title(None, Some("a"), 4), "Imagen 4");
        assert_eq!(image_title(Some("ab"), None, 2), "ab");
        assert_eq!(image_title(Some("Nx"), Some("fachada"), 1), "Nx");
    }

    #[tokio::test]
    async fn test_upload_sets_cover_order_and_titles() {
        let f = fixture().await;

        let images = f
            .service
            .upload_images(f.site_id, vec![upload("fachada.png", None), upload("x.png", Some("Nave"))])
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].is_cover);
        assert!(!images[1].is_cover);
        assert_eq!(images[0].title, "fachada");
        assert_eq!(images[1].title, "Nave");
        assert_eq!(images[1].order_index, 1);
        assert_eq!(images[0].description, None);
        assert!(images[0].object_key.starts_with(&format!("public/sites/{}/", f.site_id)));
        assert!(f.dir.path().join(&images[0].object_key).exists());

        let more = f
            .service
            .upload_images(f.site_id, vec![upload("ab.png", None)])
            .await
            .unwrap();
        assert!(!more[0].is_cover);
        assert_eq!(more[0].order_index, 2);
        assert_eq!(more[0].title, "Imagen 3");
    }

    #[tokio::test]
    async fn test_upload_limits() {
        let f = fixture().await;

        let batch: Vec<ImageUpload> = (0..11).map(|i| upload(&format!("img{}.png", i), None)).collect();
        assert!(matches!(
            f.service.upload_images(f.site_id, batch).await,
            Err(ImageServiceError::Invalid(_))
        ));

        let mut bad = upload("doc.pdf", None);
        bad.file.content_type = "application/pdf".to_string();
        assert!(matches!(
            f.service.upload_images(f.site_id, vec![upload("ok.png", None), bad]).await,
            Err(ImageServiceError::Upload(StorageError::InvalidType { .. }))
        ));
        // nothing was stored for the rejected batch
        assert!(f.service.active_images(f.site_id).await.unwrap().is_empty());

        assert!(matches!(
            f.service.upload_images(9999, vec![upload("ok.png", None)]).await,
            Err(ImageServiceError::SiteNotFound)
        ));
    }

    #[tokio::test]
    async fn test_cover_delete_and_reorder() {
        let f = fixture().await;
        let images = f
            .service
            .upload_images(
                f.site_id,
                vec![upload("uno.png", None), upload("dos.png", None), upload("tres.png", None)],
            )
            .await
            .unwrap();
        let (first, second, third) = (images[0].id, images[1].id, images[2].id);

        assert!(matches!(
            f.service.delete_image(f.site_id, first).await,
            Err(ImageServiceError::Invalid(_))
        ));
        assert!(matches!(
            f.service.delete_image(f.other_site_id, second).await,
            Err(ImageServiceError::PermissionDenied)
        ));
        assert!(f.service.set_cover(f.other_site_id, second).await.is_err());

        f.service.set_cover(f.site_id, second).await.unwrap();
        f.service.delete_image(f.site_id, first).await.unwrap();
        assert!(f.service.set_cover(f.site_id, first).await.is_err());

        f.service.reorder_images(f.site_id, &[third, second, 4242]).await.unwrap();
        let active = f.service.active_images(f.site_id).await.unwrap();
        assert_eq!(active.iter().map(|i| i.id).collect::<Vec<_>>(), vec![third, second]);
        assert_eq!(active.iter().filter(|i| i.is_cover).count(), 1);
    }
}
