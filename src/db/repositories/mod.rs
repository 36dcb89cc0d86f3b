//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the persistence of one aggregate.

pub mod favorite;
pub mod filter;
pub mod flag;
pub mod image;
pub mod modification;
pub mod review;
pub mod role;
pub mod session;
pub mod site;
pub mod tag;
pub mod user;

pub use favorite::{FavoriteRepository, SqlxFavoriteRepository};
pub use flag::{FlagRepository, SqlxFlagRepository};
pub use image::{ImageRepository, SqlxImageRepository};
pub use modification::{ModificationRepository, SqlxModificationRepository};
pub use review::{ReviewRepository, SqlxReviewRepository};
pub use role::{RoleRepository, SqlxRoleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use site::{SiteRepository, SqlxSiteRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
