//! Services layer - Business logic
//!
//! This module contains the business logic of the Heritage backend.
//! Services are responsible for:
//! - Implementing business rules and validation
//! - Coordinating between repositories, storage and cache
//! - Writing the site modification audit trail

pub mod flag;
pub mod google;
pub mod image;
pub mod jwt;
pub mod password;
pub mod review;
pub mod site;
pub mod tag;
pub mod user;
pub mod validation;

pub use flag::{FlagService, FlagServiceError};
pub use google::{GoogleAuthError, GoogleAuthService, GoogleProfile};
pub use image::{ImageService, ImageServiceError, ImageUpload};
pub use jwt::{Claims, OAuthState, TokenService};
pub use password::{hash_password, verify_password};
pub use review::{ReviewService, ReviewServiceError};
pub use site::{CsvExport, SiteForm, SiteService, SiteServiceError};
pub use tag::{slugify, TagService, TagServiceError};
pub use user::{LoginInput, UserService, UserServiceError};
pub use validation::FieldErrors;
