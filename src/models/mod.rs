//! Data models
//!
//! Database entities of the heritage backend together with the inputs and
//! filters the services accept.

mod date_range;
mod flag;
mod image;
mod modification;
mod pagination;
mod review;
mod session;
mod site;
mod tag;
mod user;

pub use date_range::{unless_all, DateRange};
pub use flag::{FeatureFlag, FlagName};
pub use image::{Image, NewImage, MAX_IMAGES_PER_SITE};
pub use modification::{Modification, ModificationFilter, ModificationKind};
pub use pagination::{
    total_pages, ListParams, PagedResult, SortDirection, ADMIN_PAGE_SIZE, API_MAX_PAGE_SIZE,
    API_PAGE_SIZE,
};
pub use review::{Review, ReviewFilter, ReviewOrder, ReviewState, ReviewView};
pub use session::Session;
pub use site::{
    AdminSiteFilter, AdminSiteOrder, Category, ConservationState, GeoRadius, HistoricSite,
    ParseEnumError, PublicSiteOrder, PublicSiteQuery, SiteDetails, SiteInput,
};
pub use tag::{Tag, TagOrder};
pub use user::{
    NewUser, Permission, Role, User, UserFilter, UserInput, ROLE_ADMIN, ROLE_EDITOR, ROLE_PUBLIC,
};
