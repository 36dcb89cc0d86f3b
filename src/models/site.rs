//! Historic site model
//!
//! Besides the persisted [`HistoricSite`] row this module holds the inputs
//! and filters of the admin and public listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DateRange, Image, ListParams, ReviewView, Tag};

/// Conservation state of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConservationState {
    Bueno,
    Regular,
    Malo,
}

impl ConservationState {
    pub const ALL: [ConservationState; 3] = [
        ConservationState::Bueno,
        ConservationState::Regular,
        ConservationState::Malo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConservationState::Bueno => "bueno",
            ConservationState::Regular => "regular",
            ConservationState::Malo => "malo",
        }
    }
}

impl fmt::Display for ConservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored or submitted enum value is unknown
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for ConservationState {
    type Err = ParseEnumError;

    /// Case-insensitive parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bueno" => Ok(ConservationState::Bueno),
            "regular" => Ok(ConservationState::Regular),
            "malo" => Ok(ConservationState::Malo),
            _ => Err(ParseEnumError {
                kind: "state of conservation",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ConservationState {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A historic site row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoricSite {
    pub id: i64,
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub city: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    #[sqlx(try_from = "String")]
    pub state_of_conservation: ConservationState,
    pub inauguration_year: i32,
    pub visible: bool,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub visit_count: i64,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Site category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub deleted: bool,
}

/// Validated site fields, used for both creation and update
#[derive(Debug, Clone, PartialEq)]
pub struct SiteInput {
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub city: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    pub state_of_conservation: ConservationState,
    pub inauguration_year: i32,
    pub visible: bool,
    pub tag_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

/// A site with everything the JSON views need
#[derive(Debug, Clone)]
pub struct SiteDetails {
    pub site: HistoricSite,
    pub tags: Vec<Tag>,
    pub categories: Vec<Category>,
    /// Active images ordered by `order_index`
    pub images: Vec<Image>,
    /// Average of approved reviews
    pub rating: Option<f64>,
    /// Author of the creation record
    pub user_id: Option<i64>,
    /// Approved, non-deleted reviews
    pub reviews: Vec<ReviewView>,
}

impl SiteDetails {
    /// The cover image, else the first active image
    pub fn cover_image(&self) -> Option<&Image> {
        self.images
            .iter()
            .find(|img| img.is_cover)
            .or_else(|| self.images.first())
    }
}

/// Ordering of the admin site listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdminSiteOrder {
    #[default]
    NameAsc,
    NameDesc,
    CityAsc,
    CityDesc,
    Newest,
    Oldest,
}

impl AdminSiteOrder {
    /// Parse the admin query value, falling back to name A-Z
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("inverso_nombre") => AdminSiteOrder::NameDesc,
            Some("alfabetico_ciudad") => AdminSiteOrder::CityAsc,
            Some("inverso_ciudad") => AdminSiteOrder::CityDesc,
            Some("recientes") => AdminSiteOrder::Newest,
            Some("antiguos") => AdminSiteOrder::Oldest,
            _ => AdminSiteOrder::NameAsc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AdminSiteOrder::NameAsc => "s.name ASC, s.id ASC",
            AdminSiteOrder::NameDesc => "s.name DESC, s.id DESC",
            AdminSiteOrder::CityAsc => "s.city ASC, s.id ASC",
            AdminSiteOrder::CityDesc => "s.city DESC, s.id DESC",
            AdminSiteOrder::Newest => "s.inserted_at DESC, s.id DESC",
            AdminSiteOrder::Oldest => "s.inserted_at ASC, s.id ASC",
        }
    }
}

/// Filters of the admin site listing and the CSV export
#[derive(Debug, Clone, Default)]
pub struct AdminSiteFilter {
    /// Substring of name or short description
    pub search: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    /// Any of these tag ids
    pub tag_ids: Vec<i64>,
    pub state: Option<ConservationState>,
    pub visible_only: bool,
    /// Inclusive range on `inserted_at`
    pub date_range: Option<DateRange>,
    pub order: AdminSiteOrder,
}

/// Ordering of the public site listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublicSiteOrder {
    #[default]
    Latest,
    Oldest,
    RatingDesc,
    RatingAsc,
    MostVisited,
    LeastVisited,
}

impl PublicSiteOrder {
    pub const VALUES: [&'static str; 6] = [
        "latest",
        "oldest",
        "rating-5-1",
        "rating-1-5",
        "most-visited",
        "least-visited",
    ];
}

impl FromStr for PublicSiteOrder {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(PublicSiteOrder::Latest),
            "oldest" => Ok(PublicSiteOrder::Oldest),
            "rating-5-1" => Ok(PublicSiteOrder::RatingDesc),
            "rating-1-5" => Ok(PublicSiteOrder::RatingAsc),
            "most-visited" => Ok(PublicSiteOrder::MostVisited),
            "least-visited" => Ok(PublicSiteOrder::LeastVisited),
            _ => Err(ParseEnumError {
                kind: "order",
                value: s.to_string(),
            }),
        }
    }
}

/// Centre and radius (km) of a proximity search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRadius {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl GeoRadius {
    /// Mean Earth radius in kilometres
    pub const EARTH_RADIUS_KM: f64 = 6371.0088;

    /// Great-circle (haversine) distance in km to a point
    pub fn distance_km(&self, latitude: f64, longitude: f64) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().clamp(-1.0, 1.0).asin()
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_km(latitude, longitude) <= self.radius_km
    }

    /// Latitude band that contains the whole circle
    pub fn latitude_bounds(&self) -> (f64, f64) {
        let delta = self.radius_km / 111.0;
        ((self.latitude - delta).max(-90.0), (self.latitude + delta).min(90.0))
    }
}

/// Validated filters of the public site listing
#[derive(Debug, Clone, Default)]
pub struct PublicSiteQuery {
    pub name: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub state: Option<ConservationState>,
    /// Tag names, any match
    pub tags: Vec<String>,
    pub near: Option<GeoRadius>,
    /// Restrict to favourites of this user
    pub favorites_of: Option<i64>,
    pub order: PublicSiteOrder,
    pub params: ListParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservation_state_parse_is_case_insensitive() {
        assert_eq!("Bueno".parse::<ConservationState>().unwrap(), ConservationState::Bueno);
        assert_eq!(" MALO ".parse::<ConservationState>().unwrap(), ConservationState::Malo);
        assert!("excelente".parse::<ConservationState>().is_err());
        assert_eq!(ConservationState::Regular.to_string(), "regular");
    }

    #[test]
    fn test_admin_order_from_query() {
        assert_eq!(AdminSiteOrder::from_query(None), AdminSiteOrder::NameAsc);
        assert_eq!(AdminSiteOrder::from_query(Some("inverso_ciudad")), AdminSiteOrder::CityDesc);
        assert_eq!(AdminSiteOrder::from_query(Some("unknown")), AdminSiteOrder::NameAsc);
    }

    #[test]
    fn test_haversine_distance() {
        // La Plata to Buenos Aires is roughly 53 km
        let la_plata = GeoRadius {
            latitude: -34.9214,
            longitude: -57.9544,
            radius_km: 60.0,
        };
        let distance = la_plata.distance_km(-34.6037, -58.3816);
        assert!((distance - 53.0).abs() < 3.0, "{}", distance);
        assert!(la_plata.contains(-34.6037, -58.3816));
        assert!(!GeoRadius { radius_km: 10.0, ..la_plata }.contains(-34.6037, -58.3816));
        assert_eq!(la_plata.distance_km(-34.9214, -57.9544), 0.0);
    }

    #[test]
    fn test_public_order_values_round_trip() {
        for value in PublicSiteOrder::VALUES {
            assert!(value.parse::<PublicSiteOrder>().is_ok(), "{}", value);
        }
        assert!("best".parse::<PublicSiteOrder>().is_err());
    }
}
