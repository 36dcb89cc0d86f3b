//! Common API utilities and shared types
//!
//! Query strings arrive as raw strings so that malformed values either fall
//! back to defaults (pagination of secondary listings) or are reported
//! field by field (the public site search).

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::api::middleware::ApiError;
use crate::models::{
    ConservationState, GeoRadius, ListParams, PublicSiteOrder, PublicSiteQuery, SortDirection,
    API_MAX_PAGE_SIZE, API_PAGE_SIZE,
};
use crate::services::FieldErrors;

pub const MIN_INAUGURATION_YEAR: i64 = 1500;
pub const MAX_INAUGURATION_YEAR: i64 = 2100;

// ============================================================================
// JSON bodies
// ============================================================================

/// JSON body whose shape errors are reported as `invalid_data`
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<serde_json::Value>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        serde_json::from_value(value).map(ValidJson).map_err(|e| {
            ApiError::with_details(
                "invalid_data",
                "Invalid data input",
                serde_json::json!({ "body": [e.to_string()] }),
            )
        })
    }
}

// ============================================================================
// Pagination Query Types
// ============================================================================

/// Pagination of public listings; unparsable values use the defaults
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub order_by: Option<String>,
}

impl PageQuery {
    /// Page size capped at 100, default 10
    pub fn params(&self) -> ListParams {
        let page = parse_or(self.page.as_deref(), 1u32);
        let per_page = parse_or(self.per_page.as_deref(), API_PAGE_SIZE);
        ListParams::new(page, per_page.min(API_MAX_PAGE_SIZE))
    }

    /// `asc`/`desc`, newest first otherwise
    pub fn direction(&self) -> SortDirection {
        self.order_by
            .as_deref()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }
}

/// Page number of admin listings
#[derive(Debug, Default, Deserialize)]
pub struct AdminPageQuery {
    pub page: Option<String>,
}

impl AdminPageQuery {
    pub fn page(&self) -> u32 {
        parse_or(self.page.as_deref(), 1u32).max(1)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<&str>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Blank query values count as absent
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Public site search
// ============================================================================

/// Raw query string of `GET /api/sites`
#[derive(Debug, Default, Deserialize)]
pub struct SiteSearchQuery {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub lat: Option<String>,
    pub long: Option<String>,
    pub radius: Option<String>,
    pub state_of_conservation: Option<String>,
    pub inauguration_year: Option<String>,
    pub tags: Option<String>,
    pub order_by: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub only_favorites: Option<String>,
}

impl SiteSearchQuery {
    pub fn only_favorites(&self) -> bool {
        self.only_favorites
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Validate into a [`PublicSiteQuery`], reporting every bad parameter.
    ///
    /// The geographic filter applies only when `lat`, `long` and `radius`
    /// are all present. `inauguration_year` is validated but not filtered on.
    pub fn parse(&self) -> Result<PublicSiteQuery, FieldErrors> {
        let mut errors = FieldErrors::new();

        let lat = number(&mut errors, "lat", self.lat.as_deref());
        let long = number(&mut errors, "long", self.long.as_deref());
        let radius = number(&mut errors, "radius", self.radius.as_deref());
        if lat.is_some_and(|v| !(-90.0..=90.0).contains(&v)) {
            errors.add("lat", "Must be a valid latitude");
        }
        if long.is_some_and(|v| !(-180.0..=180.0).contains(&v)) {
            errors.add("long", "Must be a valid longitude");
        }
        if radius.is_some_and(|v| v < 0.0) {
            errors.add("radius", "Must be greater than or equal to 0.");
        }

        if let Some(year) = integer(&mut errors, "inauguration_year", self.inauguration_year.as_deref()) {
            if !(MIN_INAUGURATION_YEAR..=MAX_INAUGURATION_YEAR).contains(&year) {
                errors.add(
                    "inauguration_year",
                    format!(
                        "Must be greater than or equal to {} and less than or equal to {}.",
                        MIN_INAUGURATION_YEAR, MAX_INAUGURATION_YEAR
                    ),
                );
            }
        }

        let state = match non_blank(self.state_of_conservation.as_deref()) {
            Some(value) => match value.parse::<ConservationState>() {
                Ok(state) => Some(state),
                Err(_) => {
                    errors.add("state_of_conservation", "Must be one of: bueno, regular, malo.");
                    None
                }
            },
            None => None,
        };

        let order = match non_blank(self.order_by.as_deref()) {
            Some(value) => value.parse::<PublicSiteOrder>().unwrap_or_else(|_| {
                errors.add(
                    "order_by",
                    format!("Must be one of: {}.", PublicSiteOrder::VALUES.join(", ")),
                );
                PublicSiteOrder::default()
            }),
            None => PublicSiteOrder::default(),
        };

        let page = integer(&mut errors, "page", self.page.as_deref()).unwrap_or(1);
        if page < 1 {
            errors.add("page", "Must be greater than or equal to 1.");
        }
        let per_page = integer(&mut errors, "per_page", self.per_page.as_deref())
            .unwrap_or(i64::from(API_PAGE_SIZE));
        if !(1..=i64::from(API_MAX_PAGE_SIZE)).contains(&per_page) {
            errors.add(
                "per_page",
                format!(
                    "Must be greater than or equal to 1 and less than or equal to {}.",
                    API_MAX_PAGE_SIZE
                ),
            );
        }

        errors.into_result()?;

        let near = match (lat, long, radius) {
            (Some(latitude), Some(longitude), Some(radius_km)) => Some(GeoRadius {
                latitude,
                longitude,
                radius_km,
            }),
            _ => None,
        };
        let tags = self
            .tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(PublicSiteQuery {
            name: non_blank(self.name.as_deref()),
            description: non_blank(self.description.as_deref()),
            city: non_blank(self.city.as_deref()),
            province: non_blank(self.province.as_deref()),
            state,
            tags,
            near,
            favorites_of: None,
            order,
            params: ListParams::new(page.min(i64::from(u32::MAX)) as u32, per_page as u32),
        })
    }
}

fn number(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            errors.add(field, "Not a valid number.");
            None
        }
    }
}

fn integer(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.add(field, "Not a valid integer.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> SiteSearchQuery {
        let encoded = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/api/sites?{}", encoded).parse().unwrap();
        axum::extract::Query::<SiteSearchQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_defaults() {
        let parsed = query(&[]).parse().unwrap();
        assert_eq!(parsed.order, PublicSiteOrder::Latest);
        assert_eq!(parsed.params.page, 1);
        assert_eq!(parsed.params.per_page, 10);
        assert!(parsed.near.is_none());
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_full_query() {
        let parsed = query(&[
            ("name", "Cabildo"),
            ("state_of_conservation", "Bueno"),
            ("tags", "colonial, , museo"),
            ("lat", "-34.6"),
            ("long", "-58.37"),
            ("radius", "25"),
            ("order_by", "rating-5-1"),
            ("page", "2"),
            ("per_page", "100"),
        ])
        .parse()
        .unwrap();

        assert_eq!(parsed.name.as_deref(), Some("Cabildo"));
        assert_eq!(parsed.state, Some(ConservationState::Bueno));
        assert_eq!(parsed.tags, vec!["colonial", "museo"]);
        assert_eq!(parsed.near.unwrap().radius_km, 25.0);
        assert_eq!(parsed.order, PublicSiteOrder::RatingDesc);
        assert_eq!((parsed.params.page, parsed.params.per_page), (2, 100));
    }

    #[test]
    fn test_geo_filter_needs_all_three_values() {
        let parsed = query(&[("lat", "-34.6"), ("long", "-58.37")]).parse().unwrap();
        assert!(parsed.near.is_none());
    }

    #[test]
    fn test_errors_are_reported_per_field() {
        let errors = query(&[
            ("lat", "91"),
            ("long", "abc"),
            ("order_by", "best"),
            ("page", "0"),
            ("per_page", "101"),
            ("state_of_conservation", "excelente"),
            ("inauguration_year", "1200"),
        ])
        .parse()
        .unwrap_err();

        assert_eq!(errors.get("lat").unwrap()[0], "Must be a valid latitude");
        assert_eq!(errors.get("long").unwrap()[0], "Not a valid number.");
        for field in ["order_by", "page", "per_page", "state_of_conservation", "inauguration_year"] {
            assert!(errors.has(field), "{}", field);
        }
    }

    #[test]
    fn test_only_favorites_flag() {
        assert!(query(&[("only_favorites", "TRUE")]).only_favorites());
        assert!(!query(&[("only_favorites", "1")]).only_favorites());
        assert!(!query(&[]).only_favorites());
    }

    #[test]
    fn test_page_query_is_lenient() {
        let q = PageQuery {
            page: Some("x".to_string()),
            per_page: Some("500".to_string()),
            order_by: Some("asc".to_string()),
        };
        let params = q.params();
        assert_eq!((params.page, params.per_page), (1, 100));
        assert_eq!(q.direction(), SortDirection::Asc);
        assert_eq!(PageQuery::default().direction(), SortDirection::Desc);
        assert_eq!(AdminPageQuery { page: Some("-3".to_string()) }.page(), 1);
    }

    #[derive(Debug, serde::Serialize, Deserialize)]
    struct Sample {
        name: String,
        year: i64,
    }

    async fn echo(ValidJson(body): ValidJson<Sample>) -> Json<Sample> {
        Json(body)
    }

    async fn post_json(body: &str) -> (axum::http::StatusCode, serde_json::Value) {
        use tower::ServiceExt;

        let app = axum::Router::new().route("/", axum::routing::post(echo));
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_json_accepts_body() {
        let (status, body) = post_json(r#"{"name": "Cabildo", "year": 1725}"#).await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["name"], "Cabildo");
    }

    #[tokio::test]
    async fn test_valid_json_rejects_wrong_shape() {
        let (status, body) = post_json(r#"{"name": "Cabildo", "year": "old"}"#).await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_data");
        assert!(body["error"]["details"]["body"].is_array());
    }

    #[tokio::test]
    async fn test_valid_json_rejects_malformed_body() {
        let (status, body) = post_json("{not json").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_data");
        assert!(body["error"]["details"].is_null());
    }
}
