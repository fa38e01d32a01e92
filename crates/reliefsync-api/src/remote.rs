//! HTTP implementation of the remote data source port
//!
//! ## Endpoints
//!
//! | Operation                  | Request                                         |
//! |----------------------------|-------------------------------------------------|
//! | count (all / delta / bbox) | `GET /worksites/count`                          |
//! | worksite page              | `GET /worksites?limit&offset&sort=id&fields`    |
//! | worksites by id            | `GET /worksites?id__in=1,2&fields=full`         |
//! | secondary page             | `GET /worksites_data_flags?limit&offset`        |
//! | teams                      | `GET /teams?incident`                           |
//!
//! List endpoints answer `{"count": n, "results": [...]}`. Deltas are
//! filtered with `updated_at__gt` (RFC 3339, millisecond precision) and
//! bounds with `bbox=west,south,east,north`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

use reliefsync_core::domain::{BoundingBox, IncidentId, NetworkId};
use reliefsync_core::ports::{
    IRemoteDataSource, NetworkFlagsFormData, NetworkTeam, NetworkWorksite, RecordShape,
    RemoteError,
};

use crate::client::ApiClient;

/// Page size used for unpaged list requests
const TEAMS_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    results: Vec<T>,
}

/// Query parameters shared by the list endpoints
#[derive(Debug, Default)]
struct Query(Vec<(&'static str, String)>);

impl Query {
    fn incident(mut self, incident_id: IncidentId) -> Self {
        self.0.push(("incident", incident_id.to_string()));
        self
    }

    fn page(mut self, page_size: u32, page_index: u64) -> Self {
        self.0.push(("limit", page_size.to_string()));
        self.0
            .push(("offset", (u64::from(page_size) * page_index).to_string()));
        self.0.push(("sort", "id".to_string()));
        self
    }

    fn updated_after(mut self, updated_after: Option<DateTime<Utc>>) -> Self {
        if let Some(after) = updated_after {
            self.0.push(("updated_at__gt", format_timestamp(after)));
        }
        self
    }

    fn bounds(mut self, bounds: &BoundingBox) -> Self {
        self.0.push(("bbox", format_bbox(bounds)));
        self
    }

    fn shape(mut self, shape: RecordShape) -> Self {
        self.0.push(("fields", shape.as_str().to_string()));
        self
    }

    fn push(mut self, key: &'static str, value: String) -> Self {
        self.0.push((key, value));
        self
    }

    fn as_slice(&self) -> &[(&'static str, String)] {
        &self.0
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_bbox(bounds: &BoundingBox) -> String {
    format!(
        "{},{},{},{}",
        bounds.west, bounds.south, bounds.east, bounds.north
    )
}

/// [`IRemoteDataSource`] backed by the relief-coordination REST API
pub struct HttpRemoteDataSource {
    client: ApiClient,
}

impl HttpRemoteDataSource {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self::from_client(ApiClient::new(base_url, access_token))
    }

    pub fn from_client(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn count(&self, query: Query) -> Result<u64, RemoteError> {
        let response: CountResponse = self
            .client
            .get_json("/worksites/count", query.as_slice())
            .await?;
        Ok(response.count)
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
    ) -> Result<Vec<T>, RemoteError> {
        let response: ListResponse<T> = self.client.get_json(path, query.as_slice()).await?;
        debug!(path, received = response.results.len(), "Listed records");
        Ok(response.results)
    }
}

#[async_trait::async_trait]
impl IRemoteDataSource for HttpRemoteDataSource {
    async fn count_worksites(
        &self,
        incident_id: IncidentId,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<u64, RemoteError> {
        self.count(Query::default().incident(incident_id).updated_after(updated_after))
            .await
    }

    async fn fetch_worksites_page(
        &self,
        incident_id: IncidentId,
        shape: RecordShape,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        let query = Query::default()
            .incident(incident_id)
            .page(page_size, page_index)
            .shape(shape)
            .updated_after(updated_after);
        self.list("/worksites", query).await
    }

    async fn count_worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
    ) -> Result<u64, RemoteError> {
        self.count(Query::default().incident(incident_id).bounds(bounds))
            .await
    }

    async fn fetch_worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
        page_size: u32,
        page_index: u64,
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        let query = Query::default()
            .incident(incident_id)
            .page(page_size, page_index)
            .shape(RecordShape::Full)
            .bounds(bounds);
        self.list("/worksites", query).await
    }

    async fn fetch_worksites_by_ids(
        &self,
        ids: &[NetworkId],
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids
            .iter()
            .map(|id| id.get().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = Query::default()
            .push("id__in", joined)
            .push("limit", ids.len().to_string())
            .shape(RecordShape::Full);
        self.list("/worksites", query).await
    }

    async fn fetch_flags_form_data_page(
        &self,
        incident_id: IncidentId,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkFlagsFormData>, RemoteError> {
        let query = Query::default()
            .incident(incident_id)
            .page(page_size, page_index)
            .updated_after(updated_after);
        self.list("/worksites_data_flags", query).await
    }

    async fn fetch_teams(&self, incident_id: IncidentId) -> Result<Vec<NetworkTeam>, RemoteError> {
        let query = Query::default()
            .incident(incident_id)
            .push("limit", TEAMS_LIMIT.to_string());
        self.list("/teams", query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_has_millis_and_z() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-06-01T12:30:00.000Z");
    }

    #[test]
    fn test_bbox_order_is_west_south_east_north() {
        let bounds = BoundingBox {
            south: 29.5,
            north: 30.5,
            west: -90.5,
            east: -89.5,
        };
        assert_eq!(format_bbox(&bounds), "-90.5,29.5,-89.5,30.5");
    }

    #[test]
    fn test_page_offset() {
        let query = Query::default().page(40, 3);
        assert!(query.as_slice().contains(&("limit", "40".to_string())));
        assert!(query.as_slice().contains(&("offset", "120".to_string())));
        assert!(query.as_slice().contains(&("sort", "id".to_string())));
    }
}
