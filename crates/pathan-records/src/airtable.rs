//! Airtable REST 适配器
//!
//! - `GET    {base}/{base_id}/{table}?filterByFormula=...&offset=...`
//! - `POST   {base}/{base_id}/{table}`
//! - `DELETE {base}/{base_id}/{table}/{record_id}`
//!
//! 令牌通过 `Authorization: Bearer` 请求头传递。

use async_trait::async_trait;
use pathan_core::config::RecordStoreConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::RecordStoreError;
use crate::models::{AnalysisFields, StoredRow, UserFields};
use crate::store::RecordStore;

/// Airtable 客户端
pub struct AirtableStore {
    base_url: Url,
    base_id: String,
    users_table: String,
    records_table: String,
    api_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ListPage<F> {
    #[serde(default = "Vec::new")]
    records: Vec<StoredRow<F>>,
    offset: Option<String>,
}

#[derive(Serialize)]
struct CreateBody<'a, F> {
    fields: &'a F,
    typecast: bool,
}

/// 构造 `{Name} = '...'` 公式，转义反斜杠与单引号
pub fn name_equals_formula(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{Name}} = '{}'", escaped)
}

impl AirtableStore {
    pub fn new(config: &RecordStoreConfig) -> Result<Self, RecordStoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: Url::parse(config.base_url.trim_end_matches('/'))?,
            base_id: config.base_id.clone(),
            users_table: config.users_table.clone(),
            records_table: config.records_table.clone(),
            api_token: config.api_token.clone(),
            client: builder.build()?,
        })
    }

    /// 表或记录地址，表名中的空格等字符会被正确编码
    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, RecordStoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RecordStoreError::InvalidUrl(format!("{} cannot be a base", self.base_url))
            })?;
            segments.pop_if_empty().push(&self.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RecordStoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(RecordStoreError::Api { status, body })
        }
    }

    async fn list_rows<F: DeserializeOwned>(
        &self,
        table: &str,
        formula: Option<&str>,
    ) -> Result<Vec<StoredRow<F>>, RecordStoreError> {
        let url = self.table_url(table, None)?;
        let mut rows = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self.client.get(url.clone()).bearer_auth(&self.api_token);
            if let Some(formula) = formula {
                request = request.query(&[("filterByFormula", formula)]);
            }
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset.as_str())]);
            }

            let response = Self::check(request.send().await?).await?;
            let page: ListPage<F> = response.json().await?;
            rows.extend(page.records);

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        debug!("Fetched {} rows from table {}", rows.len(), table);
        Ok(rows)
    }

    async fn create_row<F>(&self, table: &str, fields: &F) -> Result<StoredRow<F>, RecordStoreError>
    where
        F: Serialize + DeserializeOwned + Sync,
    {
        let url = self.table_url(table, None)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&CreateBody {
                fields,
                typecast: true,
            })
            .send()
            .await?;
        let row: StoredRow<F> = Self::check(response).await?.json().await?;
        info!("Created row {} in table {}", row.id, table);
        Ok(row)
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn find_users_by_name(&self, name: &str) -> Result<Vec<StoredRow<UserFields>>, RecordStoreError> {
        let formula = name_equals_formula(name);
        self.list_rows(&self.users_table, Some(&formula)).await
    }

    async fn create_user(&self, fields: &UserFields) -> Result<StoredRow<UserFields>, RecordStoreError> {
        self.create_row(&self.users_table, fields).await
    }

    async fn delete_user(&self, id: &str) -> Result<(), RecordStoreError> {
        let url = self.table_url(&self.users_table, Some(id))?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::check(response).await?;
        info!("Deleted row {} from table {}", id, self.users_table);
        Ok(())
    }

    async fn create_analysis(
        &self,
        fields: &AnalysisFields,
    ) -> Result<StoredRow<AnalysisFields>, RecordStoreError> {
        self.create_row(&self.records_table, fields).await
    }

    async fn list_analyses(&self) -> Result<Vec<StoredRow<AnalysisFields>>, RecordStoreError> {
        self.list_rows(&self.records_table, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> AirtableStore {
        let config = RecordStoreConfig {
            api_token: "pat-test".to_string(),
            base_id: "appBASE".to_string(),
            users_table: "Users".to_string(),
            records_table: "Analysis Records".to_string(),
            base_url: format!("{}/v0", server.uri()),
            ..Default::default()
        };
        AirtableStore::new(&config).unwrap()
    }

    #[test]
    fn test_formula_escapes_quotes() {
        assert_eq!(name_equals_formula("Dr. A"), "{Name} = 'Dr. A'");
        assert_eq!(name_equals_formula("O'Brien"), "{Name} = 'O\\'Brien'");
        assert_eq!(name_equals_formula("a\\' OR 1"), "{Name} = 'a\\\\\\' OR 1'");
    }

    #[tokio::test]
    async fn test_find_users_sends_formula_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/appBASE/Users"))
            .and(header("authorization", "Bearer pat-test"))
            .and(query_param("filterByFormula", "{Name} = 'Dr. A'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{
                    "id": "recA",
                    "createdTime": "2024-03-05T10:00:00.000Z",
                    "fields": {"Name": "Dr. A", "Password": "secret"}
                }]
            })))
            .mount(&server)
            .await;

        let rows = store_for(&server).find_users_by_name("Dr. A").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.password, "secret");
    }

    #[tokio::test]
    async fn test_list_analyses_follows_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/appBASE/Analysis%20Records"))
            .and(query_param("offset", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec2", "createdTime": "2024-03-06T10:00:00.000Z", "fields": {}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/appBASE/Analysis%20Records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec1", "createdTime": "2024-03-05T10:00:00.000Z", "fields": {}}],
                "offset": "page2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let rows = store_for(&server).list_analyses().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1", "rec2"]);
    }

    #[tokio::test]
    async fn test_create_user_posts_typed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/appBASE/Users"))
            .and(body_partial_json(json!({
                "fields": {"Name": "Dr. B", "Password": "pw", "Email": "b@clinic.ru", "Role": "doctor"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "recB",
                "createdTime": "2024-03-05T10:00:00.000Z",
                "fields": {"Name": "Dr. B", "Email": "b@clinic.ru"}
            })))
            .mount(&server)
            .await;

        let row = store_for(&server)
            .create_user(&UserFields::new_doctor("Dr. B", "pw", "b@clinic.ru"))
            .await
            .unwrap();
        assert_eq!(row.id, "recB");
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("INVALID_VALUE_FOR_COLUMN"))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .create_analysis(&AnalysisFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecordStoreError::Api { status: 422, .. }));
    }
}
