// Power BI operations: small handles that borrow the authenticated
// executor, build one URL, issue one request and project the answer into
// typed records. Nothing here retries or paginates.

use crate::client::{Executor, HttpResponse};
use crate::error::{ApiError, DecodeError, ServiceError};
use crate::model::{Ack, Dataset, DatasetSchema, RowBatch, Workspace};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

impl Executor {
    pub fn workspaces(&self) -> WorkspaceLister<'_> {
        WorkspaceLister::new(self)
    }

    pub fn datasets(&self) -> DatasetLister<'_> {
        DatasetLister::new(self)
    }

    pub fn dataset_creator(&self) -> DatasetCreator<'_> {
        DatasetCreator::new(self)
    }

    pub fn rows(&self) -> RowAppender<'_> {
        RowAppender::new(self)
    }
}

/// Parse a response body as JSON. `Ok(None)` means the service sent no
/// content. A non-2xx status, or a 2xx body that is not JSON, comes back
/// as an [`ApiError`] with the raw status and body.
fn read_json(res: HttpResponse) -> Result<Option<Value>, ServiceError> {
    let status = res.status.as_u16();
    let body = res.success_body()?;
    if body.is_empty() {
        info!(status, "no content received");
        return Ok(None);
    }
    match serde_json::from_str(&body) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => {
            debug!(status, error = %e, "response body is not JSON");
            Err(ApiError { status, body }.into())
        }
    }
}

/// The `value` array every listing is wrapped in.
fn value_array(doc: &Value) -> Result<&Vec<Value>, DecodeError> {
    match doc.get("value") {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) => Err(DecodeError::MissingField("value".into())),
        Some(_) => Err(DecodeError::InvalidField {
            path: "value".into(),
            reason: "expected an array".into(),
        }),
    }
}

/// Writes succeed on any 2xx; a body, if any, is only logged.
fn acknowledge(res: HttpResponse) -> Result<Ack, ServiceError> {
    let status = res.status.as_u16();
    let body = res.success_body()?;
    if !body.is_empty() {
        debug!(status, %body, "write acknowledged with content");
    }
    Ok(Ack { status })
}

#[derive(Debug, Clone, Copy)]
pub struct WorkspaceLister<'a> {
    executor: &'a Executor,
}

impl<'a> WorkspaceLister<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// `GET groups`. Each element is decoded on its own, field by field; an
    /// element that is not an object is logged and skipped instead of
    /// failing the whole listing.
    pub fn list(&self) -> Result<Vec<Workspace>, ServiceError> {
        let url = self.executor.endpoint(&["groups"])?;
        let Some(doc) = read_json(self.executor.get(&url)?)? else {
            return Ok(Vec::new());
        };

        let items = value_array(&doc)?;
        let mut workspaces = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match Workspace::from_value(item, &format!("value[{index}]")) {
                Ok(ws) => workspaces.push(ws),
                Err(e) => warn!(index, error = %e, "skipping malformed workspace"),
            }
        }
        info!(count = workspaces.len(), "workspaces received");
        Ok(workspaces)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetLister<'a> {
    executor: &'a Executor,
}

impl<'a> DatasetLister<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// First dataset of `GET groups/{workspace_id}/datasets`.
    pub fn list_for_workspace(&self, workspace_id: &str) -> Result<Dataset, ServiceError> {
        let url = self
            .executor
            .endpoint(&["groups", workspace_id, "datasets"])?;
        self.first_at(&url)
    }

    /// First dataset of `GET datasets`, the signed-in user's own workspace.
    pub fn first_in_my_workspace(&self) -> Result<Dataset, ServiceError> {
        let url = self.executor.endpoint(&["datasets"])?;
        self.first_at(&url)
    }

    fn first_at(&self, url: &Url) -> Result<Dataset, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("dataset at {url}"));

        let doc = read_json(self.executor.get(url)?)?.ok_or_else(not_found)?;
        let first = value_array(&doc)?.first().ok_or_else(not_found)?;
        let dataset = Dataset::from_value(first, "value[0]")?;
        info!(id = %dataset.id, name = %dataset.name, "dataset found");
        Ok(dataset)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetCreator<'a> {
    executor: &'a Executor,
}

impl<'a> DatasetCreator<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// `POST groups/{workspace_id}/datasets`.
    pub fn create(&self, workspace_id: &str, schema: &DatasetSchema) -> Result<Ack, ServiceError> {
        let url = self
            .executor
            .endpoint(&["groups", workspace_id, "datasets"])?;
        let body = serde_json::to_string(schema).map_err(DecodeError::from)?;
        let ack = acknowledge(self.executor.post_json(&url, body)?)?;
        info!(dataset = %schema.name, status = ack.status, "dataset created");
        Ok(ack)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowAppender<'a> {
    executor: &'a Executor,
}

impl<'a> RowAppender<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// `POST datasets/{dataset_id}/tables/{table_name}/rows`. Rows are not
    /// checked against the table schema, and sending the same batch twice
    /// appends it twice.
    pub fn append(
        &self,
        dataset_id: &str,
        table_name: &str,
        rows: &RowBatch,
    ) -> Result<Ack, ServiceError> {
        let url = self
            .executor
            .endpoint(&["datasets", dataset_id, "tables", table_name, "rows"])?;
        let ack = acknowledge(self.executor.post_json(&url, rows.to_body()?)?)?;
        info!(rows = rows.len(), table = table_name, status = ack.status, "rows appended");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn response(status: StatusCode, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    #[test]
    fn empty_body_is_no_content() {
        assert!(read_json(response(StatusCode::OK, "")).unwrap().is_none());
    }

    #[test]
    fn unparsable_success_is_an_api_error() {
        match read_json(response(StatusCode::OK, "<html>")) {
            Err(ServiceError::Api(ApiError { status, body })) => {
                assert_eq!(status, 200);
                assert_eq!(body, "<html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failure_status_wins_over_body() {
        let err = read_json(response(StatusCode::UNAUTHORIZED, r#"{"value":[]}"#)).unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn value_array_shape_is_checked() {
        assert!(value_array(&json!({ "value": [] })).unwrap().is_empty());
        assert!(matches!(
            value_array(&json!({ "items": [] })),
            Err(DecodeError::MissingField(_))
        ));
        assert!(matches!(
            value_array(&json!({ "value": {} })),
            Err(DecodeError::InvalidField { .. })
        ));
    }

    #[test]
    fn acknowledge_accepts_any_2xx() {
        assert_eq!(
            acknowledge(response(StatusCode::CREATED, "{}")).unwrap(),
            Ack { status: 201 }
        );
        assert_eq!(
            acknowledge(response(StatusCode::BAD_REQUEST, "x"))
                .unwrap_err()
                .status(),
            Some(400)
        );
    }
}
