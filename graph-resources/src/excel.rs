//! Excel workbooks stored in OneDrive.
//!
//! A [`Workbook`] owns one persistent workbook session: every call made
//! through it carries the `workbook-session-id` header, so edits are batched
//! server-side until [`Workbook::close`] (or session expiry) and are visible
//! to later reads on the same workbook.

use graph_bridge::{CallDescriptor, Dispatcher, GraphError, GraphResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Id of the first worksheet of every workbook
pub const DEFAULT_WORKSHEET: &str = "{00000000-0001-0000-0000-000000000000}";

const SESSION_HEADER: &str = "workbook-session-id";

/// What [`Workbook::clear_range`] removes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClearTarget {
    #[default]
    All,
    Formats,
    Contents,
}

impl fmt::Display for ClearTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self {
            ClearTarget::All => "All",
            ClearTarget::Formats => "Formats",
            ClearTarget::Contents => "Contents",
        };
        f.write_str(target)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worksheet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Deserialize)]
struct SessionInfo {
    id: Option<String>,
}

pub struct Workbook {
    graph: Arc<Dispatcher>,
    file_id: String,
    session_id: String,
}

impl Workbook {
    /// Opens a persistent workbook session on drive item `file_id`.
    pub async fn open(graph: Arc<Dispatcher>, file_id: impl Into<String>) -> Result<Self, GraphError> {
        let file_id = file_id.into();
        let path = format!("/me/drive/items/{}/workbook/createSession", file_id);

        let session: SessionInfo = graph
            .call_as(CallDescriptor::post(path, json!({ "persistChanges": true })))
            .await?
            .into_one()
            .ok_or_else(|| missing_session_id(&file_id))?;
        let session_id = session.id.ok_or_else(|| missing_session_id(&file_id))?;

        info!(session = %graph.session(), file = %file_id, "Workbook session opened");

        Ok(Self {
            graph,
            file_id,
            session_id,
        })
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Writes `values` into `range` of the first worksheet, one value per row.
    pub async fn set_cell_values(&self, range: &str, values: &[Value]) -> Result<GraphResponse, GraphError> {
        let rows: Vec<Value> = values.iter().map(|v| json!([v])).collect();
        self.call(CallDescriptor::patch(
            self.range_path(DEFAULT_WORKSHEET, range),
            json!({ "values": rows }),
        ))
        .await
    }

    /// Range object of `range` on the first worksheet (`values`, `formulas`, `address`...).
    pub async fn cell_values(&self, range: &str) -> Result<Value, GraphError> {
        Ok(self
            .call(CallDescriptor::get(self.range_path(DEFAULT_WORKSHEET, range)))
            .await?
            .into_value())
    }

    /// Full recalculation of every formula in the workbook.
    pub async fn recalculate(&self) -> Result<(), GraphError> {
        let path = format!("{}/application/calculate", self.workbook_path());
        self.call(CallDescriptor::post(path, json!({ "calculationType": "Full" })))
            .await?;
        Ok(())
    }

    /// Clears `range` on `worksheet`, or on the first worksheet when `None`.
    pub async fn clear_range(
        &self,
        range: &str,
        apply_to: ClearTarget,
        worksheet: Option<&str>,
    ) -> Result<(), GraphError> {
        let path = format!(
            "{}/clear",
            self.range_path(worksheet.unwrap_or(DEFAULT_WORKSHEET), range)
        );
        self.call(CallDescriptor::post(path, json!({ "applyTo": apply_to.to_string() })))
            .await?;
        Ok(())
    }

    pub async fn worksheets(&self) -> Result<Vec<Worksheet>, GraphError> {
        let path = format!("{}/worksheets", self.workbook_path());
        Ok(self
            .graph
            .call_as(self.in_session(CallDescriptor::get(path)))
            .await?
            .into_vec())
    }

    /// Appends a worksheet named `name`.
    pub async fn add_worksheet(&self, name: &str) -> Result<Worksheet, GraphError> {
        let path = format!("{}/worksheets/add", self.workbook_path());
        self.graph
            .call_as(self.in_session(CallDescriptor::post(path, json!({ "name": name }))))
            .await?
            .into_one()
            .ok_or_else(|| GraphError::UnexpectedResponse {
                status: 201,
                message: "Worksheet creation returned a list".to_string(),
            })
    }

    pub async fn delete_worksheet(&self, worksheet_id: &str) -> Result<(), GraphError> {
        let path = format!("{}/worksheets/{}", self.workbook_path(), worksheet_id);
        self.call(CallDescriptor::delete(path)).await?;
        Ok(())
    }

    /// Ends the workbook session.
    pub async fn close(self) -> Result<(), GraphError> {
        let path = format!("{}/closeSession", self.workbook_path());
        self.call(CallDescriptor::post(path, json!({}))).await?;
        debug!(session = %self.graph.session(), file = %self.file_id, "Workbook session closed");
        Ok(())
    }

    fn workbook_path(&self) -> String {
        format!("/me/drive/items/{}/workbook", self.file_id)
    }

    fn range_path(&self, worksheet: &str, range: &str) -> String {
        format!(
            "{}/worksheets/{}/range(address='{}')",
            self.workbook_path(),
            worksheet,
            range
        )
    }

    fn in_session(&self, call: CallDescriptor) -> CallDescriptor {
        call.header(SESSION_HEADER, self.session_id.as_str())
    }

    async fn call(&self, call: CallDescriptor) -> Result<GraphResponse, GraphError> {
        self.graph.call(self.in_session(call)).await
    }
}

fn missing_session_id(file_id: &str) -> GraphError {
    GraphError::UnexpectedResponse {
        status: 201,
        message: format!("createSession for '{}' returned no session id", file_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dispatcher;
    use mockito::{Matcher, Mock, Server, ServerGuard};

    const FILE: &str = "01BYE5RZ";

    async fn session_mock(server: &mut ServerGuard) -> Mock {
        server
            .mock("POST", "/me/drive/items/01BYE5RZ/workbook/createSession")
            .match_body(Matcher::Json(json!({"persistChanges": true})))
            .with_status(201)
            .with_body(r#"{"id":"wb-session-1","persistChanges":true}"#)
            .create_async()
            .await
    }

    fn range_path(range: &str) -> Matcher {
        Matcher::Regex(format!(
            r"^/me/drive/items/01BYE5RZ/workbook/worksheets/.*range\(address='{}'\)$",
            range
        ))
    }

    #[test]
    fn test_clear_target_display() {
        assert_eq!(ClearTarget::default().to_string(), "All");
        assert_eq!(ClearTarget::Formats.to_string(), "Formats");
        assert_eq!(ClearTarget::Contents.to_string(), "Contents");
    }

    #[tokio::test]
    async fn test_open_creates_session() {
        let mut server = Server::new_async().await;
        let create = session_mock(&mut server).await;

        let workbook = Workbook::open(dispatcher(&server), FILE).await.unwrap();
        assert_eq!(workbook.session_id(), "wb-session-1");
        assert_eq!(workbook.file_id(), FILE);

        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_without_session_id_fails() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/me/drive/items/01BYE5RZ/workbook/createSession")
            .with_status(201)
            .with_body(r#"{"persistChanges":true}"#)
            .create_async()
            .await;

        let err = Workbook::open(dispatcher(&server), FILE).await.err().unwrap();
        assert!(matches!(err, GraphError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_set_cell_values_wraps_rows() {
        let mut server = Server::new_async().await;
        let _create = session_mock(&mut server).await;
        let patch = server
            .mock("PATCH", range_path("A1:A3"))
            .match_header(SESSION_HEADER, "wb-session-1")
            .match_body(Matcher::Json(json!({"values": [["Revenue"], [1200], [null]]})))
            .with_status(200)
            .with_body(r#"{"address":"Sheet1!A1:A3"}"#)
            .create_async()
            .await;

        let workbook = Workbook::open(dispatcher(&server), FILE).await.unwrap();
        workbook
            .set_cell_values("A1:A3", &[json!("Revenue"), json!(1200), Value::Null])
            .await
            .unwrap();

        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_cell_values_and_recalculate() {
        let mut server = Server::new_async().await;
        let _create = session_mock(&mut server).await;
        let _get = server
            .mock("GET", range_path("B2"))
            .match_header(SESSION_HEADER, "wb-session-1")
            .with_status(200)
            .with_body(r#"{"address":"Sheet1!B2","values":[[42]],"formulas":[["=6*7"]]}"#)
            .create_async()
            .await;
        let calculate = server
            .mock("POST", "/me/drive/items/01BYE5RZ/workbook/application/calculate")
            .match_body(Matcher::Json(json!({"calculationType": "Full"})))
            .with_status(200)
            .create_async()
            .await;

        let workbook = Workbook::open(dispatcher(&server), FILE).await.unwrap();
        workbook.recalculate().await.unwrap();

        let range = workbook.cell_values("B2").await.unwrap();
        assert_eq!(range["values"][0][0], 42);
        assert_eq!(range["formulas"][0][0], "=6*7");

        calculate.assert_async().await;
    }

    #[tokio::test]
    async fn test_clear_range_on_named_worksheet() {
        let mut server = Server::new_async().await;
        let _create = session_mock(&mut server).await;
        let clear = server
            .mock(
                "POST",
                "/me/drive/items/01BYE5RZ/workbook/worksheets/Totals/range(address='C1:C9')/clear",
            )
            .match_body(Matcher::Json(json!({"applyTo": "Contents"})))
            .with_status(200)
            .create_async()
            .await;

        let workbook = Workbook::open(dispatcher(&server), FILE).await.unwrap();
        workbook
            .clear_range("C1:C9", ClearTarget::Contents, Some("Totals"))
            .await
            .unwrap();

        clear.assert_async().await;
    }

    #[tokio::test]
    async fn test_worksheet_lifecycle() {
        let mut server = Server::new_async().await;
        let _create = session_mock(&mut server).await;
        let _list = server
            .mock("GET", "/me/drive/items/01BYE5RZ/workbook/worksheets")
            .with_status(200)
            .with_body(
                r#"{"value":[{"id":"{00000000-0001-0000-0000-000000000000}","name":"Sheet1","position":0,"visibility":"Visible"}]}"#,
            )
            .create_async()
            .await;
        let add = server
            .mock("POST", "/me/drive/items/01BYE5RZ/workbook/worksheets/add")
            .match_header(SESSION_HEADER, "wb-session-1")
            .match_body(Matcher::Json(json!({"name": "Q3"})))
            .with_status(201)
            .with_body(r#"{"id":"ws-q3","name":"Q3","position":1}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/me/drive/items/01BYE5RZ/workbook/worksheets/ws-q3")
            .with_status(204)
            .create_async()
            .await;
        let close = server
            .mock("POST", "/me/drive/items/01BYE5RZ/workbook/closeSession")
            .match_header(SESSION_HEADER, "wb-session-1")
            .with_status(204)
            .create_async()
            .await;

        let workbook = Workbook::open(dispatcher(&server), FILE).await.unwrap();

        let sheets = workbook.worksheets().await.unwrap();
        assert_eq!(sheets[0].id, DEFAULT_WORKSHEET);
        assert_eq!(sheets[0].visibility.as_deref(), Some("Visible"));

        let added = workbook.add_worksheet("Q3").await.unwrap();
        assert_eq!(added.position, 1);

        workbook.delete_worksheet(&added.id).await.unwrap();
        workbook.close().await.unwrap();

        add.assert_async().await;
        delete.assert_async().await;
        close.assert_async().await;
    }
}
