//! File storage adapter over the signed-in user's OneDrive.
//!
//! Items are addressed relative to a configured root. In path mode
//! (`use_path = true`) a path such as `reports/q3.xlsx` becomes
//! `/me/drive/root:/reports/q3.xlsx:`; with a root of `root:/Apps/bridge` it
//! becomes `/me/drive/root:/Apps/bridge/reports/q3.xlsx:`. In id mode every
//! path argument is a drive item id.

use chrono::{DateTime, Utc};
use graph_bridge::config::OneDriveConfig;
use graph_bridge::{CallDescriptor, Dispatcher, GraphError};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const COPY_POLL_ATTEMPTS: u32 = 10;
const COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the adapter root (item name in id mode)
    pub path: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub web_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub child_count: u64,
    pub web_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageEntry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl StorageEntry {
    pub fn path(&self) -> &str {
        match self {
            StorageEntry::File(file) => &file.path,
            StorageEntry::Directory(dir) => &dir.path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StorageEntry::Directory(_))
    }
}

#[derive(Deserialize)]
struct FileFacet {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct FolderFacet {
    #[serde(rename = "childCount", default)]
    child_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    file: Option<FileFacet>,
    #[serde(default)]
    folder: Option<FolderFacet>,
}

impl DriveItem {
    fn into_entry(self, path: String) -> StorageEntry {
        match self.folder {
            Some(folder) => StorageEntry::Directory(DirectoryEntry {
                path,
                last_modified: self.last_modified_date_time,
                child_count: folder.child_count,
                web_url: self.web_url,
            }),
            None => StorageEntry::File(FileEntry {
                path,
                size: self.size,
                last_modified: self.last_modified_date_time,
                mime_type: self.file.and_then(|f| f.mime_type),
                web_url: self.web_url,
            }),
        }
    }
}

#[derive(Deserialize)]
struct DriveItemPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Graph address of one drive item
struct ItemAddress {
    path: String,
    /// Path-based addresses need a closing `:` before a sub-resource
    path_based: bool,
}

impl ItemAddress {
    fn item(&self) -> String {
        if self.path_based {
            format!("{}:", self.path)
        } else {
            self.path.clone()
        }
    }

    fn sub(&self, resource: &str) -> String {
        format!("{}/{}", self.item(), resource)
    }
}

#[derive(Clone)]
pub struct OneDrive {
    graph: Arc<Dispatcher>,
    /// Drive item segment, e.g. `root` or `items/01BYE5RZ`
    drive_item: String,
    /// Folder under `drive_item` in path mode, e.g. `/Apps/bridge`
    base_path: String,
    use_path: bool,
    /// How often and how long `move_item` looks for the copied destination
    copy_poll: (u32, Duration),
}

impl OneDrive {
    pub fn new(graph: Arc<Dispatcher>, root: &str, use_path: bool) -> Self {
        let (drive_item, base_path) = match root.split_once(':') {
            Some((item, path)) => (item, path.trim_end_matches('/')),
            None => (root, ""),
        };
        let drive_item = drive_item.trim_matches('/');

        Self {
            graph,
            drive_item: if drive_item.is_empty() { "root" } else { drive_item }.to_string(),
            base_path: base_path.to_string(),
            use_path,
            copy_poll: (COPY_POLL_ATTEMPTS, COPY_POLL_INTERVAL),
        }
    }

    pub fn with_copy_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.copy_poll = (attempts.max(1), interval);
        self
    }

    pub fn from_config(graph: Arc<Dispatcher>, config: &OneDriveConfig) -> Self {
        Self::new(graph, &config.root, config.use_path)
    }

    /// False when the item does not exist. Other failures are returned.
    pub async fn file_exists(&self, path: &str) -> Result<bool, GraphError> {
        match self.graph.call(CallDescriptor::get(self.address(path).item())).await {
            Ok(_) => Ok(true),
            Err(err) if err.status() == Some(404) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, GraphError> {
        self.graph
            .call_raw(CallDescriptor::get(self.address(path).sub("content")))
            .await
    }

    /// Uploads `contents`, replacing any existing file.
    pub async fn write(&self, path: &str, contents: Vec<u8>, content_type: &str) -> Result<(), GraphError> {
        let size = contents.len();
        self.graph
            .call(CallDescriptor::put_bytes(
                self.address(path).sub("content"),
                content_type,
                contents,
            ))
            .await?;
        debug!(session = %self.graph.session(), path, size, "Uploaded file");
        Ok(())
    }

    pub async fn metadata(&self, path: &str) -> Result<StorageEntry, GraphError> {
        let item: DriveItem = self
            .graph
            .call_as(CallDescriptor::get(self.address(path).item()))
            .await?
            .into_one()
            .ok_or_else(|| GraphError::UnexpectedResponse {
                status: 200,
                message: format!("Expected a drive item for '{}', got a list", path),
            })?;

        let entry_path = if self.use_path {
            path.trim_matches('/').to_string()
        } else {
            item.name.clone()
        };
        Ok(item.into_entry(entry_path))
    }

    /// Entries under `path` (`""` for the root), breadth-first when `deep`.
    pub async fn list_contents(&self, path: &str, deep: bool) -> Result<Vec<StorageEntry>, GraphError> {
        let mut entries = Vec::new();
        let mut folders = VecDeque::from([(
            path.trim_matches('/').to_string(),
            self.address(path).sub("children"),
        )]);

        while let Some((folder, first_page)) = folders.pop_front() {
            let mut next = Some(first_page);
            while let Some(url) = next.take() {
                let page = self.page(&url).await?;
                next = page.next_link;

                for item in page.value {
                    let child = if folder.is_empty() {
                        item.name.clone()
                    } else {
                        format!("{}/{}", folder, item.name)
                    };
                    if deep && item.folder.is_some() {
                        let address = if self.use_path {
                            self.address(&child)
                        } else {
                            self.address(&item.id)
                        };
                        folders.push_back((child.clone(), address.sub("children")));
                    }
                    entries.push(item.into_entry(child));
                }
            }
        }

        Ok(entries)
    }

    /// Creates folder `path`. In id mode `path` is `<parent id>/<name>`.
    pub async fn create_directory(&self, path: &str) -> Result<StorageEntry, GraphError> {
        let (parent, name) = split_parent(path);
        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        });

        let item: DriveItem = self
            .graph
            .call_as(CallDescriptor::post(self.address(parent).sub("children"), body))
            .await?
            .into_one()
            .ok_or_else(|| GraphError::UnexpectedResponse {
                status: 201,
                message: format!("Folder creation for '{}' returned a list", path),
            })?;

        info!(session = %self.graph.session(), path, "Created folder");
        Ok(item.into_entry(path.trim_matches('/').to_string()))
    }

    /// Server-side copy. In path mode `destination` is the new path; in id
    /// mode it is the id of the destination folder.
    pub async fn copy(&self, source: &str, destination: &str) -> Result<(), GraphError> {
        let body = if self.use_path {
            let (parent, name) = split_parent(destination);
            json!({
                "name": name,
                "parentReference": { "path": self.reference_path(parent) },
            })
        } else {
            json!({ "parentReference": { "id": destination } })
        };

        self.graph
            .call(CallDescriptor::post(self.address(source).sub("copy"), body))
            .await?;
        debug!(session = %self.graph.session(), source, destination, "Copy accepted");
        Ok(())
    }

    /// Copy followed by delete of the source.
    ///
    /// Graph accepts a copy with `202` and finishes it in the background. In
    /// path mode the source is deleted only once the destination is visible;
    /// if it does not appear within the poll window the source is kept and an
    /// error is returned. In id mode the destination is a folder id and cannot
    /// be checked, so the delete follows the accepted copy directly and may
    /// run before the copy has completed.
    pub async fn move_item(&self, source: &str, destination: &str) -> Result<(), GraphError> {
        self.copy(source, destination).await?;

        if self.use_path && !self.await_copy(destination).await? {
            warn!(session = %self.graph.session(), source, destination, "Copy not confirmed, source kept");
            return Err(GraphError::UnexpectedResponse {
                status: 202,
                message: format!("Copy to '{}' not confirmed; '{}' was not deleted", destination, source),
            });
        }
        self.delete(source).await
    }

    async fn await_copy(&self, destination: &str) -> Result<bool, GraphError> {
        let (attempts, interval) = self.copy_poll;
        for attempt in 1..=attempts {
            if self.file_exists(destination).await? {
                return Ok(true);
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(false)
    }

    /// Deletes a file or folder. A missing item counts as deleted.
    pub async fn delete(&self, path: &str) -> Result<(), GraphError> {
        match self.graph.call(CallDescriptor::delete(self.address(path).item())).await {
            Ok(_) => Ok(()),
            Err(err) if err.status() == Some(404) => {
                debug!(session = %self.graph.session(), path, "Delete of missing item");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn page(&self, url: &str) -> Result<DriveItemPage, GraphError> {
        let body = self.graph.call_raw(CallDescriptor::get(url)).await?;
        serde_json::from_slice(&body).map_err(|e| GraphError::UnexpectedResponse {
            status: 200,
            message: format!("Malformed children page: {}", e),
        })
    }

    fn address(&self, path: &str) -> ItemAddress {
        let path = path.trim_matches('/');

        if !self.use_path {
            return ItemAddress {
                path: if path.is_empty() {
                    format!("/me/drive/{}", self.drive_item)
                } else {
                    format!("/me/drive/items/{}", path)
                },
                path_based: false,
            };
        }

        let full = self.full_path(path);
        if full.is_empty() {
            ItemAddress {
                path: format!("/me/drive/{}", self.drive_item),
                path_based: false,
            }
        } else {
            ItemAddress {
                path: format!("/me/drive/{}:{}", self.drive_item, full),
                path_based: true,
            }
        }
    }

    /// `parentReference.path` of folder `path`
    fn reference_path(&self, path: &str) -> String {
        format!("/drive/{}:{}", self.drive_item, self.full_path(path.trim_matches('/')))
    }

    /// Root folder plus `path`, each segment percent-encoded, with a leading `/`.
    fn full_path(&self, path: &str) -> String {
        let mut full = self.base_path.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push('/');
            full.push_str(&urlencoding::encode(segment));
        }
        full
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}
