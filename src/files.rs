//! Knowledge file panel: upload list, optimistic upload rows and polling.

use crate::api::BackendApi;
use crate::models::{FileEntry, FileStatus, SelectedFile};
use crate::poll::{self, PollOutcome, PollPolicy, Subscription};
use crate::prompt::Prompter;
use crate::view::{FileListView, FileRow};
use anyhow::Result;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const CONFIRM_DELETE_FILE: &str = "确定删除此文件吗？相关知识图谱数据也将被移除。";
const UPLOAD_ERROR: &str = "上传出错";

/// The file-selection control. Only the first selected file is uploaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInput {
    files: Vec<PathBuf>,
}

impl FileInput {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    // Lets the same file be picked again
    pub fn clear(&mut self) {
        self.files.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadStage {
    InFlight,
    // Accepted by the backend; `after_fetch` is the number of list fetches
    // started before the acceptance arrived
    Submitted { after_fetch: u64 },
}

#[derive(Clone, Debug)]
struct PendingUpload {
    name: String,
    order: u64,
    stage: UploadStage,
}

pub struct FilePanelController {
    backend: Arc<dyn BackendApi>,
    prompter: Arc<dyn Prompter>,
    pending: DashMap<Uuid, PendingUpload>,
    files: Mutex<Vec<FileEntry>>,
    view: Mutex<FileListView>,
    fetches: AtomicU64,
    upload_seq: AtomicU64,
}

impl FilePanelController {
    pub fn new(backend: Arc<dyn BackendApi>, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            backend,
            prompter,
            pending: DashMap::new(),
            files: Mutex::new(Vec::new()),
            view: Mutex::new(FileListView::default()),
            fetches: AtomicU64::new(0),
            upload_seq: AtomicU64::new(0),
        }
    }

    pub async fn view(&self) -> FileListView {
        self.view.lock().await.clone()
    }

    /// True while an upload is unconfirmed or a file is still being processed.
    pub async fn is_busy(&self) -> bool {
        !self.pending.is_empty()
            || self
                .files
                .lock()
                .await
                .iter()
                .any(|f| f.status == FileStatus::Processing)
    }

    /// Fetches the authoritative list and rebuilds the panel.
    ///
    /// Rows of uploads still in flight are kept on top. A row whose upload
    /// was accepted is dropped once the list shows a file of that name, or
    /// once a fetch issued after the acceptance has come back.
    pub async fn load_files(&self) -> Result<()> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let files = self.backend.list_files().await?;

        self.pending.retain(|_, upload| match upload.stage {
            UploadStage::InFlight => true,
            UploadStage::Submitted { after_fetch } => {
                fetch <= after_fetch && !files.iter().any(|f| f.name == upload.name)
            }
        });

        let mut current = self.files.lock().await;
        *current = files;
        let rows = self.rows(&current);
        self.view.lock().await.rebuild(rows);
        log::debug!("File panel rebuilt with {} files", current.len());
        Ok(())
    }

    async fn refresh(&self) {
        if let Err(e) = self.load_files().await {
            log::error!("Failed to refresh file list: {:?}", e);
        }
    }

    // Redraws from the last fetched list, e.g. after dropping a failed upload
    async fn redraw(&self) {
        let current = self.files.lock().await;
        let rows = self.rows(&current);
        self.view.lock().await.rebuild(rows);
    }

    fn rows(&self, files: &[FileEntry]) -> Vec<FileRow> {
        let mut uploads: Vec<(Uuid, PendingUpload)> = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        uploads.sort_by(|a, b| b.1.order.cmp(&a.1.order));
        uploads
            .into_iter()
            .map(|(id, upload)| FileRow::uploading(id, upload.name))
            .chain(files.iter().map(FileRow::from))
            .collect()
    }

    /// Shows an optimistic "uploading" row on top and returns its correlation id.
    pub async fn render_temp_file(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let order = self.upload_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.insert(
            id,
            PendingUpload {
                name: name.to_string(),
                order,
                stage: UploadStage::InFlight,
            },
        );
        self.view.lock().await.prepend(FileRow::uploading(id, name));
        id
    }

    /// Opens the file picker and uploads the selection.
    pub async fn trigger_upload(&self) {
        let picked = self.prompter.pick_files().await;
        if picked.is_empty() {
            return;
        }
        let mut input = FileInput::new(picked);
        self.handle_file_upload(&mut input).await;
    }

    pub async fn handle_file_upload(&self, input: &mut FileInput) {
        let Some(path) = input.files().first().cloned() else {
            return;
        };
        if input.files().len() > 1 {
            log::debug!("Ignoring {} extra selected files", input.files().len() - 1);
        }

        let file = match SelectedFile::read(&path).await {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to read {} for upload: {:?}", path.display(), e);
                self.prompter.alert(UPLOAD_ERROR).await;
                input.clear();
                return;
            }
        };

        log::info!("Uploading knowledge file {}", file.name);
        let upload_id = self.render_temp_file(&file.name).await;
        match self.backend.upload(&file).await {
            Ok(reply) if reply.is_success() => {
                let after_fetch = self.fetches.load(Ordering::SeqCst);
                if let Some(mut upload) = self.pending.get_mut(&upload_id) {
                    upload.stage = UploadStage::Submitted { after_fetch };
                }
                self.refresh().await;
            }
            Ok(reply) => {
                log::warn!("Upload of {} rejected: {}", file.name, reply.error_message());
                self.pending.remove(&upload_id);
                self.redraw().await;
                self.prompter
                    .alert(&format!("上传失败: {}", reply.error_message()))
                    .await;
            }
            Err(e) => {
                log::error!("Upload of {} failed: {:?}", file.name, e);
                self.pending.remove(&upload_id);
                self.redraw().await;
                self.prompter.alert(UPLOAD_ERROR).await;
            }
        }
        input.clear();
    }

    /// Deletes a file and its graph data after confirmation.
    pub async fn delete_file(&self, file_id: &str) {
        if !self.prompter.confirm(CONFIRM_DELETE_FILE).await {
            return;
        }
        log::warn!("Deleting knowledge file {}", file_id);
        if let Err(e) = self.backend.delete_file(file_id).await {
            log::error!("Failed to delete file {}: {:?}", file_id, e);
        }
        self.refresh().await;
    }

    /// Keeps the panel fresh in the background. `on_change` runs after a
    /// poll that changed what the panel shows.
    pub fn start_polling<F>(self: &Arc<Self>, policy: PollPolicy, on_change: F) -> Subscription
    where
        F: Fn(&FileListView) + Send + Sync + 'static,
    {
        let panel = Arc::clone(self);
        let on_change = Arc::new(on_change);
        poll::subscribe("files", policy, move || {
            let panel = panel.clone();
            let on_change = on_change.clone();
            async move {
                let before = panel.view().await;
                if let Err(e) = panel.load_files().await {
                    log::error!("Polling file list failed: {:?}", e);
                    return PollOutcome::Failed;
                }
                let after = panel.view().await;
                if after != before {
                    on_change(&after);
                }
                if panel.is_busy().await {
                    PollOutcome::Busy
                } else {
                    PollOutcome::Idle
                }
            }
        })
    }
}
