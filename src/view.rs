//! In-memory view containers for the chat window, the history sidebar and
//! the knowledge file panel, plus their HTML and terminal renderings.
//!
//! Every string that reaches markup goes through [`escape_html`] first.

use crate::models::{Chat, FileEntry, FileStatus, Role};
use std::fmt;
use uuid::Uuid;

pub const GREETING: &str = "你好！请问有什么关于设备故障的问题吗？";
pub const THINKING_GRAPH: &str = "正在检索图谱并思考...";
pub const THINKING_WEB: &str = "正在联网搜索并思考...";
pub const SEND_FAILED: &str = "Error occurred.";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes message text and turns newlines into line breaks.
pub fn format_message_text(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bubble {
    pub id: Option<String>,
    pub role: Role,
    pub text: String,
    // Placeholders are rendered with a spinner
    pub pending: bool,
}

impl Bubble {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            text: text.into(),
            pending: false,
        }
    }

    pub fn to_html(&self) -> String {
        let id_attr = self
            .id
            .as_deref()
            .map(|id| format!(" id=\"{}\"", escape_html(id)))
            .unwrap_or_default();
        let spinner = if self.pending {
            "<i class=\"fas fa-spinner fa-spin\"></i> "
        } else {
            ""
        };
        format!(
            "<div class=\"message {role}\"{id_attr}><div class=\"avatar\"><i class=\"fas {icon}\"></i></div><div class=\"text\">{spinner}{text}</div></div>",
            role = self.role.as_str(),
            icon = self.role.icon(),
            text = format_message_text(&self.text),
        )
    }
}

/// The message container of the chat window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatView {
    bubbles: Vec<Bubble>,
    // Index of the bubble scrolled into view, None when empty
    scrolled_to: Option<usize>,
}

impl ChatView {
    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn clear(&mut self) {
        self.bubbles.clear();
        self.scrolled_to = None;
    }

    pub fn append(&mut self, bubble: Bubble) {
        self.bubbles.push(bubble);
        self.scroll_to_bottom();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scrolled_to = self.bubbles.len().checked_sub(1);
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.scrolled_to == self.bubbles.len().checked_sub(1)
    }

    pub fn find(&self, id: &str) -> Option<&Bubble> {
        self.bubbles.iter().find(|b| b.id.as_deref() == Some(id))
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|b| b.id.as_deref() != Some(id));
        if self.bubbles.len() == before {
            return false;
        }
        self.scrolled_to = self.scrolled_to.map(|i| i.min(self.bubbles.len().saturating_sub(1)));
        if self.bubbles.is_empty() {
            self.scrolled_to = None;
        }
        true
    }

    /// Replaces the contents of a bubble, returns false if it is gone.
    pub fn set_text(&mut self, id: &str, text: impl Into<String>) -> bool {
        match self.bubbles.iter_mut().find(|b| b.id.as_deref() == Some(id)) {
            Some(bubble) => {
                bubble.text = text.into();
                bubble.pending = false;
                true
            }
            None => false,
        }
    }

    pub fn to_html(&self) -> String {
        self.bubbles.iter().map(Bubble::to_html).collect()
    }
}

impl fmt::Display for ChatView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bubble in &self.bubbles {
            let who = match bubble.role {
                Role::User => "you",
                Role::Bot => "bot",
            };
            let marker = if bubble.pending { "… " } else { "" };
            writeln!(f, "[{}] {}{}", who, marker, bubble.text)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidebarEntry {
    pub id: String,
    pub title: String,
    pub active: bool,
}

/// The chat history list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sidebar {
    entries: Vec<SidebarEntry>,
}

impl Sidebar {
    pub fn entries(&self) -> &[SidebarEntry] {
        &self.entries
    }

    pub fn active(&self) -> Option<&SidebarEntry> {
        self.entries.iter().find(|e| e.active)
    }

    /// Tears down and rebuilds the list, one entry per chat.
    pub fn rebuild(&mut self, chats: &[Chat], current_chat_id: &str) {
        self.entries = chats
            .iter()
            .map(|chat| SidebarEntry {
                id: chat.id.clone(),
                title: chat.title.clone(),
                active: chat.id == current_chat_id,
            })
            .collect();
    }

    pub fn to_html(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let id = escape_html(&entry.id);
                format!(
                    "<div class=\"history-item{active}\" data-chat-id=\"{id}\"><span class=\"chat-title\">{title}</span><i class=\"fas fa-trash del-chat\" data-chat-id=\"{id}\"></i></div>",
                    active = if entry.active { " active" } else { "" },
                    title = escape_html(&entry.title),
                )
            })
            .collect()
    }
}

impl fmt::Display for Sidebar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let marker = if entry.active { '*' } else { ' ' };
            writeln!(f, "{} {}  {}", marker, entry.id, entry.title)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Badge {
    Uploading,
    Processing,
    Done,
    Failed,
}

impl Badge {
    pub fn label(&self) -> &'static str {
        match self {
            Badge::Uploading => "上传中...",
            Badge::Processing => "处理中",
            Badge::Done => "完成",
            Badge::Failed => "失败",
        }
    }

    fn css_class(&self) -> &'static str {
        match self {
            Badge::Uploading | Badge::Processing => "status-processing",
            Badge::Done => "status-done",
            Badge::Failed => "status-error",
        }
    }
}

impl From<FileStatus> for Badge {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::Processing => Badge::Processing,
            FileStatus::Done => Badge::Done,
            FileStatus::Error => Badge::Failed,
        }
    }
}

/// Identity of a file row: a backend id, or the correlation id of an
/// upload that has not shown up in the authoritative list yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RowKey {
    File(String),
    Upload(Uuid),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRow {
    pub key: RowKey,
    pub name: String,
    pub badge: Badge,
    pub deletable: bool,
}

impl FileRow {
    pub fn uploading(correlation_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            key: RowKey::Upload(correlation_id),
            name: name.into(),
            badge: Badge::Uploading,
            deletable: false,
        }
    }

    pub fn to_html(&self) -> String {
        let name = escape_html(&self.name);
        let spinner = if self.badge == Badge::Processing {
            "<i class=\"fas fa-spinner fa-spin\"></i> "
        } else {
            ""
        };
        let delete = match (&self.key, self.deletable) {
            (RowKey::File(id), true) => format!(
                "<i class=\"fas fa-trash file-del-btn\" data-file-id=\"{}\" title=\"删除\"></i>",
                escape_html(id)
            ),
            _ => String::new(),
        };
        format!(
            "<div class=\"file-item\"><div class=\"file-info\" title=\"{name}\"><i class=\"fas fa-file-alt file-icon\"></i><span class=\"file-name\">{name}</span></div><span class=\"status-badge {class}\">{spinner}{label}</span>{delete}</div>",
            class = self.badge.css_class(),
            label = self.badge.label(),
        )
    }
}

impl From<&FileEntry> for FileRow {
    fn from(entry: &FileEntry) -> Self {
        Self {
            key: RowKey::File(entry.id.clone()),
            name: entry.name.clone(),
            badge: entry.status.into(),
            // No deleting a file while the pipeline still works on it
            deletable: entry.status != FileStatus::Processing,
        }
    }
}

/// The knowledge file panel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileListView {
    rows: Vec<FileRow>,
}

impl FileListView {
    pub fn rows(&self) -> &[FileRow] {
        &self.rows
    }

    pub fn prepend(&mut self, row: FileRow) {
        self.rows.insert(0, row);
    }

    pub fn rebuild(&mut self, rows: Vec<FileRow>) {
        self.rows = rows;
    }

    pub fn to_html(&self) -> String {
        self.rows.iter().map(FileRow::to_html).collect()
    }
}

impl fmt::Display for FileListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let id = match &row.key {
                RowKey::File(id) => id.as_str(),
                RowKey::Upload(_) => "-",
            };
            writeln!(f, "{:<10} {}  ({})", row.badge.label(), row.name, id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn chat(id: &str, title: &str) -> Chat {
        Chat {
            id: id.into(),
            title: title.into(),
            msgs: vec![Message {
                role: Role::User,
                content: "hi".into(),
            }],
        }
    }

    #[test]
    fn message_text_is_escaped_before_line_breaks() {
        assert_eq!(
            format_message_text("<script>alert('x')</script>\nok & done"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;<br>ok &amp; done"
        );
    }

    #[test]
    fn sidebar_marks_only_the_current_chat() {
        let mut sidebar = Sidebar::default();
        sidebar.rebuild(&[chat("1", "a"), chat("2", "b"), chat("3", "c")], "2");
        assert_eq!(sidebar.entries().len(), 3);
        assert_eq!(sidebar.entries().iter().filter(|e| e.active).count(), 1);
        assert_eq!(sidebar.active().map(|e| e.id.as_str()), Some("2"));

        sidebar.rebuild(&[chat("1", "a")], "99");
        assert!(sidebar.active().is_none());
    }

    #[test]
    fn sidebar_html_escapes_titles_and_ids() {
        let mut sidebar = Sidebar::default();
        sidebar.rebuild(&[chat("x\"y", "<b>bold</b>")], "x\"y");
        let html = sidebar.to_html();
        assert!(html.contains("history-item active"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains("data-chat-id=\"x&quot;y\""));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn chat_view_tracks_bottom_and_placeholders() {
        let mut view = ChatView::default();
        view.append(Bubble::new(Role::User, "q"));
        view.append(Bubble {
            id: Some("loading-1".into()),
            role: Role::Bot,
            text: THINKING_GRAPH.into(),
            pending: true,
        });
        assert!(view.is_scrolled_to_bottom());
        assert!(view.to_html().contains("fa-spinner"));

        assert!(view.set_text("loading-1", SEND_FAILED));
        assert_eq!(view.find("loading-1").map(|b| b.pending), Some(false));
        assert!(view.remove("loading-1"));
        assert!(!view.remove("loading-1"));
        assert_eq!(view.bubbles().len(), 1);
        assert!(view.is_scrolled_to_bottom());
    }

    #[test]
    fn processing_rows_hide_delete() {
        let processing = FileRow::from(&FileEntry {
            id: "f1".into(),
            name: "manual.pdf".into(),
            status: FileStatus::Processing,
        });
        let failed = FileRow::from(&FileEntry {
            id: "f2".into(),
            name: "notes.txt".into(),
            status: FileStatus::Error,
        });
        assert!(!processing.deletable);
        assert!(!processing.to_html().contains("file-del-btn"));
        assert!(failed.to_html().contains("data-file-id=\"f2\""));
        assert!(failed.to_html().contains("失败"));
    }

    #[test]
    fn temp_row_goes_on_top() {
        let mut list = FileListView::default();
        list.rebuild(vec![FileRow::from(&FileEntry {
            id: "f1".into(),
            name: "old.pdf".into(),
            status: FileStatus::Done,
        })]);
        list.prepend(FileRow::uploading(Uuid::new_v4(), "manual.pdf"));
        assert_eq!(list.rows()[0].name, "manual.pdf");
        assert_eq!(list.rows()[0].badge.label(), "上传中...");
    }
}
