//! Session controller.
//!
//! Owns the single mutable session (current project, selected file, chat
//! transcript, busy flags, last error) and applies every user action as a
//! replace-on-success transition. The lock is never held across an `.await`,
//! so a refine and a chat question can be in flight at the same time; each
//! operation class is still limited to one call at a time by its busy flag.

use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::client::BackendClient;
use crate::errors::{ForgeError, NoticeKind, Operation, Result};
use crate::project::{Attachment, ChatMessage, ExtensionFile, Project};

pub const CHAT_APOLOGY: &str =
    "I'm having a little trouble connecting right now. Please try again in a few seconds!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Files,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    /// Consumed by the initial generate call.
    Idea,
    /// Consumed by the next refine call.
    Refine,
}

/// A dismissible, user-visible error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub generating: bool,
    pub importing: bool,
    pub refining: bool,
    pub chatting: bool,
    pub exporting: bool,
}

impl BusyFlags {
    fn slot(&mut self, op: Operation) -> &mut bool {
        match op {
            Operation::Generate => &mut self.generating,
            Operation::Import => &mut self.importing,
            Operation::Refine => &mut self.refining,
            Operation::Chat => &mut self.chatting,
            Operation::Export => &mut self.exporting,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub project: Option<Project>,
    /// Path into `project.files`; re-resolved after every replacement.
    pub selected: Option<String>,
    pub transcript: Vec<ChatMessage>,
    pub busy: BusyFlags,
    pub last_error: Option<Notice>,
    pub view: View,
    pub unread_chat: bool,
    pub idea_image: Option<Attachment>,
    pub refine_image: Option<Attachment>,
}

impl SessionState {
    pub fn selected_file(&self) -> Option<&ExtensionFile> {
        let path = self.selected.as_deref()?;
        self.project.as_ref()?.file(path)
    }

    fn install(&mut self, name: String, description: String, files: Vec<ExtensionFile>) {
        let project = Project::new(name, description, files);
        tracing::info!(id = %project.id, name = %project.name, files = project.files.len(), "project installed");
        self.selected = project.files.first().map(|f| f.path.clone());
        self.project = Some(project);
        self.view = View::Files;
    }

    fn push_assistant(&mut self, msg: ChatMessage) {
        self.transcript.push(msg);
        if self.view != View::Chat {
            self.unread_chat = true;
        }
    }
}

struct BusyGuard<'a> {
    state: &'a Mutex<SessionState>,
    op: Operation,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().busy.slot(self.op) = false;
    }
}

pub struct Session {
    client: BackendClient,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(client: BackendClient) -> Self {
        Self { client, state: Mutex::new(SessionState::default()) }
    }

    /// Copy of the whole state for rendering.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn selected_file(&self) -> Option<ExtensionFile> {
        self.state.lock().selected_file().cloned()
    }

    fn begin(&self, op: Operation) -> Result<BusyGuard<'_>> {
        let mut s = self.state.lock();
        let flag = s.busy.slot(op);
        if *flag {
            return Err(ForgeError::Busy(op));
        }
        *flag = true;
        Ok(BusyGuard { state: &self.state, op })
    }

    /// Called once an operation that can raise a notice is past its preconditions.
    fn clear_notice(&self) {
        self.state.lock().last_error = None;
    }

    /// Records the error as the current notice and hands it back.
    fn fail(&self, err: ForgeError) -> ForgeError {
        tracing::warn!(error = %err, "operation failed");
        self.state.lock().last_error = Some(Notice { kind: err.notice_kind(), message: err.to_string() });
        err
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ForgeError::LocalIo(format!("background task failed: {e}")))
            .and_then(|r| r)
            .map_err(|e| self.fail(e))
    }

    fn current_project(&self) -> Result<Project> {
        self.state.lock().project.clone().ok_or(ForgeError::NoProject)
    }

    pub async fn create_from_prompt(&self, idea: &str) -> Result<()> {
        if idea.trim().is_empty() {
            return Err(ForgeError::InvalidInput("describe the extension first".into()));
        }
        let _guard = self.begin(Operation::Generate)?;
        self.clear_notice();
        let used = self.state.lock().idea_image.clone();
        let image = used.as_ref().map(Attachment::inline);

        let generated = self
            .client
            .generate(idea, image.as_ref())
            .await
            .map_err(|e| self.fail(e))?;

        let mut s = self.state.lock();
        s.install(generated.name, generated.description, generated.files);
        if s.idea_image == used {
            s.idea_image = None;
        }
        Ok(())
    }

    pub async fn import_archive(&self, data: Bytes, upload_name: Option<String>) -> Result<()> {
        let _guard = self.begin(Operation::Import)?;
        self.clear_notice();
        let unpacked = self
            .blocking(move || archive::unpack(&data, upload_name.as_deref()))
            .await?;

        self.state
            .lock()
            .install(unpacked.name, unpacked.description, unpacked.files);
        Ok(())
    }

    /// Replaces files, name and description of the current project in place
    /// (same id, same creation time) and records the exchange in the transcript.
    pub async fn refine(&self, instruction: &str) -> Result<()> {
        if instruction.trim().is_empty() {
            return Err(ForgeError::InvalidInput("describe the change first".into()));
        }
        let _guard = self.begin(Operation::Refine)?;
        let (id, files, used) = {
            let mut s = self.state.lock();
            let project = s.project.as_ref().ok_or(ForgeError::NoProject)?;
            let picked = (project.id, project.files.clone(), s.refine_image.clone());
            s.last_error = None;
            picked
        };
        let image = used.as_ref().map(Attachment::inline);

        let refined = self
            .client
            .refine(&files, instruction, image.as_ref())
            .await
            .map_err(|e| self.fail(e))?;

        let mut guard = self.state.lock();
        let s = &mut *guard;
        let Some(project) = s.project.as_mut().filter(|p| p.id == id) else {
            drop(guard);
            return Err(self.fail(ForgeError::ProjectReplaced));
        };

        project.files = refined.files;
        project.name = refined.name;
        project.description = refined.description;

        s.selected = s
            .selected
            .take()
            .filter(|path| project.contains(path))
            .or_else(|| project.files.first().map(|f| f.path.clone()));

        s.transcript.push(ChatMessage::user(format!("Change request: {}", instruction.trim())));
        s.transcript.push(ChatMessage::assistant(format!("### Done!\n\n{}", refined.explanation), None));
        s.view = View::Chat;
        s.unread_chat = false;
        if s.refine_image == used {
            s.refine_image = None;
        }
        tracing::info!(id = %project.id, files = project.files.len(), "project refined");
        Ok(())
    }

    /// The question is recorded immediately; the answer (or an apology when
    /// the backend fails) is appended when the call settles. Chat never
    /// raises or clears a notice.
    pub async fn ask(&self, question: &str) -> Result<ChatMessage> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ForgeError::InvalidInput("ask a question first".into()));
        }
        let _guard = self.begin(Operation::Chat)?;
        let files = {
            let mut s = self.state.lock();
            let files = s.project.as_ref().ok_or(ForgeError::NoProject)?.files.clone();
            s.transcript.push(ChatMessage::user(question));
            files
        };

        let reply = match self.client.converse(&files, question).await {
            Ok(answer) => ChatMessage::assistant(answer.text, answer.sources),
            Err(e) => {
                tracing::warn!(error = %e, "chat failed; answering with apology");
                ChatMessage::assistant(CHAT_APOLOGY, None)
            }
        };

        self.state.lock().push_assistant(reply.clone());
        Ok(reply)
    }

    /// Packs the project and saves the archive into `dir`.
    pub async fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let _guard = self.begin(Operation::Export)?;
        let project = self.current_project()?;
        self.clear_notice();
        let dir = dir.to_path_buf();
        let path = self
            .blocking(move || archive::export(&project)?.write_to(&dir))
            .await?;
        tracing::info!(path = %path.display(), "archive exported");
        Ok(path)
    }

    pub fn select_file(&self, path: &str) -> Result<()> {
        let mut s = self.state.lock();
        let project = s.project.as_ref().ok_or(ForgeError::NoProject)?;
        if !project.contains(path) {
            return Err(ForgeError::UnknownFile(path.to_string()));
        }
        s.selected = Some(path.to_string());
        Ok(())
    }

    pub fn set_view(&self, view: View) {
        let mut s = self.state.lock();
        s.view = view;
        if view == View::Chat {
            s.unread_chat = false;
        }
    }

    pub fn attach(&self, slot: AttachmentSlot, attachment: Attachment) {
        let mut s = self.state.lock();
        match slot {
            AttachmentSlot::Idea => s.idea_image = Some(attachment),
            AttachmentSlot::Refine => s.refine_image = Some(attachment),
        }
    }

    pub fn clear_attachment(&self, slot: AttachmentSlot) {
        let mut s = self.state.lock();
        match slot {
            AttachmentSlot::Idea => s.idea_image = None,
            AttachmentSlot::Refine => s.refine_image = None,
        }
    }

    pub fn dismiss_error(&self) {
        self.state.lock().last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::project::Role;
    use crate::test_utils::{project_json, ScriptedProvider};
    use crate::wire::LlmReply;
    use std::io::{Cursor, Write};
    use std::time::Duration;

    fn session() -> (Session, ScriptedProvider) {
        let p = ScriptedProvider::new();
        let client = BackendClient::new(Box::new(p.clone()), &Config::default());
        (Session::new(client), p)
    }

    async fn with_project(files: &[(&str, &str)]) -> (Session, ScriptedProvider) {
        let (s, p) = session();
        p.push_text(project_json("Tab Saver", files, None));
        s.create_from_prompt("save my tabs").await.unwrap();
        (s, p)
    }

    fn selection_is_valid(s: &Session) -> bool {
        let st = s.snapshot();
        match (&st.project, &st.selected) {
            (Some(p), Some(path)) => p.contains(path),
            (None, None) => true,
            _ => false,
        }
    }

    #[tokio::test]
    async fn create_installs_project_and_selects_first_file() {
        let (s, p) = session();
        s.attach(AttachmentSlot::Idea, Attachment::from_bytes(b"img", "image/png", "mock.png"));
        s.set_view(View::Chat);
        p.push_text(project_json("Tab Saver", &[("manifest.json", "{}"), ("bg.js", "")], None));

        s.create_from_prompt("save my tabs").await.unwrap();

        let st = s.snapshot();
        let project = st.project.as_ref().unwrap();
        assert_eq!(project.name, "Tab Saver");
        assert_eq!(st.selected.as_deref(), Some("manifest.json"));
        assert_eq!(st.view, View::Files);
        assert!(st.idea_image.is_none());
        assert!(!st.busy.generating);
        assert_eq!(p.requests()[0].images().count(), 1);
    }

    #[tokio::test]
    async fn failed_create_keeps_existing_project_and_attachment() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        let before = s.snapshot().project.unwrap();
        s.attach(AttachmentSlot::Idea, Attachment::from_bytes(b"img", "image/png", "x.png"));
        p.push_error(ForgeError::Transport("offline".into()));

        let err = s.create_from_prompt("another").await.unwrap_err();
        assert!(matches!(err, ForgeError::Transport(_)));

        let st = s.snapshot();
        assert_eq!(st.project.as_ref().unwrap().id, before.id);
        assert!(st.idea_image.is_some());
        assert_eq!(st.last_error.as_ref().unwrap().kind, NoticeKind::Backend);
        s.dismiss_error();
        assert!(s.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn blank_prompt_changes_nothing() {
        let (s, p) = session();
        assert!(matches!(s.create_from_prompt("  ").await, Err(ForgeError::InvalidInput(_))));
        assert!(p.requests().is_empty());
        assert!(s.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn refine_preserves_identity_and_selected_path() {
        let (s, p) = with_project(&[("manifest.json", "{}"), ("popup.js", "a();")]).await;
        s.select_file("popup.js").unwrap();
        let before = s.snapshot().project.unwrap();
        s.attach(AttachmentSlot::Refine, Attachment::from_bytes(b"img", "image/png", "x.png"));

        p.push_text(project_json(
            "Tab Saver Pro",
            &[("manifest.json", "{}"), ("options.html", ""), ("popup.js", "b();")],
            Some("Added an options page."),
        ));
        s.refine("add options").await.unwrap();

        let st = s.snapshot();
        let project = st.project.as_ref().unwrap();
        assert_eq!(project.id, before.id);
        assert_eq!(project.created_at, before.created_at);
        assert_eq!(project.name, "Tab Saver Pro");
        assert_eq!(project.files.len(), 3);
        assert_eq!(st.selected.as_deref(), Some("popup.js"));
        assert_eq!(st.selected_file().unwrap().content, "b();");
        assert_eq!(st.view, View::Chat);
        assert!(st.refine_image.is_none());

        assert_eq!(st.transcript.len(), 2);
        assert_eq!(st.transcript[0], ChatMessage::user("Change request: add options"));
        assert_eq!(st.transcript[1].role, Role::Assistant);
        assert!(st.transcript[1].text.ends_with("Added an options page."));
    }

    #[tokio::test]
    async fn refine_falls_back_to_first_file_when_selection_disappears() {
        let (s, p) = with_project(&[("manifest.json", "{}"), ("old.js", "")]).await;
        s.select_file("old.js").unwrap();
        p.push_text(project_json("T", &[("new.js", ""), ("manifest.json", "{}")], Some("Renamed.")));

        s.refine("rename old.js").await.unwrap();
        assert_eq!(s.snapshot().selected.as_deref(), Some("new.js"));
        assert!(selection_is_valid(&s));
    }

    #[tokio::test]
    async fn malformed_refine_leaves_files_untouched() {
        let (s, p) = with_project(&[("manifest.json", "{\"a\":1}"), ("c.js", "x")]).await;
        s.attach(AttachmentSlot::Refine, Attachment::from_bytes(b"img", "image/png", "x.png"));
        let before = s.snapshot();
        p.push_text(project_json("T", &[("c.js", "y")], None));

        let err = s.refine("change").await.unwrap_err();
        assert!(matches!(err, ForgeError::MalformedResponse(_)));

        let after = s.snapshot();
        assert_eq!(after.project.as_ref().unwrap().files, before.project.as_ref().unwrap().files);
        assert_eq!(after.selected, before.selected);
        assert!(after.transcript.is_empty());
        assert!(after.refine_image.is_some());
        assert!(after.last_error.is_some());
        assert!(!after.busy.refining);
    }

    #[tokio::test]
    async fn refine_without_project_is_rejected() {
        let (s, _p) = session();
        assert!(matches!(s.refine("x").await, Err(ForgeError::NoProject)));
        assert!(!s.snapshot().busy.refining);
    }

    #[tokio::test]
    async fn refine_result_is_dropped_if_project_was_replaced_meanwhile() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        p.push_delayed_text(project_json("T", &[("b.js", "2")], Some("done")), Duration::from_millis(50));
        p.push_text(project_json("Other", &[("z.js", "9")], None));

        let mut refine = Box::pin(s.refine("change"));
        assert!(futures::poll!(refine.as_mut()).is_pending());
        s.create_from_prompt("something else").await.unwrap();

        assert!(matches!(refine.await, Err(ForgeError::ProjectReplaced)));
        let st = s.snapshot();
        assert_eq!(st.project.as_ref().unwrap().name, "Other");
        assert!(st.transcript.is_empty());
    }

    #[tokio::test]
    async fn chat_records_question_and_answer_with_sources() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        p.push_reply(LlmReply {
            text: "Use a content script.".into(),
            citations: vec![crate::wire::Citation { title: None, uri: "https://d.c".into() }],
        });

        let reply = s.ask("how to change page colors?").await.unwrap();
        assert_eq!(reply.sources.as_ref().unwrap()[0].title, "Reference");

        let st = s.snapshot();
        assert_eq!(st.transcript.len(), 2);
        assert_eq!(st.transcript[0], ChatMessage::user("how to change page colors?"));
        assert_eq!(st.transcript[1], reply);
        assert!(st.unread_chat);
        s.set_view(View::Chat);
        assert!(!s.snapshot().unread_chat);
    }

    #[tokio::test]
    async fn chat_failure_becomes_apology_not_error() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        p.push_error(ForgeError::Transport("dns".into()));

        let reply = s.ask("anyone there?").await.unwrap();
        assert_eq!(reply.text, CHAT_APOLOGY);
        let st = s.snapshot();
        assert!(st.project.is_some());
        assert!(st.last_error.is_none());
        assert_eq!(st.transcript.len(), 2);
        assert_eq!(st.transcript[0].role, Role::User);
    }

    #[tokio::test]
    async fn one_call_per_class_but_chat_and_refine_overlap() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        p.push_delayed_text(project_json("T", &[("a.js", "2")], Some("ok")), Duration::from_millis(50));
        p.push_text("answer");

        let mut refine = Box::pin(s.refine("first"));
        assert!(futures::poll!(refine.as_mut()).is_pending());
        assert!(s.snapshot().busy.refining);

        assert!(matches!(s.refine("second").await, Err(ForgeError::Busy(Operation::Refine))));
        s.ask("meanwhile?").await.unwrap();
        refine.await.unwrap();

        // completion order, not issue order
        let texts: Vec<String> = s.snapshot().transcript.into_iter().map(|m| m.text).collect();
        assert_eq!(texts[0], "meanwhile?");
        assert_eq!(texts[1], "answer");
        assert_eq!(texts[2], "Change request: first");
        assert_eq!(s.snapshot().project.unwrap().files[0].content, "2");
    }

    fn assert_extends(seen: &mut Vec<ChatMessage>, s: &Session) {
        let now = s.snapshot().transcript;
        assert!(now.len() >= seen.len());
        assert_eq!(&now[..seen.len()], &seen[..]);
        *seen = now;
    }

    #[tokio::test]
    async fn transcript_only_grows() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        let mut seen: Vec<ChatMessage> = Vec::new();

        p.push_text("one");
        s.ask("q1").await.unwrap();
        assert_extends(&mut seen, &s);

        p.push_text(project_json("T", &[("a.js", "2")], None));
        let _ = s.refine("bad").await;
        assert_extends(&mut seen, &s);

        p.push_text(project_json("T", &[("a.js", "3")], Some("e")));
        s.refine("good").await.unwrap();
        assert_extends(&mut seen, &s);

        p.push_error(ForgeError::Transport("x".into()));
        s.ask("q2").await.unwrap();
        assert_extends(&mut seen, &s);

        assert_eq!(seen.len(), 6);
    }

    #[tokio::test]
    async fn import_installs_project_from_archive() {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        for (name, body) in [
            ("manifest.json", r#"{"name":"Sticky Notes","description":"Quick notes"}"#),
            ("content.js", "note();"),
            ("popup.html", "<div></div>"),
        ] {
            w.start_file(name, opts).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
        let data = Bytes::from(w.finish().unwrap().into_inner());

        let (s, _p) = session();
        s.import_archive(data, Some("sticky.zip".into())).await.unwrap();

        let st = s.snapshot();
        let project = st.project.as_ref().unwrap();
        assert_eq!(project.name, "Sticky Notes");
        assert_eq!(project.description, "Quick notes");
        let langs: Vec<&str> = project.files.iter().map(|f| f.language.as_str()).collect();
        assert_eq!(langs, ["json", "javascript", "html"]);
        assert_eq!(st.selected.as_deref(), Some("manifest.json"));
    }

    #[tokio::test]
    async fn empty_import_installs_nothing() {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        w.add_directory("ext/", opts).unwrap();
        w.start_file("__MACOSX/ext/._a.js", opts).unwrap();
        let data = Bytes::from(w.finish().unwrap().into_inner());

        let (s, _p) = with_project(&[("keep.js", "1")]).await;
        let err = s.import_archive(data, None).await.unwrap_err();
        assert!(matches!(err, ForgeError::EmptyArchive));

        let st = s.snapshot();
        assert_eq!(st.project.as_ref().unwrap().files[0].path, "keep.js");
        assert_eq!(st.last_error.as_ref().unwrap().kind, NoticeKind::Archive);
        assert!(!st.busy.importing);
    }

    #[tokio::test]
    async fn export_writes_an_archive_that_round_trips() {
        let (s, _p) = with_project(&[("manifest.json", "{}"), ("js/a.js", "ä")]).await;
        let dir = tempfile::tempdir().unwrap();

        let path = s.export_to(dir.path()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "Tab_Saver.zip");
        assert!(!s.snapshot().busy.exporting);

        let bytes = std::fs::read(&path).unwrap();
        let back = archive::unpack(&bytes, None).unwrap();
        assert_eq!(back.files, s.snapshot().project.unwrap().files);
    }

    #[tokio::test]
    async fn export_failure_is_a_local_fault() {
        let (s, _p) = with_project(&[("a.js", "1")]).await;
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = s.export_to(&blocker).await.unwrap_err();
        assert!(matches!(err, ForgeError::LocalIo(_)));
        assert_eq!(s.snapshot().last_error.unwrap().kind, NoticeKind::Local);
    }

    #[tokio::test]
    async fn rejected_commands_keep_the_current_notice() {
        let (s, p) = session();
        p.push_error(ForgeError::Transport("offline".into()));
        assert!(s.create_from_prompt("tabs").await.is_err());
        let notice = s.snapshot().last_error.unwrap();

        assert!(matches!(s.ask("hello?").await, Err(ForgeError::NoProject)));
        assert!(matches!(s.refine("x").await, Err(ForgeError::NoProject)));
        assert!(matches!(s.export_to(Path::new(".")).await, Err(ForgeError::NoProject)));

        let st = s.snapshot();
        assert_eq!(st.last_error, Some(notice));
        assert!(st.transcript.is_empty());
        assert!(!st.busy.chatting);
    }

    #[tokio::test]
    async fn chat_leaves_an_unrelated_notice_alone() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(s.export_to(&blocker).await.is_err());

        p.push_text("sure");
        s.ask("still there?").await.unwrap();
        assert_eq!(s.snapshot().last_error.unwrap().kind, NoticeKind::Local);

        s.export_to(dir.path()).await.unwrap();
        assert!(s.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn second_question_waits_for_the_first() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        p.push_delayed_text("first answer", Duration::from_millis(50));

        let mut first = Box::pin(s.ask("one"));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(s.snapshot().busy.chatting);
        assert!(matches!(s.ask("two").await, Err(ForgeError::Busy(Operation::Chat))));

        first.await.unwrap();
        let texts: Vec<String> = s.snapshot().transcript.into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["one", "first answer"]);
        assert!(!s.snapshot().busy.chatting);
    }

    #[tokio::test]
    async fn second_generate_is_rejected_while_one_runs() {
        let (s, p) = session();
        p.push_delayed_text(project_json("Slow", &[("a.js", "")], None), Duration::from_millis(50));

        let mut first = Box::pin(s.create_from_prompt("slow one"));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(matches!(
            s.create_from_prompt("fast one").await,
            Err(ForgeError::Busy(Operation::Generate))
        ));

        first.await.unwrap();
        assert_eq!(s.snapshot().project.unwrap().name, "Slow");
        assert_eq!(p.requests().len(), 1);
    }

    #[tokio::test]
    async fn import_and_export_are_single_flight() {
        let (s, _p) = with_project(&[("a.js", "1")]).await;
        let dir = tempfile::tempdir().unwrap();

        let importing = s.begin(Operation::Import).unwrap();
        let err = s.import_archive(Bytes::from_static(b"PK"), None).await.unwrap_err();
        assert!(matches!(err, ForgeError::Busy(Operation::Import)));
        drop(importing);
        assert!(!s.snapshot().busy.importing);

        let exporting = s.begin(Operation::Export).unwrap();
        let err = s.export_to(dir.path()).await.unwrap_err();
        assert!(matches!(err, ForgeError::Busy(Operation::Export)));
        drop(exporting);
        s.export_to(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn image_attached_mid_flight_survives() {
        let (s, p) = with_project(&[("a.js", "1")]).await;
        let first = Attachment::from_bytes(b"one", "image/png", "one.png");
        let second = Attachment::from_bytes(b"two", "image/png", "two.png");
        s.attach(AttachmentSlot::Refine, first);
        p.push_delayed_text(project_json("T", &[("a.js", "2")], Some("ok")), Duration::from_millis(50));

        let mut refine = Box::pin(s.refine("use the mockup"));
        assert!(futures::poll!(refine.as_mut()).is_pending());
        s.attach(AttachmentSlot::Refine, second.clone());
        refine.await.unwrap();
        assert_eq!(s.snapshot().refine_image, Some(second));

        s.attach(AttachmentSlot::Idea, Attachment::from_bytes(b"a", "image/png", "a.png"));
        p.push_delayed_text(project_json("New", &[("b.js", "")], None), Duration::from_millis(50));
        let mut create = Box::pin(s.create_from_prompt("another"));
        assert!(futures::poll!(create.as_mut()).is_pending());
        s.clear_attachment(AttachmentSlot::Idea);
        let third = Attachment::from_bytes(b"c", "image/png", "c.png");
        s.attach(AttachmentSlot::Idea, third.clone());
        create.await.unwrap();
        assert_eq!(s.snapshot().idea_image, Some(third));
    }

    #[tokio::test]
    async fn select_file_validates_path() {
        let (s, _p) = with_project(&[("a.js", "1"), ("b.css", "")]).await;
        s.select_file("b.css").unwrap();
        assert!(matches!(s.select_file("nope.js"), Err(ForgeError::UnknownFile(_))));
        assert_eq!(s.selected_file().unwrap().path, "b.css");
        assert!(selection_is_valid(&s));
    }
}
