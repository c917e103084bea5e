//! Subcommand execution against the state-file store.

use std::path::Path;
use std::sync::Arc;

use nfa_storage::{AttachmentRecord, MemoryStorage, UserRecord};
use nfa_workflow::{
    ChannelDispatcher, Clock, DispatchWorker, Dispatcher, DocumentGenerator, JsonDocumentGenerator,
    LogNotifier, NewAttachment, Nfa, NfaManager, NfaQuery, PendingApproval, Section1Data,
    Section2Data, StorageDirectory, Submission, SystemClock, UserDirectory, WorkflowConfig,
    WorkflowEntry,
};
use serde::Serialize;

use crate::{state, CliError, Commands, OutputFormat};

/// Store, manager and dispatch worker for one invocation.
struct App {
    storage: Arc<MemoryStorage>,
    manager: Arc<NfaManager<MemoryStorage>>,
    directory: StorageDirectory<MemoryStorage>,
    dispatcher: ChannelDispatcher,
    worker: DispatchWorker<MemoryStorage>,
    documents: Arc<JsonDocumentGenerator<MemoryStorage>>,
}

impl App {
    fn open(state_path: &Path, config: &WorkflowConfig) -> Result<Self, CliError> {
        let storage = Arc::new(state::load(state_path)?);
        let (dispatcher, rx) = ChannelDispatcher::new();
        let manager = Arc::new(
            NfaManager::builder(storage.clone(), Arc::new(dispatcher.clone()))
                .numbering(config.numbering.clone())
                .build(),
        );
        let documents = Arc::new(JsonDocumentGenerator::new(
            storage.clone(),
            config.documents.output_dir.clone(),
        ));
        let worker = DispatchWorker::new(
            rx,
            manager.clone(),
            Arc::new(LogNotifier),
            documents.clone(),
        );
        Ok(Self {
            directory: StorageDirectory::new(storage.clone()),
            storage,
            manager,
            dispatcher,
            worker,
            documents,
        })
    }

    /// Run queued side effects, including document generation and the
    /// finalization it triggers.
    async fn settle(&mut self) {
        let processed = self.worker.drain().await;
        if processed > 0 {
            tracing::debug!(processed, "dispatch queue drained");
        }
    }

    async fn close(mut self, state_path: &Path) -> Result<(), CliError> {
        self.settle().await;
        state::save(&self.storage, state_path).await
    }

    fn dispatch_notices(&self, submission: &Submission) {
        for notice in submission.notices.iter().cloned() {
            self.dispatcher.dispatch(notice);
        }
    }
}

struct Printer {
    output: OutputFormat,
    quiet: bool,
}

impl Printer {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<(), CliError> {
        if self.quiet {
            return Ok(());
        }
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => println!("{}", text(value)),
        }
        Ok(())
    }
}

pub(crate) async fn run(
    command: Commands,
    state_path: &Path,
    config: &WorkflowConfig,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let mut app = App::open(state_path, config)?;
    let out = Printer { output, quiet };

    match command {
        Commands::UserAdd {
            id,
            name,
            email,
            username,
            designation,
            department,
            roles,
        } => {
            let user = UserRecord {
                username: username.unwrap_or_else(|| id.clone()),
                id,
                name,
                email,
                designation,
                department,
                roles,
                created_at: SystemClock.timestamp(),
            };
            app.directory.register(user.clone()).await?;
            out.emit(&user, |u| format!("user {} registered ({})", u.id, u.email))?;
        }

        Commands::Create {
            requestor,
            requestor_name,
            data,
        } => {
            let section1 = match data {
                Some(path) => Section1Data::from_json(read_json(&path)?)?,
                None => Section1Data::default(),
            };
            let requestor_name = match requestor_name {
                Some(name) => name,
                None => app
                    .directory
                    .lookup(&requestor)
                    .await?
                    .map(|entry| entry.name)
                    .unwrap_or_else(|| requestor.clone()),
            };
            let nfa = app.manager.create(&requestor, &requestor_name, section1).await?;
            out.emit(&nfa, |n| format!("created {} ({})", n.id, n.status))?;
        }

        Commands::Show { nfa_id } => {
            let nfa = app.manager.get(&nfa_id).await?;
            out.emit(&nfa, nfa_detail)?;
        }

        Commands::List {
            requestor,
            status,
            skip,
            limit,
        } => {
            let nfas = app
                .manager
                .list(&NfaQuery {
                    requestor_id: requestor,
                    status,
                    skip,
                    limit,
                })
                .await?;
            out.emit(&nfas, |ns| lines(ns, nfa_line, "no NFAs"))?;
        }

        Commands::UpdateSection1 { nfa_id, data } => {
            let section1 = Section1Data::from_json(read_json(&data)?)?;
            let nfa = app.manager.update_section1(&nfa_id, section1).await?;
            out.emit(&nfa, |n| format!("section 1 of {} updated", n.id))?;
        }

        Commands::SubmitSection1 { nfa_id, actor } => {
            let submission = app.manager.submit_section1(&nfa_id, &actor).await?;
            app.dispatch_notices(&submission);
            out.emit(&submission, submission_text)?;
        }

        Commands::UpdateSection2 {
            nfa_id,
            actor,
            data,
        } => {
            let section2 = Section2Data::from_json(read_json(&data)?)?;
            let nfa = app.manager.update_section2(&nfa_id, &actor, section2).await?;
            out.emit(&nfa, |n| format!("section 2 of {} updated", n.id))?;
        }

        Commands::SubmitSection2 { nfa_id, actor } => {
            let submission = app.manager.submit_section2(&nfa_id, &actor).await?;
            app.dispatch_notices(&submission);
            out.emit(&submission, submission_text)?;
        }

        Commands::Act {
            workflow_id,
            approver,
            action,
            comments,
        } => {
            let entry = app
                .manager
                .engine()
                .process_approval(&workflow_id, &approver, action, comments)
                .await?;
            app.settle().await;
            let nfa = app.manager.get(&entry.nfa_id).await?;
            let result = Decision { entry, nfa };
            out.emit(&result, |d| {
                format!(
                    "workflow {} {} by {}; NFA {} is {}",
                    d.entry.id, d.entry.status, d.entry.approver_id, d.nfa.id, d.nfa.status
                )
            })?;
        }

        Commands::Pending { approver_id } => {
            let pending = app.manager.engine().pending_approvals(&approver_id).await?;
            out.emit(&pending, |ps| lines(ps, pending_line, "no pending approvals"))?;
        }

        Commands::History { nfa_id } => {
            let history = app.manager.engine().approval_history(&nfa_id).await?;
            out.emit(&history, |hs| lines(hs, entry_line, "no approval history"))?;
        }

        Commands::Stats { approver_id } => {
            let stats = app.manager.engine().approver_stats(&approver_id).await?;
            out.emit(&stats, |s| {
                format!(
                    "total {}  pending {}  approved {}  rejected {}",
                    s.total, s.pending, s.approved, s.rejected
                )
            })?;
        }

        Commands::Finalize { nfa_id, document } => {
            let document = match document {
                Some(document) => document,
                None => {
                    app.manager.ensure_finalizable(&nfa_id).await?;
                    app.documents.generate(&nfa_id).await?
                }
            };
            let nfa = app.manager.finalize(&nfa_id, &document).await?;
            out.emit(&nfa, |n| {
                format!(
                    "{} approved as {}",
                    n.id,
                    n.nfa_number.as_deref().unwrap_or("-")
                )
            })?;
        }

        Commands::Revise { nfa_id, actor } => {
            let nfa = app.manager.revise(&nfa_id, &actor).await?;
            out.emit(&nfa, |n| format!("created {} (revision of {nfa_id})", n.id))?;
        }

        Commands::Delete { nfa_id, actor } => {
            let deleted = app.manager.delete(&nfa_id, &actor).await?;
            out.emit(&serde_json::json!({ "deleted": deleted }), |_| {
                if deleted {
                    format!("deleted {nfa_id}")
                } else {
                    format!("{nfa_id} not found, nothing deleted")
                }
            })?;
        }

        Commands::Attach {
            nfa_id,
            file,
            uploaded_by,
        } => {
            let metadata = std::fs::metadata(&file).map_err(|e| {
                CliError::Input(format!("error reading file '{}': {}", file.display(), e))
            })?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = app
                .manager
                .add_attachment(
                    &nfa_id,
                    NewAttachment {
                        filename,
                        file_path: file.display().to_string(),
                        file_size: metadata.len(),
                        uploaded_by,
                    },
                )
                .await?;
            out.emit(&record, attachment_line)?;
        }

        Commands::Attachments { nfa_id } => {
            let attachments = app.manager.attachments(&nfa_id).await?;
            out.emit(&attachments, |a| lines(a, attachment_line, "no attachments"))?;
        }
    }

    app.close(state_path).await
}

#[derive(Serialize)]
struct Decision {
    entry: WorkflowEntry,
    nfa: Nfa,
}

fn read_json(path: &Path) -> Result<serde_json::Value, CliError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("error reading file '{}': {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

// ── Text rendering ────────────────────────────────────────────────────────────

fn lines<T>(items: &[T], line: fn(&T) -> String, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items.iter().map(line).collect::<Vec<_>>().join("\n")
}

fn nfa_line(nfa: &Nfa) -> String {
    format!(
        "{}  {:<18} {:<14} {}",
        nfa.id,
        nfa.status.as_str(),
        nfa.nfa_number.as_deref().unwrap_or("-"),
        nfa.section1.subject_item.as_deref().unwrap_or("")
    )
}

fn nfa_detail(nfa: &Nfa) -> String {
    let mut out = format!(
        "NFA {}\n  status:    {} ({})\n  requestor: {} ({})\n  subject:   {}",
        nfa.id,
        nfa.status,
        nfa.current_stage,
        nfa.requestor_name,
        nfa.requestor_id,
        nfa.section1.subject_item.as_deref().unwrap_or("-"),
    );
    if let Some(number) = &nfa.nfa_number {
        out.push_str(&format!("\n  number:    {number}"));
    }
    if let Some(path) = &nfa.document_path {
        out.push_str(&format!("\n  document:  {path}"));
    }
    if let Some(source) = &nfa.revision_of {
        out.push_str(&format!("\n  revises:   {source}"));
    }
    out
}

fn entry_line(entry: &WorkflowEntry) -> String {
    format!(
        "{}  section {} #{}  {:<12} {:<10} {}",
        entry.id,
        entry.section,
        entry.sequence,
        entry.approver_id,
        entry.status.as_str(),
        entry.comments.as_deref().unwrap_or("")
    )
}

fn pending_line(pending: &PendingApproval) -> String {
    let subject = pending
        .nfa
        .as_ref()
        .and_then(|nfa| nfa.section1.subject_item.as_deref())
        .unwrap_or("-");
    format!(
        "{}  nfa {}  section {}  {}",
        pending.entry.id, pending.entry.nfa_id, pending.entry.section, subject
    )
}

fn attachment_line(attachment: &AttachmentRecord) -> String {
    format!(
        "{}  {}  {} bytes  by {}",
        attachment.id, attachment.filename, attachment.file_size, attachment.uploaded_by
    )
}

fn submission_text(submission: &Submission) -> String {
    let mut out = format!(
        "{} is {}; {} approval(s) requested",
        submission.nfa.id,
        submission.nfa.status,
        submission.workflows.len()
    );
    for entry in &submission.workflows {
        out.push('\n');
        out.push_str(&entry_line(entry));
    }
    out
}
