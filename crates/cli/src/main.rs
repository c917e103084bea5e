mod commands;
mod state;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use nfa_workflow::{
    ApprovalAction, ConfigError, DispatchError, NfaStatus, WorkflowConfig, WorkflowError,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// NFA (Note For Approval) workflow.
#[derive(Parser)]
#[command(name = "nfa", version, about = "NFA approval workflow")]
struct Cli {
    /// JSON file holding the store between runs
    #[arg(long, global = true, default_value = "nfa-state.json")]
    state: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Register a user in the directory
    UserAdd {
        /// User id
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Login name (defaults to the id)
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        designation: Option<String>,
        #[arg(long)]
        department: Option<String>,
        /// Role; may be repeated
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Create a draft NFA
    Create {
        /// Requestor user id
        #[arg(long)]
        requestor: String,
        /// Requestor display name (defaults to the directory name)
        #[arg(long)]
        requestor_name: Option<String>,
        /// Section 1 JSON payload
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Show one NFA
    Show { nfa_id: String },

    /// List NFAs, newest first
    List {
        #[arg(long)]
        requestor: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<NfaStatus>,
        #[arg(long, default_value = "0")]
        skip: usize,
        /// Maximum number of results (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Replace section 1 of a draft
    UpdateSection1 {
        nfa_id: String,
        /// Section 1 JSON payload
        #[arg(long)]
        data: PathBuf,
    },

    /// Send section 1 to its approvers
    SubmitSection1 {
        nfa_id: String,
        /// Acting user id (must be the requestor)
        #[arg(long)]
        actor: String,
    },

    /// Replace section 2 once section 1 is approved
    UpdateSection2 {
        nfa_id: String,
        /// Acting user id (needs the coordinator role)
        #[arg(long)]
        actor: String,
        /// Section 2 JSON payload
        #[arg(long)]
        data: PathBuf,
    },

    /// Send section 2 to its approvers
    SubmitSection2 {
        nfa_id: String,
        /// Acting user id (needs the coordinator role)
        #[arg(long)]
        actor: String,
    },

    /// Record an approver's decision on a workflow entry
    Act {
        workflow_id: String,
        /// Acting approver's user id
        #[arg(long)]
        approver: String,
        /// approve, reject or send_back
        #[arg(long, value_parser = parse_action)]
        action: ApprovalAction,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Pending approvals of an approver
    Pending { approver_id: String },

    /// Approval history of an NFA
    History { nfa_id: String },

    /// Decision counts of an approver
    Stats { approver_id: String },

    /// Assign the final number of a section-2-approved NFA
    Finalize {
        nfa_id: String,
        /// Existing document reference; generated when omitted
        #[arg(long)]
        document: Option<String>,
    },

    /// Start a new draft from a sent-back NFA
    Revise {
        nfa_id: String,
        /// Acting user id (must be the requestor)
        #[arg(long)]
        actor: String,
    },

    /// Delete an NFA with its workflow entries and attachments
    Delete {
        nfa_id: String,
        /// Acting user id (needs the superadmin role)
        #[arg(long)]
        actor: String,
    },

    /// Record an attachment for an NFA
    Attach {
        nfa_id: String,
        /// File to attach
        file: PathBuf,
        #[arg(long)]
        uploaded_by: String,
    },

    /// List the attachments of an NFA
    Attachments { nfa_id: String },
}

fn parse_status(s: &str) -> Result<NfaStatus, String> {
    s.parse().map_err(|e: WorkflowError| e.to_string())
}

fn parse_action(s: &str) -> Result<ApprovalAction, String> {
    s.parse().map_err(|e: WorkflowError| e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("state file '{path}': {reason}")]
    State { path: String, reason: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Input(String),
}

fn main() {
    let cli = Cli::parse();

    let config = match WorkflowConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_tracing(&config, cli.quiet);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to create tokio runtime: {e}"),
                cli.output,
                cli.quiet,
            );
            process::exit(1);
        }
    };

    let result = rt.block_on(commands::run(
        cli.command,
        &cli.state,
        &config,
        cli.output,
        cli.quiet,
    ));
    if let Err(e) = result {
        report_error(&e.to_string(), cli.output, cli.quiet);
        process::exit(1);
    }
}

/// Logs go to stderr. `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &WorkflowConfig, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
