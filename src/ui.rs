// UI layer: `dialoguer` menus with `indicatif` spinners around network calls.
// Every operation failure is printed and the menu carries on; only terminal
// I/O errors end the session.

use crate::auth::{AuthToken, AuthorizationPrompt, Credential, TokenAcquirer};
use crate::client::{Executor, ExecutorConfig};
use crate::config::AppConfig;
use crate::error::{AuthError, ServiceError};
use crate::model::{DatasetSchema, RowBatch, Workspace};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Sign-in through the system browser. The user pastes back the address the
/// provider redirected to, which carries the authorization code.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserPrompt;

impl AuthorizationPrompt for BrowserPrompt {
    fn sign_in(&self, authorize_url: &Url) -> Result<Url, AuthError> {
        println!("Opening the sign-in page in your browser. If nothing opens, visit:");
        println!("  {}", authorize_url.to_string().underlined());
        if let Err(e) = open::that(authorize_url.as_str()) {
            warn!(error = %e, "could not launch a browser");
        }
        println!("After signing in, copy the address of the page you land on.");

        let answer: String = Input::new()
            .with_prompt("Redirected URL (empty to cancel)")
            .allow_empty(true)
            .interact_text()
            .map_err(AuthError::Prompt)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AuthError::Cancelled);
        }
        Url::parse(answer).map_err(|source| AuthError::InvalidRedirect {
            url: answer.to_string(),
            source,
        })
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Login mode menu, then the operation menu until the user exits.
pub fn main_menu(config: AppConfig) -> Result<()> {
    let Some(credential) = choose_login(&config)? else {
        return Ok(());
    };
    let Some(token) = sign_in(&config, &credential)? else {
        return Ok(());
    };

    println!();
    println!("- Initializing client with generated auth token...");
    let executor = Executor::configure(
        config.api_base.clone(),
        ExecutorConfig::new(config.auth.user_agent.as_str(), &token)
            .with_timeout(config.auth.timeout),
    )
    .context("Failed to initialize the API client")?;

    loop {
        let items = [
            "List workspaces",
            "Find dataset in a workspace",
            "Find dataset in my workspace",
            "Create dataset from schema file",
            "Append rows from file",
            "Exit",
        ];
        let selection = Select::new().items(&items).default(0).interact()?;
        let outcome = match selection {
            0 => show_workspaces(&executor),
            1 => show_workspace_dataset(&executor),
            2 => show_own_dataset(&executor),
            3 => create_dataset(&executor),
            4 => append_rows(&executor),
            _ => break,
        };
        if let Err(e) = outcome {
            println!("   - {} {:#}", "Error:".red(), e);
        }
    }
    println!();
    println!("- Done!");
    Ok(())
}

fn choose_login(config: &AppConfig) -> Result<Option<Credential>> {
    println!("Login method?");
    let items = [
        "Interactive login prompt",
        "Saved credential from configuration",
        "Exit",
    ];
    let selection = Select::new().items(&items).default(0).interact()?;
    match selection {
        0 => {
            println!("Executing using an interactive prompt for credentials.");
            Ok(Some(Credential::Interactive))
        }
        1 => match config.saved_credential() {
            Ok(credential) => {
                println!("Executing using saved credential.");
                Ok(Some(credential))
            }
            Err(e) => {
                println!("   - {} {}", "Error:".red(), e);
                println!("     Set PBI_USERNAME and PBI_PASSWORD or the [credential] table.");
                Ok(None)
            }
        },
        _ => Ok(None),
    }
}

/// Runs the token flow; a failure is reported here and ends the session
/// without touching the API.
fn sign_in(config: &AppConfig, credential: &Credential) -> Result<Option<AuthToken>> {
    println!("- Performing App authentication to request API access token...");
    let acquirer = TokenAcquirer::new(&config.auth).context("Failed to prepare sign-in")?;

    let result = match credential {
        Credential::Interactive => acquirer.acquire(credential, &BrowserPrompt),
        Credential::ResourceOwnerPassword { .. } => {
            let pb = spinner("Requesting token...");
            let result = acquirer.acquire(credential, &BrowserPrompt);
            pb.finish_and_clear();
            result
        }
    };

    match result {
        Ok(token) => {
            println!("   - {}", "API Authorization token received.".green());
            Ok(Some(token))
        }
        Err(e) => {
            println!("   - {}", "Unable to retrieve API Authorization token.".red());
            if !matches!(e, AuthError::Cancelled) {
                println!("     Usually this is due to an invalid username or password.");
            }
            println!("     Details: {:#}", anyhow::Error::new(e));
            Ok(None)
        }
    }
}

fn report_failure(e: ServiceError) -> anyhow::Error {
    if let Some(status) = e.status() {
        println!("   - Response code received: {status}");
    }
    anyhow::Error::new(e).context("API access error")
}

fn show_workspaces(executor: &Executor) -> Result<()> {
    println!();
    println!("- Retrieving data from: {}groups", executor.root());
    let pb = spinner("Retrieving workspaces...");
    let result = executor.workspaces().list();
    pb.finish_and_clear();

    let workspaces = result.map_err(report_failure)?;
    if workspaces.is_empty() {
        println!("   - No workspaces received.");
        return Ok(());
    }
    println!("      - Workspaces received: {}", workspaces.len());
    for ws in &workspaces {
        print_workspace(ws);
    }
    Ok(())
}

fn print_workspace(ws: &Workspace) {
    println!();
    println!("{}", "-".repeat(82).dark_grey());
    println!();
    let fields = [
        ("Workspace ID", ws.id.clone()),
        ("Workspace Name", ws.name.clone()),
        ("Workspace Description", ws.description.clone()),
        ("Capacity ID", ws.capacity_id.clone()),
        ("Dataflow Storage ID", ws.dataflow_storage_id.clone()),
        ("On Dedicated Capacity", ws.is_on_dedicated_capacity.to_string()),
        ("Read Only", ws.is_read_only.to_string()),
        ("Orphaned", ws.is_orphaned.to_string()),
        ("Workspace State", ws.state.clone()),
        ("Workspace Type", ws.workspace_type.clone()),
    ];
    for (label, value) in fields {
        println!("{} {}", format!("{label}:").bold(), value);
    }
}

fn show_workspace_dataset(executor: &Executor) -> Result<()> {
    let workspace_id: String = Input::new().with_prompt("Workspace ID").interact_text()?;
    let pb = spinner("Retrieving datasets...");
    let result = executor.datasets().list_for_workspace(workspace_id.trim());
    pb.finish_and_clear();

    let dataset = result.map_err(report_failure)?;
    println!("Dataset ID: {}", dataset.id.clone().bold());
    if !dataset.name.is_empty() {
        println!("Dataset Name: {}", dataset.name);
    }
    Ok(())
}

fn show_own_dataset(executor: &Executor) -> Result<()> {
    let pb = spinner("Retrieving datasets...");
    let result = executor.datasets().first_in_my_workspace();
    pb.finish_and_clear();

    let dataset = result.map_err(report_failure)?;
    println!("Dataset ID: {}", dataset.id.clone().bold());
    if !dataset.name.is_empty() {
        println!("Dataset Name: {}", dataset.name);
    }
    Ok(())
}

fn read_json_file(prompt: &str) -> Result<String> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    let path = PathBuf::from(path.trim());
    std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}

fn create_dataset(executor: &Executor) -> Result<()> {
    let workspace_id: String = Input::new().with_prompt("Workspace ID").interact_text()?;
    let schema = DatasetSchema::from_json(&read_json_file("Dataset schema JSON file")?)
        .context("Invalid dataset schema")?;

    let pb = spinner("Creating dataset...");
    let result = executor
        .dataset_creator()
        .create(workspace_id.trim(), &schema);
    pb.finish_and_clear();

    let ack = result.map_err(report_failure)?;
    println!("Dataset {} created ({})", schema.name.clone().bold(), ack.status);
    Ok(())
}

fn append_rows(executor: &Executor) -> Result<()> {
    let dataset_id: String = Input::new().with_prompt("Dataset ID").interact_text()?;
    let table: String = Input::new().with_prompt("Table name").interact_text()?;
    let rows = RowBatch::from_json(&read_json_file("Rows JSON file")?).context("Invalid rows file")?;

    let confirmed = Confirm::new()
        .with_prompt(format!("Append {} rows to {}?", rows.len(), table.trim()))
        .default(true)
        .interact()?;
    if !confirmed {
        return Ok(());
    }

    let pb = spinner("Appending rows...");
    let result = executor.rows().append(dataset_id.trim(), table.trim(), &rows);
    pb.finish_and_clear();

    let ack = result.map_err(report_failure)?;
    println!("   - {} ({})", "Rows appended.".green(), ack.status);
    Ok(())
}
