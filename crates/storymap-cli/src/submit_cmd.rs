//! `storymap submit` and `storymap history`: the persistence pipeline and
//! its audit log.

use std::path::Path;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use storymap_core::pipeline::{PgStore, PlanningStore, SubmitOutcome, submit_action};
use storymap_db::models::ActionRecord;

use crate::action_cmds::load_actions;

fn parse_project(project: &str) -> Result<Uuid> {
    Uuid::parse_str(project).with_context(|| format!("invalid project ID: {project}"))
}

/// Submit each action in `file`, in order. Stops at the first store error;
/// rejections are reported and do not stop the run.
pub async fn run_submit(
    pool: &PgPool,
    file: &Path,
    project: &str,
    idempotency_key: Option<&str>,
) -> Result<()> {
    let project_id = parse_project(project)?;
    let actions = load_actions(file)?;
    if idempotency_key.is_some() && actions.len() > 1 {
        bail!("--idempotency-key applies to a single action; the file holds {}", actions.len());
    }

    let store = PgStore::new(pool.clone());
    let mut rejected = 0;
    for raw in actions {
        let outcome = submit_action(&store, project_id, raw, idempotency_key).await?;
        match &outcome {
            SubmitOutcome::Accepted { record, delta } => {
                println!("accepted  {}  {}", record.action_id, delta.summary);
            }
            SubmitOutcome::Rejected { record, rejection } => {
                rejected += 1;
                println!("rejected  {}  {}: {rejection}", record.action_id, record.action_type);
            }
            SubmitOutcome::Replayed { record } => {
                println!(
                    "replayed  {}  (originally {})",
                    record.action_id, record.validation_status
                );
            }
        }
    }

    if rejected > 0 {
        bail!("{rejected} action(s) rejected");
    }
    Ok(())
}

/// Print the audit log of a project, oldest first.
pub async fn run_history(pool: &PgPool, project: &str) -> Result<()> {
    let project_id = parse_project(project)?;
    let store = PgStore::new(pool.clone());
    let records = store.list_action_records(project_id).await?;

    if records.is_empty() {
        println!("No actions recorded for project {project_id}.");
        return Ok(());
    }

    println!("Actions ({}):", records.len());
    for record in &records {
        println!("  {}", history_line(record));
    }
    Ok(())
}

fn history_line(record: &ActionRecord) -> String {
    let time = record.created_at.format("%Y-%m-%d %H:%M:%S");
    let mut line = format!(
        "[{time}] {} {} {}",
        record.validation_status, record.action_type, record.action_id
    );
    if let Some(key) = &record.idempotency_key {
        line.push_str(&format!(" key={key}"));
    }
    if let Some(reason) = &record.rejection_reason {
        line.push_str(&format!(" -- {reason}"));
    }
    line
}
