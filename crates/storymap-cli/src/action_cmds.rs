//! Offline handlers that run the engine against JSON snapshots.
//!
//! Implements:
//! - `storymap validate <actions> --state <state>` -- report validation errors
//! - `storymap preview <actions> --state <state>`  -- print the batch deltas
//! - `storymap apply <actions> --state <state>`    -- write the resulting state

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use storymap_core::action::normalize_actions;
use storymap_core::{
    BatchValidation, PlanningAction, PlanningState, RawAction, apply_action_batch,
    preview_action_batch, validate_action_batch,
};

// -----------------------------------------------------------------------
// Input files
// -----------------------------------------------------------------------

pub fn load_state(path: &Path) -> Result<PlanningState> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse state file: {}", path.display()))
}

/// Read an actions file: a single action, an array of actions, or an
/// envelope with an `actions` array.
pub fn load_actions(path: &Path) -> Result<Vec<RawAction>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read actions file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse actions file: {}", path.display()))?;
    raw_actions(value)
}

fn raw_actions(value: Value) -> Result<Vec<RawAction>> {
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("actions") {
            Some(Value::Array(items)) => items,
            Some(_) => bail!("\"actions\" must be an array"),
            None => vec![Value::Object(obj)],
        },
        _ => bail!("expected an action object or an array of actions"),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            RawAction::from_value(v).with_context(|| format!("entry {i} is not an action object"))
        })
        .collect()
}

/// Load both files, normalize the actions against the state's project and
/// validate them as one batch.
fn prepare(
    actions: &Path,
    state: &Path,
    stop_on_error: bool,
) -> Result<(PlanningState, Vec<RawAction>, BatchValidation)> {
    let state = load_state(state)?;
    let raw = normalize_actions(load_actions(actions)?, Some(state.project.id));
    let validation = validate_action_batch(&raw, &state, stop_on_error);
    Ok((state, raw, validation))
}

fn valid_or_bail(validation: &BatchValidation) -> Result<Vec<PlanningAction>> {
    match validation.valid_actions() {
        Some(actions) => Ok(actions),
        None => {
            for e in &validation.errors {
                eprintln!("  {e}");
            }
            bail!("{} validation error(s); nothing applied", validation.errors.len())
        }
    }
}

// -----------------------------------------------------------------------
// storymap validate
// -----------------------------------------------------------------------

pub fn run_validate(actions: &Path, state: &Path, stop_on_error: bool) -> Result<()> {
    let (_, raw, validation) = prepare(actions, state, stop_on_error)?;

    for (i, (action, result)) in raw.iter().zip(&validation.per_action).enumerate() {
        let verdict = if result.is_valid() { "ok" } else { "invalid" };
        println!("[{i}] {} {}: {verdict}", action.action_type, action.id);
        for e in &result.errors {
            println!("      {e}");
        }
    }
    let checked = validation.per_action.len();
    if checked < raw.len() {
        println!("({} action(s) not checked after the first failure)", raw.len() - checked);
    }

    if !validation.valid {
        bail!("{} validation error(s)", validation.errors.len());
    }
    println!("All {} action(s) valid.", raw.len());
    Ok(())
}

// -----------------------------------------------------------------------
// storymap preview
// -----------------------------------------------------------------------

pub fn run_preview(actions: &Path, state: &Path) -> Result<()> {
    let (state, _, validation) = prepare(actions, state, false)?;
    let actions = valid_or_bail(&validation)?;

    let Some(deltas) = preview_action_batch(&actions, &state) else {
        // Reuse the batch apply to find out which action broke.
        if let Err(failure) = apply_action_batch(&actions, &state) {
            bail!("preview failed: {failure}");
        }
        bail!("preview failed");
    };

    let rendered = serde_json::to_string_pretty(&deltas).context("failed to serialize preview")?;
    println!("{rendered}");
    Ok(())
}

// -----------------------------------------------------------------------
// storymap apply
// -----------------------------------------------------------------------

pub fn run_apply(actions: &Path, state: &Path, output: Option<&Path>) -> Result<()> {
    let (state, _, validation) = prepare(actions, state, false)?;
    let actions = valid_or_bail(&validation)?;

    let applied = apply_action_batch(&actions, &state).context("batch was not applied")?;
    let rendered = serde_json::to_string_pretty(&applied.final_state)
        .context("failed to serialize state")?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write state file: {}", path.display()))?;
            println!(
                "Applied {} action(s); state written to {}",
                applied.applied_count,
                path.display()
            );
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    use storymap_db::models::{Activity, Project, Workflow};

    fn state_with_activity() -> (PlanningState, Uuid) {
        let mut state = PlanningState::empty(Project::new(Uuid::new_v4(), "Maps"));
        let workflow = Workflow {
            id: Uuid::new_v4(),
            project_id: state.project.id,
            title: "Onboard".into(),
            description: None,
            build_state: None,
            position: 0,
        };
        let activity = Activity {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            title: "Sign up".into(),
            color: None,
            position: 0,
        };
        let activity_id = activity.id;
        state.workflows.insert(workflow.id, workflow);
        state.activities.insert(activity.id, activity);
        (state, activity_id)
    }

    fn write_json(dir: &Path, name: &str, value: &impl serde::Serialize) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn raw_actions_accepts_all_three_shapes() {
        let one = json!({"action_type": "createWorkflow", "payload": {"title": "A"}});
        assert_eq!(raw_actions(one.clone()).unwrap().len(), 1);
        assert_eq!(raw_actions(json!([one.clone(), one.clone()])).unwrap().len(), 2);
        assert_eq!(
            raw_actions(json!({"type": "actions", "actions": [one]})).unwrap().len(),
            1
        );
        assert!(raw_actions(json!("createWorkflow")).is_err());
        assert!(raw_actions(json!([1, 2])).is_err());
    }

    #[test]
    fn apply_writes_new_state() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (state, activity) = state_with_activity();
        let state_path = write_json(tmp.path(), "state.json", &state);
        let actions_path = write_json(
            tmp.path(),
            "actions.json",
            &json!([
                {"id": "c1", "action_type": "createCard",
                 "target_ref": {"workflow_activity_id": activity},
                 "payload": {"id": "card-a", "title": "Email sign-up"}},
                {"id": "c2", "action_type": "updateCard",
                 "target_ref": {"card_id": "card-a"},
                 "payload": {"priority": 2}}
            ]),
        );
        let out = tmp.path().join("out.json");

        run_apply(&actions_path, &state_path, Some(&out)).unwrap();
        let next = load_state(&out).unwrap();
        assert_eq!(next.card_count(), 1);
        assert_eq!(next.cards.values().next().unwrap().priority, 2);
    }

    #[test]
    fn invalid_batch_is_not_applied() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (state, _) = state_with_activity();
        let state_path = write_json(tmp.path(), "state.json", &state);
        let actions_path = write_json(
            tmp.path(),
            "actions.json",
            &json!({"action_type": "createCard",
                    "target_ref": {"workflow_activity_id": Uuid::new_v4()},
                    "payload": {"title": "Orphan"}}),
        );
        let out = tmp.path().join("out.json");

        assert!(run_apply(&actions_path, &state_path, Some(&out)).is_err());
        assert!(!out.exists());
        assert!(run_validate(&actions_path, &state_path, false).is_err());
    }
}
