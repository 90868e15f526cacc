use chrono::{DateTime, Utc};

use crate::error::{MarketError, Result};
use crate::model::{Role, Status, Task};
use crate::payment::MAX_BUDGET;
use crate::store::tasks::NewTask;
use crate::store::{MarketDb, events, profiles, tasks};

fn validate(new: &NewTask) -> Result<()> {
    if new.title.trim().is_empty() {
        return Err(MarketError::Validation("title must be non-empty".into()));
    }
    if new.budget <= 0 || new.budget > MAX_BUDGET {
        return Err(MarketError::Validation(format!(
            "budget must be between 1 and {MAX_BUDGET}"
        )));
    }
    if let Some(point) = &new.location
        && !point.is_valid()
    {
        return Err(MarketError::Validation(format!(
            "invalid location {}, {}",
            point.latitude, point.longitude
        )));
    }
    if new.is_nearby && new.location.is_none() {
        return Err(MarketError::Validation(
            "nearby tasks need a location".into(),
        ));
    }
    Ok(())
}

/// Post a new open task on behalf of the client identified by `user_id`.
pub fn create_task(
    db: &mut MarketDb,
    user_id: &str,
    new: &NewTask,
    now: DateTime<Utc>,
) -> Result<Task> {
    validate(new)?;

    let tx = db.immediate()?;
    let client = profiles::by_user(&tx, user_id)?;
    if client.role != Role::Client {
        return Err(MarketError::Forbidden("only clients can post tasks"));
    }

    let mut new = new.clone();
    new.title = new.title.trim().to_string();
    let task = tasks::insert(&tx, &client.id, &new, now)?;
    events::append(&tx, &task.id, Some(&client.id), "created", None, Some(Status::Open), now)?;
    tx.commit()?;

    tracing::info!(task_id = %task.id, client = %client.id, budget = task.budget, nearby = task.is_nearby, "task created");
    Ok(task)
}
