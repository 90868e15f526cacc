use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::model::{Chat, Handshake, Role, Status, Task};
use crate::store::{MarketDb, chats, events, handshakes, profiles, tasks};

#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub task: Task,
    pub handshake: Handshake,
    pub chat: Chat,
}

/// Bind the calling freelancer to an open task.
///
/// The handshake insert is the first-writer-wins gate; the open -> assigned
/// update is additionally guarded on the observed status. Either guard
/// failing aborts the transaction, so no handshake outlives a lost race.
pub fn accept(
    db: &mut MarketDb,
    task_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Acceptance> {
    let tx = db.immediate()?;

    let freelancer = profiles::by_user(&tx, user_id)?;
    if freelancer.role == Role::Client {
        return Err(MarketError::Forbidden("only freelancers can accept tasks"));
    }

    let task = tasks::get(&tx, task_id)?;
    if task.status != Status::Open {
        return Err(MarketError::TaskUnavailable(task.status));
    }
    if task.is_nearby && !freelancer.is_verified() {
        return Err(MarketError::VerificationRequired);
    }

    let handshake = handshakes::insert(&tx, task_id, &freelancer.id, now)?;

    if !tasks::compare_and_set_status(&tx, task_id, Status::Open, Status::Assigned, now)? {
        tracing::warn!(task_id, freelancer = %freelancer.id, "status changed under accept; rolling back");
        return Err(MarketError::AlreadyTaken(task_id.to_string()));
    }

    let chat = chats::open_for_task(&tx, task_id, now)?;
    events::append(
        &tx,
        task_id,
        Some(&freelancer.id),
        "accepted",
        Some(Status::Open),
        Some(Status::Assigned),
        now,
    )?;
    let task = tasks::get(&tx, task_id)?;
    tx.commit()?;

    tracing::info!(task_id, freelancer = %freelancer.id, handshake = %handshake.id, "task accepted");
    Ok(Acceptance {
        task,
        handshake,
        chat,
    })
}
