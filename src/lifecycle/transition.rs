use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::lifecycle::check_transition;
use crate::model::{OtpType, Profile, Status, Task};
use crate::payment::{self, PaymentBreakdown};
use crate::store::{MarketDb, events, handshakes, otps, profiles, tasks};

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub task_id: String,
    pub target: Status,
    pub otp: Option<String>,
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(task_id: impl Into<String>, target: Status) -> Self {
        Self {
            task_id: task_id.into(),
            target,
            otp: None,
            reason: None,
        }
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub task: Task,
    pub previous_status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Client,
    Freelancer,
    Outsider,
}

/// Which party may request a move into `target`.
fn permitted(target: Status, party: Party) -> bool {
    match target {
        Status::InProgress | Status::Review => party == Party::Freelancer,
        Status::Completed | Status::Disputed => party == Party::Client,
        Status::Cancelled => party != Party::Outsider,
        Status::Open | Status::Assigned => false,
    }
}

fn forbidden_message(target: Status) -> &'static str {
    match target {
        Status::InProgress | Status::Review => "only the assigned freelancer can make this change",
        Status::Completed | Status::Disputed => "only the client can make this change",
        _ => "only the task's client or assigned freelancer can make this change",
    }
}

fn gate(target: Status) -> Option<OtpType> {
    match target {
        Status::InProgress => Some(OtpType::Start),
        Status::Review => Some(OtpType::End),
        _ => None,
    }
}

/// Apply a requested status change.
///
/// Checks run in order: table, assignment route, caller party, OTP. The OTP
/// is consumed and the status written inside the same transaction, and the
/// status write only succeeds against the status observed at the start.
pub fn transition(
    db: &mut MarketDb,
    req: &TransitionRequest,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome> {
    let tx = db.immediate()?;

    let caller = profiles::by_user(&tx, user_id)?;
    let task = tasks::get(&tx, &req.task_id)?;
    let from = task.status;

    check_transition(from, req.target)?;
    if req.target == Status::Assigned {
        return Err(MarketError::AssignmentRequiresAccept);
    }

    let assigned = handshakes::active_for_task(&tx, &task.id)?;
    let party = if task.client_id == caller.id {
        Party::Client
    } else if assigned.as_ref().is_some_and(|h| h.freelancer_id == caller.id) {
        Party::Freelancer
    } else {
        Party::Outsider
    };
    if !permitted(req.target, party) {
        return Err(MarketError::Forbidden(forbidden_message(req.target)));
    }

    if let Some(otp_type) = gate(req.target) {
        let code = req
            .otp
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(MarketError::OtpRequired(otp_type))?;
        if !otps::consume(&tx, &task.id, otp_type, code.trim(), now)? {
            return Err(MarketError::InvalidOtp);
        }
    }

    if !tasks::compare_and_set_status(&tx, &task.id, from, req.target, now)? {
        tracing::warn!(task_id = %task.id, expected = %from, "status changed concurrently");
        return Err(MarketError::StaleStatus {
            task_id: task.id,
            expected: from,
        });
    }

    let mut payment = None;
    match req.target {
        Status::Cancelled => {
            handshakes::cancel_active(&tx, &task.id, req.reason.as_deref())?;
        }
        Status::Completed => {
            let freelancer = match &assigned {
                Some(h) => Some(profiles::get(&tx, &h.freelancer_id)?),
                None => None,
            };
            if let Some(freelancer) = &freelancer {
                profiles::increment_completed(&tx, &freelancer.id, now)?;
            }
            payment = Some(payment_for(task.budget, freelancer.as_ref()));
        }
        _ => {}
    }

    events::append(
        &tx,
        &task.id,
        Some(&caller.id),
        "status_changed",
        Some(from),
        Some(req.target),
        now,
    )?;
    let task = tasks::get(&tx, &task.id)?;
    tx.commit()?;

    tracing::info!(task_id = %task.id, from = %from, to = %task.status, actor = %caller.id, "transition committed");
    Ok(TransitionOutcome {
        task,
        previous_status: from,
        payment,
    })
}

fn payment_for(budget: i64, freelancer: Option<&Profile>) -> PaymentBreakdown {
    let verified = freelancer.is_some_and(Profile::is_verified);
    payment::breakdown(budget, payment::commission_rate(verified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{accept, issue_otp};
    use crate::model::{Mode, Role, VerificationStatus};
    use crate::store::tasks::NewTask;
    use chrono::Duration;

    struct Fixture {
        db: MarketDb,
        task_id: String,
    }

    impl Fixture {
        fn new(worker_verification: VerificationStatus) -> Self {
            Self::with_budget(worker_verification, 50_000)
        }

        fn with_budget(worker_verification: VerificationStatus, budget: i64) -> Self {
            let mut db = MarketDb::open_memory().unwrap();
            let now = Utc::now();
            let client =
                profiles::insert(db.conn(), "client", Role::Client, None, VerificationStatus::None, now)
                    .unwrap();
            profiles::insert(db.conn(), "worker", Role::Freelancer, None, worker_verification, now)
                .unwrap();
            profiles::insert(db.conn(), "other", Role::Freelancer, None, VerificationStatus::Verified, now)
                .unwrap();
            let task = tasks::insert(
                db.conn(),
                &client.id,
                &NewTask {
                    title: "Paint fence".into(),
                    description: None,
                    budget,
                    mode: Mode::Standard,
                    is_nearby: false,
                    location: None,
                    address_text: None,
                },
                now,
            )
            .unwrap();
            accept(&mut db, &task.id, "worker", now).unwrap();
            Self { db, task_id: task.id }
        }

        fn otp(&mut self, otp_type: OtpType) -> String {
            issue_otp(&mut self.db, &self.task_id, otp_type, "client", Utc::now(), Duration::minutes(30))
                .unwrap()
                .otp
                .code
        }

        fn move_to(&mut self, target: Status, user: &str, otp: Option<String>) -> Result<TransitionOutcome> {
            let mut req = TransitionRequest::new(self.task_id.clone(), target);
            req.otp = otp;
            transition(&mut self.db, &req, user, Utc::now())
        }

        fn status(&self) -> Status {
            tasks::get(self.db.conn(), &self.task_id).unwrap().status
        }
    }

    #[test]
    fn full_lifecycle_pays_out() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let start = f.otp(OtpType::Start);
        let out = f.move_to(Status::InProgress, "worker", Some(start)).unwrap();
        assert_eq!(out.previous_status, Status::Assigned);
        assert!(out.task.started_at.is_some());

        let end = f.otp(OtpType::End);
        f.move_to(Status::Review, "worker", Some(end)).unwrap();

        let done = f.move_to(Status::Completed, "client", None).unwrap();
        assert_eq!(done.task.status, Status::Completed);
        assert!(done.task.completed_at.is_some());
        let pay = done.payment.unwrap();
        assert_eq!(pay.commission_rate, 10);
        assert_eq!(pay.commission_amount, 5_000);
        assert_eq!(pay.freelancer_amount, 45_000);

        let worker = profiles::by_user(f.db.conn(), "worker").unwrap();
        assert_eq!(worker.completed_tasks, 1);
    }

    #[test]
    fn unverified_freelancer_pays_higher_commission() {
        let mut f = Fixture::new(VerificationStatus::Pending);
        let start = f.otp(OtpType::Start);
        f.move_to(Status::InProgress, "worker", Some(start)).unwrap();
        let end = f.otp(OtpType::End);
        f.move_to(Status::Review, "worker", Some(end)).unwrap();
        let pay = f.move_to(Status::Completed, "client", None).unwrap().payment.unwrap();
        assert_eq!(pay.commission_rate, 50);
        assert_eq!(pay.freelancer_amount, 25_000);
    }

    #[test]
    fn completing_a_huge_budget_task_commits() {
        let budget = i64::MAX / 10;
        let mut f = Fixture::with_budget(VerificationStatus::Pending, budget);
        let start = f.otp(OtpType::Start);
        f.move_to(Status::InProgress, "worker", Some(start)).unwrap();
        let end = f.otp(OtpType::End);
        f.move_to(Status::Review, "worker", Some(end)).unwrap();

        let pay = f.move_to(Status::Completed, "client", None).unwrap().payment.unwrap();
        assert_eq!(pay.commission_amount, budget / 2);
        assert_eq!(pay.commission_amount + pay.freelancer_amount, budget);
        assert_eq!(f.status(), Status::Completed);
    }

    #[test]
    fn start_requires_otp() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let err = f.move_to(Status::InProgress, "worker", None).unwrap_err();
        assert!(matches!(err, MarketError::OtpRequired(OtpType::Start)));
        let err = f.move_to(Status::InProgress, "worker", Some("0000".into())).unwrap_err();
        assert!(matches!(err, MarketError::InvalidOtp));
        assert_eq!(f.status(), Status::Assigned);
    }

    #[test]
    fn used_otp_cannot_authorize_again() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let start = f.otp(OtpType::Start);
        f.move_to(Status::InProgress, "worker", Some(start.clone())).unwrap();

        // Rewind by hand to prove the spent code stays spent.
        tasks::compare_and_set_status(f.db.conn(), &f.task_id, Status::InProgress, Status::Assigned, Utc::now())
            .unwrap();
        let err = f.move_to(Status::InProgress, "worker", Some(start)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidOtp));
        assert_eq!(f.status(), Status::Assigned);
    }

    #[test]
    fn start_code_does_not_open_review() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let start = f.otp(OtpType::Start);
        f.move_to(Status::InProgress, "worker", Some(start)).unwrap();

        let now = Utc::now();
        otps::insert(f.db.conn(), &f.task_id, OtpType::Start, "4321", now, now + Duration::minutes(30))
            .unwrap();
        let err = f.move_to(Status::Review, "worker", Some("4321".into())).unwrap_err();
        assert!(matches!(err, MarketError::InvalidOtp));
        assert_eq!(f.status(), Status::InProgress);
    }

    #[test]
    fn roles_are_enforced() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let start = f.otp(OtpType::Start);
        let err = f.move_to(Status::InProgress, "client", Some(start.clone())).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        let err = f.move_to(Status::InProgress, "other", Some(start.clone())).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        let err = f.move_to(Status::Cancelled, "other", None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        // The rejected attempts left the code unused.
        f.move_to(Status::InProgress, "worker", Some(start)).unwrap();
        let end = f.otp(OtpType::End);
        f.move_to(Status::Review, "worker", Some(end)).unwrap();
        let err = f.move_to(Status::Completed, "worker", None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        let err = f.move_to(Status::Disputed, "worker", None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        f.move_to(Status::Disputed, "client", None).unwrap();
    }

    #[test]
    fn table_violations_are_rejected() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let err = f.move_to(Status::Completed, "client", None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
        let err = f.move_to(Status::Open, "client", None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[test]
    fn assigned_is_only_reachable_by_accept() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        f.move_to(Status::Cancelled, "client", None).unwrap();
        tasks::compare_and_set_status(f.db.conn(), &f.task_id, Status::Cancelled, Status::Open, Utc::now())
            .unwrap();
        let err = f.move_to(Status::Assigned, "client", None).unwrap_err();
        assert!(matches!(err, MarketError::AssignmentRequiresAccept));
    }

    #[test]
    fn cancel_releases_the_handshake() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        let mut req = TransitionRequest::new(f.task_id.clone(), Status::Cancelled);
        req.reason = Some("client changed plans".into());
        let out = transition(&mut f.db, &req, "worker", Utc::now()).unwrap();
        assert_eq!(out.task.status, Status::Cancelled);
        assert!(out.payment.is_none());

        assert!(handshakes::active_for_task(f.db.conn(), &f.task_id).unwrap().is_none());
        let history = handshakes::history(f.db.conn(), &f.task_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cancelled_reason.as_deref(), Some("client changed plans"));

        let err = f.move_to(Status::Open, "client", None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[test]
    fn events_record_each_change() {
        let mut f = Fixture::new(VerificationStatus::Verified);
        f.move_to(Status::Cancelled, "client", None).unwrap();
        let feed = events::read_after(f.db.conn(), 0, Some(&f.task_id), None).unwrap();
        let kinds: Vec<_> = feed.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["accepted", "status_changed"]);
        assert_eq!(feed[1].to_status, Some(Status::Cancelled));
    }
}
