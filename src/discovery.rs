//! Nearby task search for freelancers.

use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::geo::GeoPoint;
use crate::model::{Role, Task, VerificationStatus};
use crate::store::{MarketDb, profiles, tasks};

#[derive(Debug, Clone, Serialize)]
pub struct NearbyTask {
    #[serde(flatten)]
    pub task: Task,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyResults {
    pub tasks: Vec<NearbyTask>,
    /// The caller's own status, so a UI can explain why accepting is blocked.
    pub verification_status: VerificationStatus,
}

/// Open nearby tasks within `radius_m` of `origin`, closest first.
///
/// A caller without a profile is treated as an unverified freelancer.
pub fn find_nearby(
    db: &MarketDb,
    user_id: &str,
    origin: GeoPoint,
    radius_m: f64,
) -> Result<NearbyResults> {
    if origin.latitude == 0.0 || origin.longitude == 0.0 || !origin.is_valid() {
        return Err(MarketError::Validation("location required".into()));
    }
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return Err(MarketError::Validation("radius must be positive".into()));
    }

    let conn = db.conn();
    let verification_status = match profiles::by_user(conn, user_id) {
        Ok(p) if p.role == Role::Client => {
            return Err(MarketError::Forbidden(
                "only freelancers can view nearby tasks",
            ));
        }
        Ok(p) => p.verification_status,
        Err(MarketError::ProfileNotFound(_)) => VerificationStatus::None,
        Err(e) => return Err(e),
    };

    let mut found: Vec<NearbyTask> = tasks::list_open_nearby(conn)?
        .into_iter()
        .filter_map(|task| {
            let distance_meters = origin.within(&task.location?, radius_m)?;
            Some(NearbyTask {
                task,
                distance_meters,
            })
        })
        .collect();
    found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));

    tracing::debug!(user_id, radius_m, hits = found.len(), "nearby search");
    Ok(NearbyResults {
        tasks: found,
        verification_status,
    })
}
