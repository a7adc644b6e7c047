pub mod experiences;
pub mod geocoding;
pub mod globe;
pub mod itinerary;
pub mod locations;
pub mod picker;
pub mod trips;

use tracing::warn;

use crate::{auth::AuthenticatedUser, error::AppError};

/// Missing records and other people's records fail differently so the logs can
/// tell them apart.
pub(crate) fn check_owner(
    kind: &str,
    record_id: &str,
    owner_id: Option<String>,
    user: &AuthenticatedUser,
) -> Result<(), AppError> {
    match owner_id {
        None => Err(AppError::NotFound),
        Some(owner_id) if owner_id == user.id => Ok(()),
        Some(_) => {
            warn!("user {} tried to modify {kind} {record_id} they do not own", user.id);
            Err(AppError::Forbidden)
        }
    }
}
