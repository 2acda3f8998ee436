//! Authorization policy. Every role and ownership decision goes through
//! [`authorize`] so handlers cannot drift apart.

use super::error::ApiError;
use crate::db::{Appointment, UserProfile};

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// Create, edit or remove staff accounts
    ManageUsers,
    /// Create, edit, toggle or remove rooms
    ManageRooms,
    ViewAppointment(&'a Appointment),
    ModifyAppointment(&'a Appointment),
    /// Book or reassign an appointment under this psychologist email
    BookFor(&'a str),
    /// Look up data scoped to this psychologist email
    ViewPsychologistData(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

pub fn authorize(user: &UserProfile, action: Action<'_>) -> Decision {
    if user.is_superadmin() {
        return Decision::Allow;
    }

    let owns = |email: &str| email.eq_ignore_ascii_case(&user.email);

    match action {
        Action::ManageUsers => Decision::Deny("Only administrators can manage staff"),
        Action::ManageRooms => Decision::Deny("Only administrators can manage rooms"),
        Action::ViewAppointment(a) | Action::ModifyAppointment(a) => {
            if owns(&a.psychologist_email) {
                Decision::Allow
            } else {
                Decision::Deny("You can only access your own appointments")
            }
        }
        Action::BookFor(email) | Action::ViewPsychologistData(email) => {
            if owns(email) {
                Decision::Allow
            } else {
                Decision::Deny("You can only act on your own schedule")
            }
        }
    }
}

/// [`authorize`] as a `Result`, mapping a denial to 403
pub fn require(user: &UserProfile, action: Action<'_>) -> Result<(), ApiError> {
    match authorize(user, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(user = %user.email, ?action, "Access denied");
            Err(ApiError::forbidden(reason))
        }
    }
}
