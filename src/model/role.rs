use serde::Serialize;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Director = 1,
    ServiceManager = 2,
    Secretary = 3,
    Staff = 4,
    Parent = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Director),
            2 => Some(Role::ServiceManager),
            3 => Some(Role::Secretary),
            4 => Some(Role::Staff),
            5 => Some(Role::Parent),
            _ => None,
        }
    }

    /// Roles allowed to read a parent's phone number in clear.
    pub fn sees_contact_details(&self) -> bool {
        matches!(self, Role::Secretary | Role::Director | Role::ServiceManager)
    }

    /// Roles allowed to open and validate the daily sheet.
    pub fn can_take_attendance(&self) -> bool {
        *self == Role::Staff
    }

    /// Roles allowed to attach absence justifications.
    pub fn can_justify(&self) -> bool {
        *self == Role::Secretary
    }

    /// Roles allowed to read a single sheet.
    pub fn can_read_sheet(&self) -> bool {
        matches!(
            self,
            Role::Staff | Role::Secretary | Role::Director | Role::ServiceManager
        )
    }

    /// Roles allowed to browse the sheet history.
    pub fn can_browse_history(&self) -> bool {
        self.sees_contact_details()
    }
}
