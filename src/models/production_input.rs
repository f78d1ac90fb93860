use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

use super::authenticity::AuthenticityRange;

/// Lifecycle state of one production input
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputStatus {
    Active,
    Completed,
}

/// One scanned-range submission against an MO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionInput {
    pub id: i32,
    pub session_id: String,
    pub leader_name: String,
    pub shift_number: String,
    pub pic: String,
    pub mo_number: String,
    pub sku_name: String,
    pub authenticity_data: Vec<AuthenticityRange>,
    pub status: InputStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProductionInput {
    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
    #[validate(length(min = 1, message = "leader_name is required"))]
    pub leader_name: String,
    #[validate(length(min = 1, message = "shift_number is required"))]
    pub shift_number: String,
    #[validate(length(min = 1, message = "pic is required"))]
    pub pic: String,
    #[validate(length(min = 1, message = "mo_number is required"))]
    pub mo_number: String,
    #[validate(length(min = 1, message = "sku_name is required"))]
    pub sku_name: String,
    #[serde(default)]
    pub authenticity_data: Vec<AuthenticityRange>,
}

/// Editable fields of an active input; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductionInput {
    pub pic: Option<String>,
    pub mo_number: Option<String>,
    pub sku_name: Option<String>,
    pub authenticity_data: Option<Vec<AuthenticityRange>>,
}

impl UpdateProductionInput {
    pub fn is_empty(&self) -> bool {
        self.pic.is_none()
            && self.mo_number.is_none()
            && self.sku_name.is_none()
            && self.authenticity_data.is_none()
    }
}

/// Inputs of one session as the capture screens show them
#[derive(Debug, Clone, Serialize)]
pub struct SessionGroup {
    pub session_id: String,
    pub leader_name: String,
    pub shift_number: String,
    pub status: InputStatus,
    pub created_at: DateTime<Utc>,
    pub inputs: Vec<SessionInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInput {
    pub id: i32,
    pub pic: String,
    pub mo_number: String,
    pub sku_name: String,
    pub authenticity_data: Vec<AuthenticityRange>,
    pub status: InputStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ProductionInput> for SessionInput {
    fn from(input: ProductionInput) -> Self {
        Self {
            id: input.id,
            pic: input.pic,
            mo_number: input.mo_number,
            sku_name: input.sku_name,
            authenticity_data: input.authenticity_data,
            status: input.status,
            created_at: input.created_at,
            completed_at: input.completed_at,
        }
    }
}

/// Groups inputs by session, newest session first. A session reads as
/// completed only when all of its inputs are.
pub fn group_by_session(inputs: Vec<ProductionInput>) -> Vec<SessionGroup> {
    let mut groups: Vec<SessionGroup> = Vec::new();
    for input in inputs {
        let position = groups.iter().position(|g| g.session_id == input.session_id);
        let group = match position {
            Some(idx) => &mut groups[idx],
            None => {
                groups.push(SessionGroup {
                    session_id: input.session_id.clone(),
                    leader_name: input.leader_name.clone(),
                    shift_number: input.shift_number.clone(),
                    status: InputStatus::Completed,
                    created_at: input.created_at,
                    inputs: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        if input.created_at < group.created_at {
            group.created_at = input.created_at;
        }
        if input.status == InputStatus::Active {
            group.status = InputStatus::Active;
        }
        group.inputs.push(input.into());
    }
    groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input(id: i32, session: &str, status: InputStatus, minute: u32) -> ProductionInput {
        ProductionInput {
            id,
            session_id: session.to_string(),
            leader_name: "Rina".to_string(),
            shift_number: "1".to_string(),
            pic: "Adi".to_string(),
            mo_number: "MO1".to_string(),
            sku_name: "SKU".to_string(),
            authenticity_data: vec![],
            status,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn groups_sessions_newest_first() {
        let groups = group_by_session(vec![
            input(1, "s1", InputStatus::Completed, 0),
            input(2, "s2", InputStatus::Completed, 10),
            input(3, "s1", InputStatus::Active, 20),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].session_id, "s2");
        assert_eq!(groups[0].status, InputStatus::Completed);
        assert_eq!(groups[1].inputs.len(), 2);
        assert_eq!(groups[1].status, InputStatus::Active);
    }

    #[test]
    fn status_parses_from_lowercase() {
        assert_eq!("completed".parse::<InputStatus>().unwrap(), InputStatus::Completed);
        assert!("done".parse::<InputStatus>().is_err());
    }
}
