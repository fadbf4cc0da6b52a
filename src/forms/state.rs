//! Form state machine: which step a user is on and what they have entered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Gender, NewPerson, NewStaff, UserId};
use super::validate::{FieldKind, FieldValue};

/// The two intake forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    /// Staff self-registration, keyed by the chat user.
    Staff,
    /// Resident intake, entered on someone else's behalf.
    Person,
}

impl FormKind {
    /// First step of the form.
    pub fn first_step(&self) -> FormStep {
        match self {
            Self::Staff => FormStep::StaffFullName,
            Self::Person => FormStep::PersonFullName,
        }
    }
}

/// One stage of a form.
///
/// Each form is a straight line: Staff is FullName → Gender, Person is
/// FullName → DateOfBirth → Department → Room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    StaffFullName,
    StaffGender,
    PersonFullName,
    PersonDateOfBirth,
    PersonDepartment,
    PersonRoom,
}

impl FormStep {
    pub fn form(&self) -> FormKind {
        match self {
            Self::StaffFullName | Self::StaffGender => FormKind::Staff,
            _ => FormKind::Person,
        }
    }

    /// The field collected at this step.
    pub fn field(&self) -> FieldKind {
        match self {
            Self::StaffFullName | Self::PersonFullName => FieldKind::FullName,
            Self::StaffGender => FieldKind::Gender,
            Self::PersonDateOfBirth => FieldKind::DateOfBirth,
            Self::PersonDepartment => FieldKind::Department,
            Self::PersonRoom => FieldKind::Room,
        }
    }

    /// The following step, or `None` if this step is terminal.
    pub fn next(&self) -> Option<FormStep> {
        match self {
            Self::StaffFullName => Some(Self::StaffGender),
            Self::PersonFullName => Some(Self::PersonDateOfBirth),
            Self::PersonDateOfBirth => Some(Self::PersonDepartment),
            Self::PersonDepartment => Some(Self::PersonRoom),
            Self::StaffGender | Self::PersonRoom => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for FormStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StaffFullName => "staff_full_name",
            Self::StaffGender => "staff_gender",
            Self::PersonFullName => "person_full_name",
            Self::PersonDateOfBirth => "person_date_of_birth",
            Self::PersonDepartment => "person_department",
            Self::PersonRoom => "person_room",
        };
        write!(f, "{s}")
    }
}

/// A fully collected form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedForm {
    Staff(NewStaff),
    Person(NewPerson),
}

/// Result of accepting one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved on to the given step.
    Next(FormStep),
    /// The terminal step was accepted; the record is ready to persist.
    Complete(CompletedForm),
}

/// A form could not be assembled from the collected fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("field {field} is missing from the {form:?} form")]
    MissingField { form: FormKind, field: FieldKind },

    #[error("step {step} does not accept a {got} value")]
    WrongField { step: FormStep, got: FieldKind },
}

/// Transient per-user form progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSession {
    pub user_id: UserId,
    current_step: FormStep,
    collected_fields: BTreeMap<FieldKind, FieldValue>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormSession {
    /// Start `form` for `user_id` at its first step.
    pub fn new(user_id: UserId, form: FormKind) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            current_step: form.first_step(),
            collected_fields: BTreeMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn form(&self) -> FormKind {
        self.current_step.form()
    }

    pub fn current_step(&self) -> FormStep {
        self.current_step
    }

    pub fn collected_fields(&self) -> &BTreeMap<FieldKind, FieldValue> {
        &self.collected_fields
    }

    /// Merge a validated value for the current step and move forward.
    ///
    /// On the terminal step the session is left at that step with the value
    /// merged and the assembled record is returned.
    pub fn advance(&mut self, value: FieldValue) -> Result<Advance, FormError> {
        let field = self.current_step.field();
        let got = kind_of(&value);
        if got != field {
            return Err(FormError::WrongField {
                step: self.current_step,
                got,
            });
        }

        self.collected_fields.insert(field, value);
        self.updated_at = Utc::now();

        match self.current_step.next() {
            Some(next) => {
                self.current_step = next;
                Ok(Advance::Next(next))
            }
            None => self.assemble().map(Advance::Complete),
        }
    }

    fn assemble(&self) -> Result<CompletedForm, FormError> {
        let form = self.form();
        let missing = |field| FormError::MissingField { form, field };

        let name = match self.collected_fields.get(&FieldKind::FullName) {
            Some(FieldValue::FullName(n)) => n.clone(),
            _ => return Err(missing(FieldKind::FullName)),
        };

        match form {
            FormKind::Staff => {
                let gender = match self.collected_fields.get(&FieldKind::Gender) {
                    Some(FieldValue::Gender(g)) => *g,
                    _ => Gender::Unknown,
                };
                Ok(CompletedForm::Staff(NewStaff {
                    external_user_id: self.user_id.clone(),
                    name,
                    gender,
                }))
            }
            FormKind::Person => {
                let Some(FieldValue::DateOfBirth(date_of_birth)) =
                    self.collected_fields.get(&FieldKind::DateOfBirth)
                else {
                    return Err(missing(FieldKind::DateOfBirth));
                };
                let Some(FieldValue::Department(department)) =
                    self.collected_fields.get(&FieldKind::Department)
                else {
                    return Err(missing(FieldKind::Department));
                };
                let Some(FieldValue::Room(room)) = self.collected_fields.get(&FieldKind::Room)
                else {
                    return Err(missing(FieldKind::Room));
                };
                Ok(CompletedForm::Person(NewPerson {
                    name,
                    date_of_birth: *date_of_birth,
                    department: *department,
                    room: *room,
                }))
            }
        }
    }
}

fn kind_of(value: &FieldValue) -> FieldKind {
    match value {
        FieldValue::FullName(_) => FieldKind::FullName,
        FieldValue::Gender(_) => FieldKind::Gender,
        FieldValue::DateOfBirth(_) => FieldKind::DateOfBirth,
        FieldValue::Department(_) => FieldKind::Department,
        FieldValue::Room(_) => FieldKind::Room,
    }
}
