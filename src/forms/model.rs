//! Record types produced by the intake forms.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Earliest accepted date of birth.
pub const MIN_BIRTH_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1900, 1, 1) {
    Some(d) => d,
    None => panic!("invalid MIN_BIRTH_DATE"),
};

/// Longest accepted name part, in characters.
pub const MAX_NAME_PART_LEN: usize = 50;

/// Inclusive bounds for a department number.
pub const DEPARTMENT_RANGE: (i64, i64) = (1, 4);

/// Inclusive bounds for a room number.
pub const ROOM_RANGE: (i64, i64) = (1, 10);

/// Stable identity of a chat user, as reported by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Surname, given name and patronymic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullName {
    pub last_name: String,
    pub first_name: String,
    pub patronymic: String,
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.last_name, self.first_name, self.patronymic)
    }
}

/// Gender of a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    /// Genders a user can pick. `Unknown` is only a storage default.
    pub const SELECTABLE: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ValidationError::UnknownChoice),
        }
    }
}

/// Department number, always within [`DEPARTMENT_RANGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Department(u8);

impl Department {
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Every department, in order.
    pub fn all() -> impl Iterator<Item = Department> {
        (DEPARTMENT_RANGE.0..=DEPARTMENT_RANGE.1).map(|n| Department(n as u8))
    }

    /// Selection token offered for this department (`dp1`..`dp4`).
    pub fn token(&self) -> String {
        format!("dp{}", self.0)
    }

    /// Parse a selection token produced by [`Department::token`].
    pub fn from_token(token: &str) -> Result<Self, ValidationError> {
        token
            .strip_prefix("dp")
            .and_then(|n| n.parse::<i64>().ok())
            .and_then(|n| Self::try_from(n).ok())
            .ok_or(ValidationError::UnknownChoice)
    }
}

impl TryFrom<i64> for Department {
    type Error = ValidationError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        let (min, max) = DEPARTMENT_RANGE;
        if (min..=max).contains(&n) {
            Ok(Self(n as u8))
        } else {
            Err(ValidationError::OutOfRange { min, max })
        }
    }
}

impl From<Department> for i64 {
    fn from(d: Department) -> Self {
        i64::from(d.0)
    }
}

/// Staff record ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStaff {
    pub external_user_id: UserId,
    pub name: FullName,
    pub gender: Gender,
}

/// A persisted staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub id: i64,
    pub external_user_id: UserId,
    pub last_name: String,
    pub first_name: String,
    pub patronymic: String,
    pub gender: Gender,
}

/// Person record ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    pub name: FullName,
    pub date_of_birth: NaiveDate,
    pub department: Department,
    pub room: u8,
}

impl NewPerson {
    /// Re-check the field ranges. Stores call this before writing.
    pub fn check(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if self.date_of_birth < MIN_BIRTH_DATE || self.date_of_birth > today {
            return Err(ValidationError::DateOutOfRange);
        }
        let (min, max) = ROOM_RANGE;
        if !(min..=max).contains(&i64::from(self.room)) {
            return Err(ValidationError::OutOfRange { min, max });
        }
        Ok(())
    }
}

/// A persisted resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    pub patronymic: String,
    pub date_of_birth: NaiveDate,
    pub department: Department,
    pub room: u8,
}
