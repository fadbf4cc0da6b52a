//! Field validators: pure checks from raw input to typed values.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{Department, FullName, Gender, MAX_NAME_PART_LEN, MIN_BIRTH_DATE, ROOM_RANGE};
use crate::error::ValidationError;

/// Two-digit day, two-digit month, four-digit year.
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").expect("valid date regex"));

/// The kind of value a form step collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    FullName,
    Gender,
    DateOfBirth,
    Department,
    Room,
}

impl FieldKind {
    /// Whether the value is picked from an offered choice set.
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Gender | Self::Department)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FullName => "full_name",
            Self::Gender => "gender",
            Self::DateOfBirth => "date_of_birth",
            Self::Department => "department",
            Self::Room => "room",
        };
        write!(f, "{s}")
    }
}

/// A validated field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    FullName(FullName),
    Gender(Gender),
    DateOfBirth(NaiveDate),
    Department(Department),
    Room(u8),
}

/// Raw user input for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInput<'a> {
    /// Free text typed by the user.
    Text(&'a str),
    /// Selection token from an offered choice set.
    Choice(&'a str),
}

impl<'a> FieldInput<'a> {
    fn raw(&self) -> &'a str {
        match self {
            Self::Text(s) | Self::Choice(s) => s,
        }
    }
}

/// Validate `input` for a field of kind `kind`.
///
/// `today` bounds the date of birth from above.
pub fn validate(
    kind: FieldKind,
    input: FieldInput<'_>,
    today: NaiveDate,
) -> Result<FieldValue, ValidationError> {
    if kind.is_choice() {
        let FieldInput::Choice(token) = input else {
            return Err(ValidationError::UnknownChoice);
        };
        return match kind {
            FieldKind::Gender => parse_gender(token).map(FieldValue::Gender),
            _ => Department::from_token(token).map(FieldValue::Department),
        };
    }

    let raw = input.raw();
    match kind {
        FieldKind::FullName => parse_full_name(raw).map(FieldValue::FullName),
        FieldKind::DateOfBirth => parse_date_of_birth(raw, today).map(FieldValue::DateOfBirth),
        _ => parse_bounded(raw, ROOM_RANGE).map(|n| FieldValue::Room(n as u8)),
    }
}

/// Split "Surname Given Patronymic" into its three parts.
pub fn parse_full_name(raw: &str) -> Result<FullName, ValidationError> {
    let parts: Vec<&str> = raw.trim().split(' ').collect();
    let fits = |p: &str| !p.is_empty() && p.chars().count() <= MAX_NAME_PART_LEN;
    match parts.as_slice() {
        [last, first, patronymic] if fits(*last) && fits(*first) && fits(*patronymic) => {
            Ok(FullName {
                last_name: (*last).to_string(),
                first_name: (*first).to_string(),
                patronymic: (*patronymic).to_string(),
            })
        }
        _ => Err(ValidationError::MalformedName),
    }
}

/// Parse a `DD.MM.YYYY` date within [1900-01-01, today].
pub fn parse_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    if !DATE_SHAPE.is_match(raw) {
        return Err(ValidationError::BadDateFormat);
    }
    let date = NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .map_err(|_| ValidationError::BadDateFormat)?;
    if date < MIN_BIRTH_DATE || date > today {
        return Err(ValidationError::DateOutOfRange);
    }
    Ok(date)
}

/// Parse an integer within the inclusive `(min, max)` bound.
pub fn parse_bounded(raw: &str, (min, max): (i64, i64)) -> Result<i64, ValidationError> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::NotAnInteger)?;
    if (min..=max).contains(&n) {
        Ok(n)
    } else {
        Err(ValidationError::OutOfRange { min, max })
    }
}

/// Only `male` and `female` are offered; `unknown` is not a valid pick.
fn parse_gender(token: &str) -> Result<Gender, ValidationError> {
    match token.parse::<Gender>()? {
        Gender::Unknown => Err(ValidationError::UnknownChoice),
        g => Ok(g),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn full_name_three_parts() {
        let name = parse_full_name("Иванов Иван Иванович").unwrap();
        assert_eq!(name.last_name, "Иванов");
        assert_eq!(name.first_name, "Иван");
        assert_eq!(name.patronymic, "Иванович");
    }

    #[test]
    fn full_name_trims_outer_whitespace() {
        let name = parse_full_name("  A B C \n").unwrap();
        assert_eq!(name.to_string(), "A B C");
    }

    #[test]
    fn full_name_wrong_part_count() {
        for raw in ["", "A", "A B", "A B C D", "A  B C", "A B  C", "A\tB C"] {
            assert_eq!(
                parse_full_name(raw),
                Err(ValidationError::MalformedName),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn full_name_part_too_long() {
        let long = "Я".repeat(MAX_NAME_PART_LEN + 1);
        assert_eq!(
            parse_full_name(&format!("{long} Иван Иванович")),
            Err(ValidationError::MalformedName)
        );
        let max = "Я".repeat(MAX_NAME_PART_LEN);
        assert!(parse_full_name(&format!("{max} Иван Иванович")).is_ok());
    }

    #[test]
    fn date_accepts_valid() {
        assert_eq!(
            parse_date_of_birth("03.08.1938", today()).unwrap(),
            NaiveDate::from_ymd_opt(1938, 8, 3).unwrap()
        );
        assert_eq!(
            parse_date_of_birth("01.01.1900", today()).unwrap(),
            MIN_BIRTH_DATE
        );
        assert_eq!(parse_date_of_birth("01.05.2024", today()).unwrap(), today());
    }

    #[test]
    fn date_rejects_bad_format() {
        for raw in ["31.02.1938", "3.8.1938", "1938-08-03", "03/08/1938", "03.08.38", "abc", ""] {
            assert_eq!(
                parse_date_of_birth(raw, today()),
                Err(ValidationError::BadDateFormat),
                "{raw:?} should be a format error"
            );
        }
    }

    #[test]
    fn date_rejects_out_of_range() {
        assert_eq!(
            parse_date_of_birth("31.12.1899", today()),
            Err(ValidationError::DateOutOfRange)
        );
        assert_eq!(
            parse_date_of_birth("01.01.1899", today()),
            Err(ValidationError::DateOutOfRange)
        );
        assert_eq!(
            parse_date_of_birth("02.05.2024", today()),
            Err(ValidationError::DateOutOfRange)
        );
    }

    #[test]
    fn room_bounds() {
        for n in 1..=10 {
            assert_eq!(parse_bounded(&n.to_string(), ROOM_RANGE), Ok(n));
        }
        assert_eq!(
            parse_bounded("0", ROOM_RANGE),
            Err(ValidationError::OutOfRange { min: 1, max: 10 })
        );
        assert_eq!(
            parse_bounded("11", ROOM_RANGE),
            Err(ValidationError::OutOfRange { min: 1, max: 10 })
        );
        assert_eq!(parse_bounded("abc", ROOM_RANGE), Err(ValidationError::NotAnInteger));
        assert_eq!(parse_bounded("5.5", ROOM_RANGE), Err(ValidationError::NotAnInteger));
    }

    #[test]
    fn validate_dispatches_on_kind() {
        assert_eq!(
            validate(FieldKind::Room, FieldInput::Text(" 5 "), today()),
            Ok(FieldValue::Room(5))
        );
        assert_eq!(
            validate(FieldKind::Gender, FieldInput::Choice("female"), today()),
            Ok(FieldValue::Gender(Gender::Female))
        );
        assert_eq!(
            validate(FieldKind::Department, FieldInput::Choice("dp4"), today()),
            Ok(FieldValue::Department(Department::try_from(4).unwrap()))
        );
    }

    #[test]
    fn choice_fields_reject_free_text_and_unknown_tokens() {
        assert_eq!(
            validate(FieldKind::Gender, FieldInput::Text("male"), today()),
            Err(ValidationError::UnknownChoice)
        );
        assert_eq!(
            validate(FieldKind::Gender, FieldInput::Choice("unknown"), today()),
            Err(ValidationError::UnknownChoice)
        );
        assert_eq!(
            validate(FieldKind::Department, FieldInput::Choice("dp9"), today()),
            Err(ValidationError::UnknownChoice)
        );
    }

    #[test]
    fn text_fields_read_stale_choice_tokens_as_text() {
        assert_eq!(
            validate(FieldKind::Room, FieldInput::Choice("male"), today()),
            Err(ValidationError::NotAnInteger)
        );
    }

    #[test]
    fn field_kind_display_matches_serde() {
        for kind in [
            FieldKind::FullName,
            FieldKind::Gender,
            FieldKind::DateOfBirth,
            FieldKind::Department,
            FieldKind::Room,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(format!("\"{kind}\""), json);
        }
    }
}
