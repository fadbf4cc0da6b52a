//! User-facing texts and choice sets for each form step.

use super::model::{Department, Gender, NewPerson, NewStaff};
use super::state::FormStep;
use crate::channels::{Choice, OutgoingResponse};
use crate::error::ValidationError;

pub const HELP: &str = "Команды:\n\
    /start — регистрация сотрудника\n\
    /person — добавить проживающего\n\
    /cancel — отменить заполнение анкеты";

pub const CANCELLED: &str = "Заполнение анкеты отменено.";

pub const NOTHING_TO_CANCEL: &str = "Нет анкеты для отмены.";

pub const SAVE_FAILED: &str =
    "Не удалось сохранить данные. Отправьте последний ответ ещё раз чуть позже.";

pub const LOOKUP_FAILED: &str = "Сервис временно недоступен. Попробуйте позже.";

pub const ALREADY_REGISTERED: &str = "Вы уже зарегистрированы.";

pub const RESTART: &str = "Анкета повреждена и была сброшена. Начните заново.";

/// Display label for a gender option.
pub fn gender_label(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "Мужской",
        Gender::Female => "Женский",
        Gender::Unknown => "Не указан",
    }
}

/// Choice set offered at a choice step; empty for text steps.
pub fn choices_for(step: FormStep) -> Vec<Choice> {
    match step {
        FormStep::StaffGender => Gender::SELECTABLE
            .iter()
            .map(|g| Choice::new(gender_label(*g), g.as_str()))
            .collect(),
        FormStep::PersonDepartment => Department::all()
            .map(|d| Choice::new(format!("Отделение {}", d.number()), d.token()))
            .collect(),
        _ => Vec::new(),
    }
}

fn question(step: FormStep) -> &'static str {
    match step {
        FormStep::StaffFullName => {
            "Для начала давайте познакомимся. Введите Ваши фамилию, имя и отчество через пробел:"
        }
        FormStep::StaffGender => "Выберите Ваш пол:",
        FormStep::PersonFullName => "Введите фамилию, имя и отчество проживающего через пробел:",
        FormStep::PersonDateOfBirth => "Введите дату рождения в формате ДД.ММ.ГГГГ:",
        FormStep::PersonDepartment => "Выберите отделение:",
        FormStep::PersonRoom => "Введите номер комнаты (от 1 до 10):",
    }
}

/// The prompt for `step`, with its choice set attached.
pub fn prompt(step: FormStep) -> OutgoingResponse {
    OutgoingResponse::text(question(step)).with_choices(choices_for(step))
}

/// Re-prompt for `step` after a rejected value.
pub fn reprompt(step: FormStep, err: &ValidationError) -> OutgoingResponse {
    let text = format!("{}\n{}", rejection_reason(err), question(step));
    OutgoingResponse::text(text).with_choices(choices_for(step))
}

/// Why a value was rejected, in the user's language.
pub fn rejection_reason(err: &ValidationError) -> String {
    match err {
        ValidationError::MalformedName => {
            "Нужно ровно три слова через один пробел: фамилия, имя и отчество.".to_string()
        }
        ValidationError::BadDateFormat => {
            "Дата не распознана. Используйте формат ДД.ММ.ГГГГ, например 03.08.1938.".to_string()
        }
        ValidationError::DateOutOfRange => {
            "Дата должна быть не раньше 01.01.1900 и не позже сегодняшнего дня.".to_string()
        }
        ValidationError::NotAnInteger => "Нужно ввести целое число.".to_string(),
        ValidationError::OutOfRange { min, max } => {
            format!("Число должно быть от {min} до {max}.")
        }
        ValidationError::UnknownChoice => "Выберите один из предложенных вариантов.".to_string(),
    }
}

pub fn staff_registered(staff: &NewStaff) -> String {
    format!("Регистрация завершена. Добро пожаловать, {}!", staff.name.first_name)
}

pub fn person_added(person: &NewPerson) -> String {
    format!(
        "Проживающий {} ({}) добавлен: отделение {}, комната {}.",
        person.name,
        person.date_of_birth.format("%d.%m.%Y"),
        person.department.number(),
        person.room
    )
}
