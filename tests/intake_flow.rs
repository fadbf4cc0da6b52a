//! End-to-end tests for both intake forms, driven through the dispatcher's
//! message handler against an on-disk libSQL database.

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use intake_bot::channels::{IncomingMessage, OutgoingResponse};
use intake_bot::dispatcher::handle_message;
use intake_bot::forms::prompts;
use intake_bot::forms::{
    FieldKind, FormFlowController, FormStep, Gender, SessionStore, UserId,
};
use intake_bot::store::{LibSqlBackend, RecordRepository};

struct Harness {
    flow: FormFlowController,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = LibSqlBackend::new_local(&dir.path().join("intake.db"))
            .await
            .unwrap();
        let flow = FormFlowController::new(Arc::new(repo), Arc::new(SessionStore::new()))
            .with_clock(Arc::new(|| NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        Self { flow, _dir: dir }
    }

    async fn say(&self, user: &str, text: &str) -> Option<OutgoingResponse> {
        handle_message(&self.flow, &IncomingMessage::new("test", user, text)).await
    }

    async fn pick(&self, user: &str, token: &str) -> Option<OutgoingResponse> {
        handle_message(&self.flow, &IncomingMessage::selection("test", user, token)).await
    }

    async fn step(&self, user: &str) -> Option<FormStep> {
        self.flow
            .sessions()
            .get(&UserId::new(user))
            .await
            .map(|s| s.current_step())
    }

    fn repo(&self) -> &Arc<dyn RecordRepository> {
        self.flow.repository()
    }
}

#[tokio::test]
async fn staff_registration_end_to_end() {
    let h = Harness::new().await;

    let reply = h.say("42", "/start").await.unwrap();
    assert!(reply.content.contains("фамилию, имя и отчество"));
    assert_eq!(h.step("42").await, Some(FormStep::StaffFullName));

    let reply = h.say("42", "Иванов Иван Иванович").await.unwrap();
    let tokens: Vec<&str> = reply.choices.iter().map(|c| c.token.as_str()).collect();
    assert_eq!(tokens, vec!["male", "female"]);

    let reply = h.pick("42", "male").await.unwrap();
    assert!(reply.content.contains("Иван"));
    assert_eq!(h.step("42").await, None);

    let staff = h.repo().get_staff(&UserId::new("42")).await.unwrap().unwrap();
    assert_eq!(
        (staff.last_name.as_str(), staff.first_name.as_str(), staff.patronymic.as_str()),
        ("Иванов", "Иван", "Иванович")
    );
    assert_eq!(staff.gender, Gender::Male);
}

#[tokio::test]
async fn start_is_silent_for_registered_staff() {
    let h = Harness::new().await;
    h.say("42", "/start").await;
    h.say("42", "Иванов Иван Иванович").await;
    h.pick("42", "female").await;

    assert!(h.say("42", "/start").await.is_none());
    assert!(h.say("42", "/start").await.is_none());
    assert_eq!(h.step("42").await, None);
    assert_eq!(h.repo().count_staff().await.unwrap(), 1);
}

#[tokio::test]
async fn person_intake_end_to_end() {
    let h = Harness::new().await;

    h.say("nurse", "/person").await.unwrap();
    h.say("nurse", "Петров Петр Петрович").await.unwrap();
    assert_eq!(h.step("nurse").await, Some(FormStep::PersonDateOfBirth));

    let reply = h.say("nurse", "03.08.1938").await.unwrap();
    assert_eq!(reply.choices.len(), 4);

    let reply = h.pick("nurse", "dp2").await.unwrap();
    assert!(reply.choices.is_empty());
    assert_eq!(h.step("nurse").await, Some(FormStep::PersonRoom));

    let reply = h.say("nurse", "10").await.unwrap();
    assert!(reply.content.contains("Петров Петр Петрович"));
    assert_eq!(h.step("nurse").await, None);

    let persons = h.repo().list_persons(10).await.unwrap();
    assert_eq!(persons.len(), 1);
    let p = &persons[0];
    assert_eq!(p.last_name, "Петров");
    assert_eq!(p.date_of_birth, NaiveDate::from_ymd_opt(1938, 8, 3).unwrap());
    assert_eq!(p.department.number(), 2);
    assert_eq!(p.room, 10);
}

#[tokio::test]
async fn rejected_inputs_never_advance() {
    let h = Harness::new().await;
    h.say("nurse", "/person").await;

    for bad in ["Петров", "Петров Петр", "Петров  Петр Петрович", "a b c d"] {
        h.say("nurse", bad).await.unwrap();
        assert_eq!(h.step("nurse").await, Some(FormStep::PersonFullName), "{bad}");
    }

    h.say("nurse", "Петров Петр Петрович").await;
    for bad in ["31.02.1938", "1938-08-03", "01.01.1899", "02.05.2024"] {
        h.say("nurse", bad).await.unwrap();
        assert_eq!(h.step("nurse").await, Some(FormStep::PersonDateOfBirth), "{bad}");
    }

    h.say("nurse", "01.01.1900").await;
    let reply = h.say("nurse", "2").await.unwrap();
    assert_eq!(reply.choices.len(), 4, "typed department is refused, choices re-offered");
    h.pick("nurse", "dp5").await.unwrap();
    assert_eq!(h.step("nurse").await, Some(FormStep::PersonDepartment));

    h.pick("nurse", "dp4").await;
    for bad in ["0", "11", "abc", "-1"] {
        h.say("nurse", bad).await.unwrap();
        assert_eq!(h.step("nurse").await, Some(FormStep::PersonRoom), "{bad}");
    }

    let session = h.flow.sessions().get(&UserId::new("nurse")).await.unwrap();
    let collected: Vec<FieldKind> = session.collected_fields().keys().copied().collect();
    assert_eq!(
        collected,
        vec![FieldKind::FullName, FieldKind::DateOfBirth, FieldKind::Department]
    );
    assert_eq!(h.repo().count_persons().await.unwrap(), 0);
}

#[tokio::test]
async fn new_start_discards_partial_form() {
    let h = Harness::new().await;
    h.say("u", "/person").await;
    h.say("u", "Петров Петр Петрович").await;

    h.say("u", "/person").await;
    let session = h.flow.sessions().get(&UserId::new("u")).await.unwrap();
    assert_eq!(session.current_step(), FormStep::PersonFullName);
    assert!(session.collected_fields().is_empty());
}

#[tokio::test]
async fn cancel_then_stray_text_gets_help() {
    let h = Harness::new().await;
    h.say("u", "/start").await;

    let reply = h.say("u", "/cancel").await.unwrap();
    assert_eq!(reply.content, prompts::CANCELLED);
    assert_eq!(h.step("u").await, None);

    let reply = h.say("u", "Иванов Иван Иванович").await.unwrap();
    assert_eq!(reply.content, prompts::HELP);
    assert_eq!(h.repo().count_staff().await.unwrap(), 0);
}

#[tokio::test]
async fn persons_may_repeat() {
    let h = Harness::new().await;
    for _ in 0..2 {
        h.say("nurse", "/person").await;
        h.say("nurse", "Петров Петр Петрович").await;
        h.say("nurse", "03.08.1938").await;
        h.pick("nurse", "dp1").await;
        h.say("nurse", "1").await;
    }
    assert_eq!(h.repo().count_persons().await.unwrap(), 2);
}
