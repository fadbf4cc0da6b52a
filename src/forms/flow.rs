//! Validates input, advances sessions and persists completed records.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use super::model::UserId;
use super::prompts;
use super::session::SessionStore;
use super::state::{Advance, CompletedForm, FormKind, FormSession, FormStep};
use super::validate::{FieldInput, validate};
use crate::channels::OutgoingResponse;
use crate::store::RecordRepository;

/// Source of "today" for date-of-birth bounds.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Drives both intake forms for every user.
///
/// Callers must serialize calls per user; calls for different users may
/// run concurrently.
pub struct FormFlowController {
    repo: Arc<dyn RecordRepository>,
    sessions: Arc<SessionStore>,
    today: Clock,
}

impl FormFlowController {
    pub fn new(repo: Arc<dyn RecordRepository>, sessions: Arc<SessionStore>) -> Self {
        Self {
            repo,
            sessions,
            today: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Replace the clock used to bound dates of birth.
    pub fn with_clock(mut self, today: Clock) -> Self {
        self.today = today;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn repository(&self) -> &Arc<dyn RecordRepository> {
        &self.repo
    }

    /// Begin staff registration.
    ///
    /// Returns `None` without touching any state when the user is already
    /// registered.
    pub async fn start_staff(&self, user_id: &UserId) -> Option<OutgoingResponse> {
        match self.repo.exists_staff(user_id).await {
            Ok(true) => {
                debug!(user_id = %user_id, "Staff already registered; ignoring start");
                None
            }
            Ok(false) => Some(self.open(user_id, FormKind::Staff).await),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Staff lookup failed");
                Some(OutgoingResponse::text(prompts::LOOKUP_FAILED))
            }
        }
    }

    /// Begin a resident intake. No existence check applies.
    pub async fn start_person(&self, user_id: &UserId) -> OutgoingResponse {
        self.open(user_id, FormKind::Person).await
    }

    /// Drop the user's active form, if any.
    pub async fn cancel(&self, user_id: &UserId) -> OutgoingResponse {
        match self.sessions.clear(user_id).await {
            Some(session) => {
                info!(user_id = %user_id, step = %session.current_step(), "Form cancelled");
                OutgoingResponse::text(prompts::CANCELLED)
            }
            None => OutgoingResponse::text(prompts::NOTHING_TO_CANCEL),
        }
    }

    /// Feed one input into the user's active form.
    ///
    /// Returns `None` when the user has no active form. A rejected value
    /// leaves the session exactly as it was.
    pub async fn handle_input(
        &self,
        user_id: &UserId,
        input: FieldInput<'_>,
    ) -> Option<OutgoingResponse> {
        let mut session = self.sessions.get(user_id).await?;
        let step = session.current_step();
        let today = (self.today)();

        let value = match validate(step.field(), input, today) {
            Ok(value) => value,
            Err(e) => {
                debug!(user_id = %user_id, step = %step, reason = %e, "Input rejected");
                return Some(prompts::reprompt(step, &e));
            }
        };

        match session.advance(value) {
            Ok(Advance::Next(next)) => {
                debug!(user_id = %user_id, from = %step, to = %next, "Form advanced");
                self.sessions.set(session).await;
                Some(prompts::prompt(next))
            }
            Ok(Advance::Complete(form)) => Some(self.complete(user_id, step, form, today).await),
            Err(e) => {
                error!(user_id = %user_id, step = %step, error = %e, "Form state is inconsistent; resetting");
                self.sessions.clear(user_id).await;
                Some(OutgoingResponse::text(prompts::RESTART))
            }
        }
    }

    async fn open(&self, user_id: &UserId, form: FormKind) -> OutgoingResponse {
        let session = FormSession::new(user_id.clone(), form);
        let step = session.current_step();
        self.sessions.set(session).await;
        info!(user_id = %user_id, form = ?form, "Form started");
        prompts::prompt(step)
    }

    /// Persist a completed form. The session is cleared only after the
    /// write succeeds. `today` is the date the form was validated against.
    async fn complete(
        &self,
        user_id: &UserId,
        step: FormStep,
        form: CompletedForm,
        today: NaiveDate,
    ) -> OutgoingResponse {
        let saved = match &form {
            CompletedForm::Staff(staff) => self.repo.insert_staff(staff).await.map(|rec| {
                info!(user_id = %user_id, staff_id = rec.id, "Staff registered");
                prompts::staff_registered(staff)
            }),
            CompletedForm::Person(person) => self.repo.insert_person(person, today).await.map(|rec| {
                info!(user_id = %user_id, person_id = rec.id, "Person added");
                prompts::person_added(person)
            }),
        };

        match saved {
            Ok(text) => {
                self.sessions.clear(user_id).await;
                OutgoingResponse::text(text)
            }
            Err(e) => {
                error!(user_id = %user_id, step = %step, error = %e, "Failed to persist form");
                if matches!(form, CompletedForm::Staff(_))
                    && matches!(self.repo.exists_staff(user_id).await, Ok(true))
                {
                    warn!(user_id = %user_id, "Staff record appeared concurrently; dropping form");
                    self.sessions.clear(user_id).await;
                    return OutgoingResponse::text(prompts::ALREADY_REGISTERED);
                }
                OutgoingResponse::text(prompts::SAVE_FAILED)
                    .with_choices(prompts::choices_for(step))
            }
        }
    }
}
