//! Intake forms: field validation, step sequencing and the flow controller.

pub mod flow;
pub mod model;
pub mod prompts;
pub mod session;
pub mod state;
pub mod validate;

pub use flow::{Clock, FormFlowController};
pub use model::{
    Department, FullName, Gender, NewPerson, NewStaff, PersonRecord, StaffRecord, UserId,
};
pub use session::SessionStore;
pub use state::{FormKind, FormSession, FormStep};
pub use validate::{FieldInput, FieldKind, FieldValue};
