pub mod flow;
pub mod models;
pub mod schema;
pub mod submission;
pub mod validation;
pub mod visibility;

pub use flow::{FlowController, FlowError, FlowSnapshot, FlowState, IoKind, SessionProfile};
pub use models::*;
pub use submission::{ResponseSubmitter, SubmitError};
pub use validation::FieldError;
