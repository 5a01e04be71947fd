//! Validation and semantic procedures run when a write action completes.

use super::{DomainError, EditingDomain};
use crate::base::ElementId;
use crate::model::ModelState;
use crate::notify::Notification;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub message: String,
    pub target: Option<ElementId>,
}

impl ValidationMessage {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            target: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn on(mut self, target: &ElementId) -> Self {
        self.target = Some(target.clone());
        self
    }
}

/// Everything the validators reported for one action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationStatus {
    messages: Vec<ValidationMessage>,
}

impl ValidationStatus {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ValidationMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, other: ValidationStatus) {
        self.messages.extend(other.messages);
    }

    /// Worst severity reported, `Ok` when nothing was.
    pub fn severity(&self) -> Severity {
        self.messages
            .iter()
            .map(|m| m.severity)
            .max()
            .unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn is_ok(&self) -> bool {
        self.severity() == Severity::Ok
    }

    pub fn messages(&self) -> &[ValidationMessage] {
        &self.messages
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages.iter().filter(|m| m.severity == Severity::Error)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors().count();
        match self.errors().next() {
            Some(first) if errors == 1 => write!(f, "{}", first.message),
            Some(first) => write!(f, "{} (and {} more errors)", first.message, errors - 1),
            None => write!(f, "{:?}", self.severity()),
        }
    }
}

/// Checks the object notifications of a completed write action.
///
/// Validators see the graph read-only and must not call back into the
/// domain.
pub trait Validator: Send + Sync {
    fn validate(&self, state: &ModelState, batch: &[Notification]) -> ValidationStatus;
}

impl<F> Validator for F
where
    F: Fn(&ModelState, &[Notification]) -> ValidationStatus + Send + Sync,
{
    fn validate(&self, state: &ModelState, batch: &[Notification]) -> ValidationStatus {
        self(state, batch)
    }
}

/// Derives further changes from a completed write action.
///
/// Runs inside the still-open outermost write frame, so any changes it
/// makes belong to the same action and undo interval.
pub trait SemanticProcedure: Send + Sync {
    fn run(&self, domain: &EditingDomain, batch: &[Notification]) -> Result<(), DomainError>;
}

impl<F> SemanticProcedure for F
where
    F: Fn(&EditingDomain, &[Notification]) -> Result<(), DomainError> + Send + Sync,
{
    fn run(&self, domain: &EditingDomain, batch: &[Notification]) -> Result<(), DomainError> {
        self(domain, batch)
    }
}
