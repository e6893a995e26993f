//! Contact entity, its validation rules, and the repository seam that
//! persistence backends implement.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_NUMBER_LEN: usize = 8;

pub const NAME_REQUIRED: &str = "name is required";
pub const NAME_TOO_SHORT: &str = "name must be at least 3 characters";
pub const NUMBER_REQUIRED: &str = "number is required";
pub const NUMBER_TOO_SHORT: &str = "number must be at least 8 characters";
pub const NUMBER_BAD_FORMAT: &str =
    "number must be of form XX-xxxxxxx or XXX-xxxxxxx (min length 8)";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PhonebookError {
    #[error("malformatted id: {0}")]
    MalformedId(String),
    #[error("{0}")]
    Validation(String),
    #[error("contact {0} not found")]
    NotFound(ContactId),
    #[error("name must be unique: {0}")]
    DuplicateName(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ContactId(pub Ulid);

impl ContactId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parses a client-supplied identifier.
    ///
    /// # Errors
    /// Returns [`PhonebookError::MalformedId`] when `raw` is not a ULID.
    pub fn parse(raw: &str) -> Result<Self, PhonebookError> {
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| PhonebookError::MalformedId(raw.to_string()))
    }
}

impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContactId {
    type Err = PhonebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub number: String,
}

/// A contact that has not been stored yet. Fields are trimmed on construction.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewContact {
    pub name: String,
    pub number: String,
}

impl NewContact {
    #[must_use]
    pub fn new(name: &str, number: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            number: number.trim().to_string(),
        }
    }

    /// Checks both fields against the contact schema.
    ///
    /// # Errors
    /// Returns [`PhonebookError::Validation`] carrying the first violated rule.
    pub fn validate(&self) -> Result<(), PhonebookError> {
        validate_name(&self.name)?;
        validate_number(&self.number)
    }
}

/// # Errors
/// Returns [`PhonebookError::Validation`] for empty or short names.
pub fn validate_name(name: &str) -> Result<(), PhonebookError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PhonebookError::Validation(NAME_REQUIRED.to_string()));
    }
    if name.chars().count() < MIN_NAME_LEN {
        return Err(PhonebookError::Validation(NAME_TOO_SHORT.to_string()));
    }
    Ok(())
}

/// # Errors
/// Returns [`PhonebookError::Validation`] unless `number` is at least
/// [`MIN_NUMBER_LEN`] characters of the form `NN-digits` or `NNN-digits`,
/// where the digits after the prefix may be split by single hyphens.
pub fn validate_number(number: &str) -> Result<(), PhonebookError> {
    let number = number.trim();
    if number.is_empty() {
        return Err(PhonebookError::Validation(NUMBER_REQUIRED.to_string()));
    }
    if number.len() < MIN_NUMBER_LEN {
        return Err(PhonebookError::Validation(NUMBER_TOO_SHORT.to_string()));
    }
    if !is_phone_number(number) {
        return Err(PhonebookError::Validation(NUMBER_BAD_FORMAT.to_string()));
    }
    Ok(())
}

fn is_phone_number(value: &str) -> bool {
    let Some((prefix, rest)) = value.split_once('-') else {
        return false;
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    (2..=3).contains(&prefix.len()) && all_digits(prefix) && rest.split('-').all(all_digits)
}

/// Storage seam for contacts. Implementations are synchronous; async callers
/// are expected to run them on a blocking pool.
pub trait ContactRepository: Send + Sync {
    /// All contacts in insertion order.
    #[allow(clippy::missing_errors_doc)]
    fn list(&self) -> Result<Vec<Contact>, PhonebookError>;

    #[allow(clippy::missing_errors_doc)]
    fn get(&self, id: ContactId) -> Result<Option<Contact>, PhonebookError>;

    /// Validates `input`, rejects a name that is already taken, and stores it
    /// under a freshly generated id.
    #[allow(clippy::missing_errors_doc)]
    fn create(&self, input: &NewContact) -> Result<Contact, PhonebookError>;

    /// Replaces the number of an existing contact. `Ok(None)` when `id` is absent.
    #[allow(clippy::missing_errors_doc)]
    fn update_number(
        &self,
        id: ContactId,
        number: &str,
    ) -> Result<Option<Contact>, PhonebookError>;

    /// Returns whether a contact was removed.
    #[allow(clippy::missing_errors_doc)]
    fn delete(&self, id: ContactId) -> Result<bool, PhonebookError>;

    #[allow(clippy::missing_errors_doc)]
    fn count(&self) -> Result<usize, PhonebookError>;
}
