use thiserror::Error;

pub const NAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name must be at most {max} characters", max = NAME_MAX_LEN)]
    NameTooLong,

    #[error("name may only contain ASCII letters, digits, '_', '-' and '.'")]
    NameCharacters,

    #[error(
        "password must be between {min} and {max} characters",
        min = PASSWORD_MIN_LEN,
        max = PASSWORD_MAX_LEN
    )]
    PasswordLength,

    #[error("password must not contain control characters")]
    PasswordCharacters,

    #[error("count must be greater than zero")]
    ZeroCount,
}

/// Normalize and check a user name. Returns the trimmed name.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ValidationError::NameCharacters);
    }
    Ok(name.to_string())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ValidationError::PasswordLength);
    }
    if password.chars().any(char::is_control) {
        return Err(ValidationError::PasswordCharacters);
    }
    Ok(())
}
