//! Master password rules, checked before registration is sent

use passvault_core::{ErrorKind, OperationError};

pub const MIN_LENGTH: usize = 8;

/// Characters that count as "special"
pub const SPECIAL_CHARACTERS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

/// Every rule the password breaks, in a fixed order
pub fn violations(password: &str) -> Vec<String> {
    if password.is_empty() {
        return vec!["Password cannot be empty".to_string()];
    }

    let mut errors = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    errors
}

/// Accept the password or describe everything wrong with it
pub fn validate(password: &str) -> Result<(), OperationError> {
    let errors = violations(password);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(OperationError::new(ErrorKind::Validation, errors.join(", ")))
    }
}
