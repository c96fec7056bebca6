//! Sign-in credentials.
//!
//! Validated before any request leaves the client, with one message per
//! field so the form can show them next to the inputs.

use secrecy::{ExposeSecret, SecretString};

use super::email::Email;

/// Message shown for an unusable email address.
pub const EMAIL_MESSAGE: &str = "Enter a valid email";
/// Message shown for a missing password.
pub const PASSWORD_MESSAGE: &str = "Password required";

/// Per-field validation failures for a sign-in attempt.
#[derive(thiserror::Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("invalid sign-in form")]
pub struct CredentialsError {
    /// Problem with the email field, if any.
    pub email: Option<&'static str>,
    /// Problem with the password field, if any.
    pub password: Option<&'static str>,
}

/// Email and password for `POST /auth/login`.
///
/// The password is held as a [`SecretString`] so it never shows up in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    email: Email,
    password: SecretString,
}

impl Credentials {
    /// Validate raw form input.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialsError`] with every failing field filled in.
    pub fn parse(email: &str, password: &str) -> Result<Self, CredentialsError> {
        let parsed = Email::parse(email);
        let errors = CredentialsError {
            email: parsed.is_err().then_some(EMAIL_MESSAGE),
            password: password.is_empty().then_some(PASSWORD_MESSAGE),
        };

        match parsed {
            Ok(email) if errors.password.is_none() => Ok(Self {
                email,
                password: SecretString::from(password.to_owned()),
            }),
            _ => Err(errors),
        }
    }

    /// The validated email address.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    /// Expose the password for the login request body.
    #[must_use]
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_credentials() {
        let creds = Credentials::parse("asha@suraj.in", "hunter22").unwrap();
        assert_eq!(creds.email().as_str(), "asha@suraj.in");
        assert_eq!(creds.expose_password(), "hunter22");
    }

    #[test]
    fn test_both_fields_reported() {
        let err = Credentials::parse("nope", "").unwrap_err();
        assert_eq!(err.email, Some(EMAIL_MESSAGE));
        assert_eq!(err.password, Some(PASSWORD_MESSAGE));
    }

    #[test]
    fn test_only_password_missing() {
        let err = Credentials::parse("asha@suraj.in", "").unwrap_err();
        assert_eq!(err.email, None);
        assert_eq!(err.password, Some(PASSWORD_MESSAGE));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::parse("asha@suraj.in", "super-secret-pw").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("asha@suraj.in"));
        assert!(!debug.contains("super-secret-pw"));
    }
}
