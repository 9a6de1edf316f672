//! Input Validation
//!
//! Pattern validators for untrusted form fields, HTML escaping, and a
//! heuristic SQL-injection scanner.
//!
//! Every function here is pure and total over string input: the boolean
//! validators never panic and never report partial validity.
//!
//! The injection scanner rejects suspicious-looking input before it reaches
//! authentication. False positives on legitimate text (an `@` in a display
//! name, the word "and" in a sentence) are accepted. It is never a
//! substitute for parameterized queries.
//!
//! # Usage
//!
//! ```ignore
//! use warden::validation::{InputValidator, Validate, ValidationError};
//!
//! struct LoginForm {
//!     username: String,
//!     password: String,
//! }
//!
//! impl Validate for LoginForm {
//!     fn validate(&self) -> Result<(), ValidationError> {
//!         InputValidator::check_username(&self.username)?;
//!         InputValidator::check_no_sql_injection(&self.username, "username")?;
//!         Ok(())
//!     }
//! }
//!
//! assert!(InputValidator::validate_password("Abc123!@"));
//! assert!(InputValidator::detect_sql_injection("admin' OR 1=1 --"));
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// Symbols accepted (and one required) by the password rule
pub const PASSWORD_SYMBOLS: &str = "@$!%*?&";

/// Minimum password length
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Inclusive username length bounds
pub const USERNAME_LENGTH: (usize, usize) = (3, 20);

/// Inclusive age bounds
pub const AGE_RANGE: (i64, i64) = (13, 120);

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").ok());

/// Indicator names, index-aligned with `SQL_PATTERNS`
const SQL_INDICATORS: [&str; 13] = [
    "--", "or", "and", "union", ";", "/*", "*/", "@@", "@", "select", "insert", "delete", "update",
];

static SQL_PATTERNS: LazyLock<Option<RegexSet>> = LazyLock::new(|| {
    RegexSet::new([
        r"--",
        r"(?i)\bor\b",
        r"(?i)\band\b",
        r"(?i)\bunion\b",
        r";",
        r"/\*",
        r"\*/",
        r"@@",
        r"@",
        r"(?i)\bselect\b",
        r"(?i)\binsert\b",
        r"(?i)\bdelete\b",
        r"(?i)\bupdate\b",
    ])
    .ok()
});

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation error with field context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation (if applicable)
    pub field: Option<String>,
    /// Error code for programmatic handling
    pub code: ValidationErrorCode,
    /// Human-readable message
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(code: ValidationErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: None,
            code,
            message: message.into(),
        }
    }

    /// Create a validation error for a specific field
    pub fn for_field(
        field: impl Into<String>,
        code: ValidationErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            code,
            message: message.into(),
        }
    }

    /// True when the input was rejected by the injection heuristic
    pub fn is_suspicious(&self) -> bool {
        self.code == ValidationErrorCode::DangerousContent
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validation error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// Value is required but missing/empty
    Required,
    /// Email format is invalid
    InvalidEmail,
    /// Username format is invalid
    InvalidUsername,
    /// Password does not meet the complexity rule
    WeakPassword,
    /// Value is not an integer or out of range
    OutOfRange,
    /// Value matched an injection heuristic
    DangerousContent,
}

impl ValidationErrorCode {
    /// Get the code as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::InvalidEmail => "invalid_email",
            Self::InvalidUsername => "invalid_username",
            Self::WeakPassword => "weak_password",
            Self::OutOfRange => "out_of_range",
            Self::DangerousContent => "dangerous_content",
        }
    }
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for validatable types
///
/// Implement this on request/form types to enable validation.
pub trait Validate {
    /// Validate the instance, returning the first error found
    fn validate(&self) -> Result<(), ValidationError>;

    /// Check if the instance is valid (convenience method)
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// ============================================================================
// Input Validator
// ============================================================================

/// Field validators and input screening.
///
/// The `validate_*` functions and [`detect_sql_injection`](Self::detect_sql_injection)
/// return booleans. The `check_*` functions wrap them into field-specific
/// [`ValidationError`]s for the route layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator;

impl InputValidator {
    /// `local@domain.tld` with word characters, dots and hyphens.
    pub fn validate_email(email: &str) -> bool {
        EMAIL_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(email))
    }

    /// 3 to 20 ASCII letters or digits.
    pub fn validate_username(username: &str) -> bool {
        let (min, max) = USERNAME_LENGTH;
        (min..=max).contains(&username.len())
            && username.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// At least 8 characters from `[A-Za-z0-9@$!%*?&]`, with one lowercase
    /// letter, one uppercase letter, one digit and one symbol.
    pub fn validate_password(password: &str) -> bool {
        let allowed =
            |c: char| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c);

        password.chars().count() >= PASSWORD_MIN_LENGTH
            && password.chars().all(allowed)
            && password.chars().any(|c| c.is_ascii_lowercase())
            && password.chars().any(|c| c.is_ascii_uppercase())
            && password.chars().any(|c| c.is_ascii_digit())
            && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
    }

    /// An integer between 13 and 120 inclusive. Surrounding whitespace is
    /// ignored; anything non-numeric is `false`.
    pub fn validate_age(age: &str) -> bool {
        let (min, max) = AGE_RANGE;
        age.trim()
            .parse::<i64>()
            .is_ok_and(|age| (min..=max).contains(&age))
    }

    /// Escape markup-significant characters for verbatim inclusion in HTML.
    ///
    /// The result never contains a raw `<`, `>`, `"` or `'`, and every `&`
    /// starts an entity.
    pub fn sanitize_html(text: &str) -> String {
        let mut result = String::with_capacity(text.len() + text.len() / 4);
        for c in text.chars() {
            match c {
                '&' => result.push_str("&amp;"),
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&#x27;"),
                _ => result.push(c),
            }
        }
        result
    }

    /// Case-insensitive scan for SQL keywords and metacharacters.
    pub fn detect_sql_injection(text: &str) -> bool {
        match SQL_PATTERNS.as_ref() {
            Some(patterns) => patterns.is_match(text),
            // Fail closed if the pattern set never compiled.
            None => true,
        }
    }

    /// Names of every heuristic that matched, for audit details.
    pub fn sql_injection_indicators(text: &str) -> Vec<&'static str> {
        match SQL_PATTERNS.as_ref() {
            Some(patterns) => patterns
                .matches(text)
                .into_iter()
                .map(|idx| SQL_INDICATORS[idx])
                .collect(),
            None => vec!["unavailable"],
        }
    }

    // ------------------------------------------------------------------------
    // Field-specific checks
    // ------------------------------------------------------------------------

    /// Reject empty or whitespace-only values
    pub fn check_required(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::for_field(
                field,
                ValidationErrorCode::Required,
                "Field is required",
            ));
        }
        Ok(())
    }

    /// Field-specific form of [`validate_email`](Self::validate_email)
    pub fn check_email(email: &str) -> Result<(), ValidationError> {
        if !Self::validate_email(email) {
            return Err(ValidationError::for_field(
                "email",
                ValidationErrorCode::InvalidEmail,
                "Invalid email format",
            ));
        }
        Ok(())
    }

    /// Field-specific form of [`validate_username`](Self::validate_username)
    pub fn check_username(username: &str) -> Result<(), ValidationError> {
        if !Self::validate_username(username) {
            let (min, max) = USERNAME_LENGTH;
            return Err(ValidationError::for_field(
                "username",
                ValidationErrorCode::InvalidUsername,
                format!("Must be {} to {} letters or digits", min, max),
            ));
        }
        Ok(())
    }

    /// Field-specific form of [`validate_password`](Self::validate_password)
    pub fn check_password(password: &str) -> Result<(), ValidationError> {
        if !Self::validate_password(password) {
            return Err(ValidationError::for_field(
                "password",
                ValidationErrorCode::WeakPassword,
                format!(
                    "Must be at least {} characters with upper and lower case letters, a digit and one of {}",
                    PASSWORD_MIN_LENGTH, PASSWORD_SYMBOLS
                ),
            ));
        }
        Ok(())
    }

    /// Field-specific form of [`validate_age`](Self::validate_age)
    pub fn check_age(age: &str) -> Result<(), ValidationError> {
        if !Self::validate_age(age) {
            let (min, max) = AGE_RANGE;
            return Err(ValidationError::for_field(
                "age",
                ValidationErrorCode::OutOfRange,
                format!("Must be a whole number between {} and {}", min, max),
            ));
        }
        Ok(())
    }

    /// Reject values the injection heuristic flags.
    ///
    /// The message is deliberately generic; the matched indicators belong
    /// in the audit trail, not in the response.
    pub fn check_no_sql_injection(value: &str, field: &str) -> Result<(), ValidationError> {
        if Self::detect_sql_injection(value) {
            return Err(ValidationError::for_field(
                field,
                ValidationErrorCode::DangerousContent,
                "Input contains disallowed characters",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(InputValidator::validate_email("user@example.com"));
        assert!(InputValidator::validate_email("first.last-x@mail.example.co.uk"));
        assert!(InputValidator::validate_email("under_score@example.org"));
        assert!(!InputValidator::validate_email("invalid"));
        assert!(!InputValidator::validate_email("@example.com"));
        assert!(!InputValidator::validate_email("user@"));
        assert!(!InputValidator::validate_email("user@localhost"));
        assert!(!InputValidator::validate_email("user name@example.com"));
        assert!(!InputValidator::validate_email(""));
    }

    #[test]
    fn test_validate_username() {
        assert!(InputValidator::validate_username("bob"));
        assert!(InputValidator::validate_username("normalUser42"));
        assert!(InputValidator::validate_username("a1234567890123456789"));
        assert!(!InputValidator::validate_username("ab"));
        assert!(!InputValidator::validate_username("a12345678901234567890"));
        assert!(!InputValidator::validate_username("normal_user42"));
        assert!(!InputValidator::validate_username("user name"));
        assert!(!InputValidator::validate_username("usér"));
    }

    #[test]
    fn test_validate_password() {
        assert!(InputValidator::validate_password("Abc123!@"));
        assert!(InputValidator::validate_password("LongerPassw0rd?"));
        assert!(!InputValidator::validate_password("abc123"));
        assert!(!InputValidator::validate_password("Abc12!@"), "seven characters");
        assert!(!InputValidator::validate_password("abc123!@"), "no uppercase");
        assert!(!InputValidator::validate_password("ABC123!@"), "no lowercase");
        assert!(!InputValidator::validate_password("Abcdef!@"), "no digit");
        assert!(!InputValidator::validate_password("Abc12345"), "no symbol");
        assert!(!InputValidator::validate_password("Abc 123!@"), "space not allowed");
        assert!(!InputValidator::validate_password("Abc123!#"), "# not allowed");
    }

    #[test]
    fn test_validate_age() {
        assert!(InputValidator::validate_age("13"));
        assert!(InputValidator::validate_age("120"));
        assert!(InputValidator::validate_age(" 42 "));
        assert!(InputValidator::validate_age("+30"));
        assert!(!InputValidator::validate_age("12"));
        assert!(!InputValidator::validate_age("121"));
        assert!(!InputValidator::validate_age("-20"));
        assert!(!InputValidator::validate_age("forty"));
        assert!(!InputValidator::validate_age("42.5"));
        assert!(!InputValidator::validate_age(""));
        assert!(!InputValidator::validate_age("99999999999999999999999"));
    }

    #[test]
    fn test_sanitize_html() {
        let escaped = InputValidator::sanitize_html("<script>");
        assert_eq!(escaped, "&lt;script&gt;");
        assert!(!escaped.contains('<') && !escaped.contains('>'));

        assert_eq!(InputValidator::sanitize_html("A & B"), "A &amp; B");
        assert_eq!(
            InputValidator::sanitize_html(r#"<a href="x" title='y'>"#),
            "&lt;a href=&quot;x&quot; title=&#x27;y&#x27;&gt;"
        );
        assert_eq!(InputValidator::sanitize_html("plain text"), "plain text");
    }

    #[test]
    fn test_sanitize_html_escapes_existing_entities() {
        assert_eq!(InputValidator::sanitize_html("&lt;"), "&amp;lt;");
    }

    #[test]
    fn test_detect_sql_injection() {
        assert!(InputValidator::detect_sql_injection("admin' OR 1=1 --"));
        assert!(InputValidator::detect_sql_injection("1; DROP TABLE users"));
        assert!(InputValidator::detect_sql_injection("x UNION select password"));
        assert!(InputValidator::detect_sql_injection("/* comment */"));
        assert!(InputValidator::detect_sql_injection("@@version"));
        assert!(InputValidator::detect_sql_injection("user@example.com"));
        assert!(!InputValidator::detect_sql_injection("normal_user42"));
        assert!(!InputValidator::detect_sql_injection("oregon"));
        assert!(!InputValidator::detect_sql_injection("selection"));
        assert!(!InputValidator::detect_sql_injection(""));
    }

    #[test]
    fn test_sql_injection_indicators() {
        let found = InputValidator::sql_injection_indicators("admin' OR 1=1 --");
        assert_eq!(found, vec!["--", "or"]);
        assert!(InputValidator::sql_injection_indicators("hello").is_empty());
    }

    #[test]
    fn test_check_functions_carry_field() {
        let err = InputValidator::check_username("x").unwrap_err();
        assert_eq!(err.field.as_deref(), Some("username"));
        assert_eq!(err.code, ValidationErrorCode::InvalidUsername);

        let err = InputValidator::check_age("7").unwrap_err();
        assert_eq!(err.code, ValidationErrorCode::OutOfRange);

        let err = InputValidator::check_no_sql_injection("a;b", "comment").unwrap_err();
        assert!(err.is_suspicious());
        assert_eq!(err.to_string(), "comment: Input contains disallowed characters");

        assert!(InputValidator::check_required("  ", "name").is_err());
        assert!(InputValidator::check_email("user@example.com").is_ok());
        assert!(InputValidator::check_password("Abc123!@").is_ok());
    }

    #[test]
    fn test_validate_trait() {
        struct Signup {
            username: String,
            age: String,
        }

        impl Validate for Signup {
            fn validate(&self) -> Result<(), ValidationError> {
                InputValidator::check_username(&self.username)?;
                InputValidator::check_age(&self.age)?;
                Ok(())
            }
        }

        let ok = Signup { username: "alice".into(), age: "30".into() };
        assert!(ok.is_valid());

        let bad = Signup { username: "alice".into(), age: "3".into() };
        assert_eq!(bad.validate().unwrap_err().field.as_deref(), Some("age"));
    }
}
