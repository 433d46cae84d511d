use super::{FieldErrors, FieldReader};
use serde_json::Value;

/// Legacy account record. Every field is optional; username and email are
/// unique when present (enforced by the database).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub birthname: Option<String>,
}

impl UserInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let username = r.optional_str("username", 150);
        if let Some(name) = &username {
            if !name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '@' | '+'))
            {
                r.error(
                    "username",
                    "Enter a valid username. Letters, digits and @/./+/-/_ only.",
                );
            }
        }
        let input = UserInput {
            username,
            email: r.optional_email("email"),
            birthname: r.optional_str("birthname", 255),
        };
        r.finish()?;
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_username_and_email() {
        let input =
            UserInput::from_json(&json!({"username": "johnsmith", "email": "John@Example.com"}))
                .unwrap();
        assert_eq!(input.username.as_deref(), Some("johnsmith"));
        assert_eq!(input.email.as_deref(), Some("john@example.com"));
        assert_eq!(input.birthname, None);
    }

    #[test]
    fn empty_body_is_valid() {
        assert_eq!(UserInput::from_json(&json!({})).unwrap(), UserInput::default());
    }

    #[test]
    fn rejects_bad_email_and_username() {
        let errors =
            UserInput::from_json(&json!({"username": "john smith", "email": "nope"})).unwrap_err();
        assert!(errors.contains("username"));
        assert!(errors.contains("email"));
    }
}
