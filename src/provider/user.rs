//! Demonstration user service.

use super::Provider;
use crate::envelope::{Envelope, EnvelopeError, UserLevel, UserName};

/// Route resolving a user's name.
pub const API_USER_NAME: &str = "/api/user_name";
/// Route resolving a user's level.
pub const API_USER_LEVEL: &str = "/api/user_level";

fn user_name(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let mut user: UserName = envelope.parse_data()?;
    user.name = match user.id {
        1 => "aaa".to_owned(),
        2 => "bbb".to_owned(),
        _ => user.name,
    };
    Ok(serde_json::to_string(&user)?)
}

fn user_level(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let mut user: UserLevel = envelope.parse_data()?;
    user.level = match user.id {
        1 => 11,
        2 => 22,
        _ => user.level,
    };
    Ok(serde_json::to_string(&user)?)
}

/// Provider serving [`API_USER_NAME`] and [`API_USER_LEVEL`].
#[must_use]
pub fn user_provider(name: impl Into<String>) -> Provider {
    Provider::new(name)
        .route(API_USER_NAME, user_name)
        .route(API_USER_LEVEL, user_level)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(API_USER_NAME, r#"{"id":1}"#, r#"{"id":1,"name":"aaa"}"#)]
    #[case(API_USER_NAME, r#"{"id":2}"#, r#"{"id":2,"name":"bbb"}"#)]
    #[case(API_USER_NAME, r#"{"id":9}"#, r#"{"id":9,"name":""}"#)]
    #[case(API_USER_LEVEL, r#"{"id":1}"#, r#"{"id":1,"level":11}"#)]
    #[case(API_USER_LEVEL, r#"{"id":2}"#, r#"{"id":2,"level":22}"#)]
    #[case(API_USER_LEVEL, "{}", r#"{"id":0,"level":0}"#)]
    fn resolves_known_users(#[case] route: &str, #[case] data: &str, #[case] expected: &str) {
        let reply = user_provider("user")
            .answer(Envelope::request("ext", route, data))
            .expect("answered");
        assert_eq!(reply.data, expected);
        assert_eq!(reply.action, route);
    }
}
