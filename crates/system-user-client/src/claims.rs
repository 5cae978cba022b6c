//! Claims identity and ticket types.

use common::secret::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::fmt;

/// One verified `(type, value)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl fmt::Debug for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("claim_type", &self.claim_type)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// The verified claims of a token, in token order.
///
/// Only ever built from a payload whose signature has been checked.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClaimsIdentity {
    claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Flatten a verified JWT payload.
    ///
    /// String values map directly. Arrays yield one claim per element.
    /// Nulls are dropped. Anything else keeps its JSON text.
    pub(crate) fn from_payload(payload: &Map<String, Value>) -> Self {
        let mut claims = Vec::with_capacity(payload.len());

        for (claim_type, value) in payload {
            match value {
                Value::Array(items) => {
                    for item in items {
                        push_claim(&mut claims, claim_type, item);
                    }
                }
                other => push_claim(&mut claims, claim_type, other),
            }
        }

        Self { claims }
    }

    /// First claim whose type equals `claim_type`, ignoring ASCII case.
    pub fn find(&self, claim_type: &str) -> Option<&Claim> {
        self.claims
            .iter()
            .find(|c| c.claim_type.eq_ignore_ascii_case(claim_type))
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl fmt::Debug for ClaimsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.claims.iter().map(|c| c.claim_type.as_str()).collect();
        f.debug_struct("ClaimsIdentity")
            .field("claim_types", &types)
            .finish()
    }
}

fn push_claim(claims: &mut Vec<Claim>, claim_type: &str, value: &Value) {
    let value = match value {
        Value::Null => return,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    claims.push(Claim {
        claim_type: claim_type.to_string(),
        value,
    });
}

/// The session credential extracted from a validated token.
#[derive(Debug, Clone)]
pub struct Ticket(SecretString);

impl Ticket {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<Ticket> for SecretString {
    fn from(ticket: Ticket) -> Self {
        ticket.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn test_from_payload_keeps_token_order() {
        let identity = ClaimsIdentity::from_payload(&payload(json!({
            "iss": "https://sod.superoffice.com",
            "sub": "system",
            "ticket": "7T:abc",
            "exp": 1_700_000_000
        })));

        let types: Vec<&str> = identity.claims().iter().map(|c| c.claim_type.as_str()).collect();
        assert_eq!(types, vec!["iss", "sub", "ticket", "exp"]);
        assert_eq!(identity.find("exp").unwrap().value, "1700000000");
    }

    #[test]
    fn test_from_payload_flattens_arrays() {
        let identity = ClaimsIdentity::from_payload(&payload(json!({
            "aud": ["spn:sod.superoffice.com", "other"],
            "nothing": null
        })));

        assert_eq!(identity.len(), 2);
        assert_eq!(identity.claims().get(1).unwrap().value, "other");
        assert!(identity.find("nothing").is_none());
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let identity = ClaimsIdentity::from_payload(&payload(json!({ "Ticket": "7T:xyz" })));

        assert_eq!(identity.find("ticket").unwrap().value, "7T:xyz");
        assert_eq!(identity.find("TICKET").unwrap().value, "7T:xyz");
        assert!(identity.find("tick").is_none());
    }

    #[test]
    fn test_debug_redacts_values() {
        let identity = ClaimsIdentity::from_payload(&payload(json!({ "ticket": "7T:secret" })));

        let debug_str = format!("{identity:?} {:?}", identity.claims().first().unwrap());
        assert!(debug_str.contains("ticket"));
        assert!(!debug_str.contains("7T:secret"));
    }

    #[test]
    fn test_ticket_debug_is_redacted() {
        let ticket = Ticket::new("7T:secret");
        assert_eq!(ticket.expose_secret(), "7T:secret");
        assert!(!format!("{ticket:?}").contains("7T:secret"));
    }
}
