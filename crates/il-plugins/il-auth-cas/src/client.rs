//! CAS protocol v3 `serviceValidate`, JSON flavour.

use async_trait::async_trait;
use il_core::traits::{CasIdentity, CasVerifier};
use serde_json::Value;

pub struct CasClient {
    http: reqwest::Client,
    server_url: String,
}

impl CasClient {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(http, server_url))
    }

    pub fn with_client(http: reqwest::Client, server_url: &str) -> Self {
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn validate_url(&self) -> String {
        format!("{}/p3/serviceValidate", self.server_url)
    }

    /// Where the browser is sent to log in.
    pub fn login_url(&self, service_url: &str) -> anyhow::Result<reqwest::Url> {
        Ok(reqwest::Url::parse_with_params(
            &format!("{}/login", self.server_url),
            &[("service", service_url)],
        )?)
    }
}

#[async_trait]
impl CasVerifier for CasClient {
    async fn verify_ticket(&self, ticket: &str, service_url: &str) -> anyhow::Result<Option<CasIdentity>> {
        let body = self
            .http
            .get(self.validate_url())
            .query(&[("service", service_url), ("ticket", ticket), ("format", "JSON")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_service_response(&body)
    }
}

/// Attributes come back either as a single string or as a list of them.
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(first_string),
        _ => None,
    }
}

/// Extracts the identity from a `serviceResponse` document.
///
/// A refused ticket, or a success missing the login, the home directory or
/// the email, yields `Ok(None)`. Only unparseable bodies are errors.
pub fn parse_service_response(body: &str) -> anyhow::Result<Option<CasIdentity>> {
    let document: Value = serde_json::from_str(body)?;
    let response = &document["serviceResponse"];

    if let Some(failure) = response.get("authenticationFailure") {
        tracing::info!(
            code = failure["code"].as_str().unwrap_or_default(),
            "CAS ticket refused"
        );
        return Ok(None);
    }

    let success = &response["authenticationSuccess"];
    let attributes = &success["attributes"];
    let login = success.get("user").and_then(first_string);
    let home_directory = attributes.get("homeDirectory").and_then(first_string);
    let email = attributes.get("email").and_then(first_string);

    match (login, home_directory, email) {
        (Some(login), Some(home_directory), Some(email)) => Ok(Some(CasIdentity { login, home_directory, email })),
        _ => {
            tracing::warn!("CAS response is missing the login, homeDirectory or email");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_with_list_attributes() {
        let body = r#"{"serviceResponse": {"authenticationSuccess": {
            "user": "jdoe",
            "attributes": {"homeDirectory": ["/users/24/info/jdoe"], "email": ["jdoe@ens.fr"]}
        }}}"#;
        assert_eq!(
            parse_service_response(body).unwrap(),
            Some(CasIdentity {
                login: "jdoe".into(),
                home_directory: "/users/24/info/jdoe".into(),
                email: "jdoe@ens.fr".into(),
            })
        );
    }

    #[test]
    fn test_parse_success_with_plain_attributes() {
        let body = r#"{"serviceResponse": {"authenticationSuccess": {
            "user": "jdoe",
            "attributes": {"homeDirectory": "/home/jdoe", "email": "jdoe@ens.fr"}
        }}}"#;
        let identity = parse_service_response(body).unwrap().unwrap();
        assert_eq!(identity.home_directory, "/home/jdoe");
    }

    #[test]
    fn test_missing_attribute_fails_authentication() {
        let body = r#"{"serviceResponse": {"authenticationSuccess": {
            "user": "jdoe", "attributes": {"email": ["jdoe@ens.fr"]}
        }}}"#;
        assert_eq!(parse_service_response(body).unwrap(), None);
    }

    #[test]
    fn test_refused_ticket() {
        let body = r#"{"serviceResponse": {"authenticationFailure": {
            "code": "INVALID_TICKET", "description": "Ticket ST-1 not recognized"
        }}}"#;
        assert_eq!(parse_service_response(body).unwrap(), None);
        assert!(parse_service_response("<cas:serviceResponse/>").is_err());
    }

    #[test]
    fn test_urls() {
        let client = CasClient::new("https://cas.eleves.ens.fr/").unwrap();
        assert_eq!(client.validate_url(), "https://cas.eleves.ens.fr/p3/serviceValidate");
        let login = client.login_url("https://interludes.example.org/accounts/cas/login").unwrap();
        assert!(login.as_str().starts_with("https://cas.eleves.ens.fr/login?service=https%3A%2F%2F"));
    }
}
