//! Endpoint catalog and URL template resolution.
//!
//! Endpoints come in two disjoint sets: notification endpoints announce
//! recently changed identifiers, delivery endpoints serve the content for one
//! identifier. The catalog is built once at startup and passed by reference;
//! nothing mutates it afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Placeholder marker in URL templates, substituted positionally.
const FIELD_MARKER: &str = "{}";

/// Field name for the lookback timestamp.
pub const FIELD_SINCE: &str = "since";

/// Field name for the content identifier.
pub const FIELD_ID: &str = "id";

/// Timestamp format the provider expects in `since` fields.
const SINCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Render an instant the way `since` fields expect it.
pub fn since_field(instant: &DateTime<Utc>) -> String {
    instant.format(SINCE_FORMAT).to_string()
}

/// One named endpoint: a URL template plus request requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Short name used in config and in output records
    pub name: String,

    /// URL template containing one `{}` per declared field
    pub template: String,

    /// Substitution fields in declaration order
    #[serde(default)]
    pub fields: Vec<String>,

    /// Attach the API key header when a key is available
    #[serde(default)]
    pub needs_key: bool,

    /// Attach the session cookie header when a cookie is available
    #[serde(default)]
    pub needs_cookie: bool,

    /// Prefix the cookie with the site-variant directive
    #[serde(default)]
    pub needs_site_variant: bool,
}

impl Endpoint {
    /// Resolve the template into a full URL.
    ///
    /// Fields are substituted positionally in declaration order; a declared
    /// field with no supplied value becomes the empty string. The resolved
    /// string must parse as an absolute URL.
    pub fn resolve(&self, values: &[(&str, String)]) -> Result<String> {
        let mut url = self.template.clone();
        for field in &self.fields {
            let value = values
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, value)| value.as_str())
                .unwrap_or("");

            match url.find(FIELD_MARKER) {
                Some(pos) => url.replace_range(pos..pos + FIELD_MARKER.len(), value),
                None => {
                    return Err(AppError::endpoint(
                        &self.name,
                        "template has fewer '{}' markers than declared fields",
                    ));
                }
            }
        }

        url::Url::parse(&url)?;
        Ok(url)
    }

    /// Check template/field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("endpoint name is empty"));
        }
        let markers = self.template.matches(FIELD_MARKER).count();
        if markers != self.fields.len() {
            return Err(AppError::endpoint(
                &self.name,
                format!(
                    "template declares {} field(s) but has {} '{{}}' marker(s)",
                    self.fields.len(),
                    markers
                ),
            ));
        }
        Ok(())
    }
}

/// Immutable endpoint catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    /// Sources announcing recently changed identifiers
    #[serde(default = "defaults::notifications")]
    pub notifications: Vec<Endpoint>,

    /// Sources from which the content for one identifier may be retrieved
    #[serde(default = "defaults::deliveries")]
    pub deliveries: Vec<Endpoint>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            notifications: defaults::notifications(),
            deliveries: defaults::deliveries(),
        }
    }
}

impl Registry {
    /// Look up a notification endpoint by name. Unknown names are a fatal
    /// configuration error.
    pub fn notification(&self, name: &str) -> Result<&Endpoint> {
        Self::lookup(&self.notifications, name)
    }

    /// Look up a delivery endpoint by name.
    pub fn delivery(&self, name: &str) -> Result<&Endpoint> {
        Self::lookup(&self.deliveries, name)
    }

    fn lookup<'a>(set: &'a [Endpoint], name: &str) -> Result<&'a Endpoint> {
        set.iter()
            .find(|endpoint| endpoint.name == name)
            .ok_or_else(|| AppError::config(format!("Unknown endpoint name: {name}")))
    }

    /// Validate every endpoint and name uniqueness within each set.
    pub fn validate(&self) -> Result<()> {
        for set in [&self.notifications, &self.deliveries] {
            let mut names = std::collections::HashSet::new();
            for endpoint in set {
                endpoint.validate()?;
                if !names.insert(endpoint.name.as_str()) {
                    return Err(AppError::validation(format!(
                        "duplicate endpoint name: {}",
                        endpoint.name
                    )));
                }
            }
        }
        Ok(())
    }
}

mod defaults {
    use super::{Endpoint, FIELD_ID, FIELD_SINCE};

    fn endpoint(
        name: &str,
        template: &str,
        fields: &[&str],
        needs_key: bool,
        needs_cookie: bool,
        needs_site_variant: bool,
    ) -> Endpoint {
        Endpoint {
            name: name.into(),
            template: template.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            needs_key,
            needs_cookie,
            needs_site_variant,
        }
    }

    pub fn notifications() -> Vec<Endpoint> {
        vec![
            endpoint(
                "API-V2",
                "http://api.ft.com/content/notifications?since={}",
                &[FIELD_SINCE],
                true,
                false,
                false,
            ),
            endpoint(
                "API-V1",
                "http://api.ft.com/content/notifications/v1/items?since={}",
                &[FIELD_SINCE],
                true,
                false,
                false,
            ),
        ]
    }

    pub fn deliveries() -> Vec<Endpoint> {
        vec![
            endpoint(
                "WWW-ART",
                "http://www.ft.com/cms/s/0/{}.html",
                &[FIELD_ID],
                false,
                true,
                false,
            ),
            endpoint(
                "NEXT-ART",
                "http://next.ft.com/{}",
                &[FIELD_ID],
                false,
                true,
                true,
            ),
            endpoint(
                "API-V1-ART",
                "http://api.ft.com/content/items/v1/{}",
                &[FIELD_ID],
                true,
                false,
                false,
            ),
            endpoint(
                "API-V2-ART",
                "http://api.ft.com/content/{}",
                &[FIELD_ID],
                true,
                false,
                false,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article_endpoint() -> Endpoint {
        Endpoint {
            name: "TEST-ART".into(),
            template: "http://example.com/content/{}".into(),
            fields: vec![FIELD_ID.into()],
            needs_key: false,
            needs_cookie: false,
            needs_site_variant: false,
        }
    }

    #[test]
    fn resolve_substitutes_in_declaration_order() {
        let endpoint = Endpoint {
            name: "TWO".into(),
            template: "http://example.com/{}?since={}".into(),
            fields: vec![FIELD_ID.into(), FIELD_SINCE.into()],
            needs_key: false,
            needs_cookie: false,
            needs_site_variant: false,
        };

        let url = endpoint
            .resolve(&[
                (FIELD_SINCE, "2015-06-20T09:00:00Z".into()),
                (FIELD_ID, "abc".into()),
            ])
            .unwrap();
        assert_eq!(url, "http://example.com/abc?since=2015-06-20T09:00:00Z");
    }

    #[test]
    fn resolve_uses_empty_string_for_missing_field() {
        let url = article_endpoint().resolve(&[]).unwrap();
        assert_eq!(url, "http://example.com/content/");
    }

    #[test]
    fn resolve_without_fields_returns_template() {
        let endpoint = Endpoint {
            name: "STATIC".into(),
            template: "http://example.com/home".into(),
            fields: vec![],
            needs_key: false,
            needs_cookie: false,
            needs_site_variant: false,
        };
        assert_eq!(endpoint.resolve(&[]).unwrap(), "http://example.com/home");
    }

    #[test]
    fn resolve_rejects_non_url_result() {
        let endpoint = Endpoint {
            name: "BROKEN".into(),
            template: "not a url {}".into(),
            fields: vec![FIELD_ID.into()],
            needs_key: false,
            needs_cookie: false,
            needs_site_variant: false,
        };
        assert!(endpoint.resolve(&[(FIELD_ID, "x".into())]).is_err());
    }

    #[test]
    fn validate_rejects_marker_field_mismatch() {
        let mut endpoint = article_endpoint();
        endpoint.fields.push(FIELD_SINCE.into());
        assert!(endpoint.validate().is_err());
    }

    #[test]
    fn registry_lookup_unknown_name_fails() {
        let registry = Registry::default();
        assert!(registry.notification("API-V2").is_ok());
        assert!(registry.notification("NOPE").is_err());
        assert!(registry.delivery("API-V2-ART").is_ok());
        assert!(registry.delivery("API-V2").is_err());
    }

    #[test]
    fn default_registry_validates() {
        assert!(Registry::default().validate().is_ok());
    }

    #[test]
    fn since_field_format() {
        let instant = Utc.with_ymd_and_hms(2015, 6, 20, 9, 30, 1).unwrap();
        assert_eq!(since_field(&instant), "2015-06-20T09:30:01Z");
    }
}
