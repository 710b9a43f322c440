//! Minijinja template rendering for notification messages.
//!
//! Renders notification subject and body templates using minijinja,
//! with access to the triggering event and the collection, media item
//! and rule group it concerns.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use chrono::{DateTime, Utc};

use crate::events::{Event, EventPayload};
use crate::traits::NotifyError;

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "{{ event }}\
{% if collection %}: {{ collection.title }}{% endif %}\
{% if media %} / {{ media.title }}{% endif %}";

pub const DEFAULT_BODY_TEMPLATE: &str = "[{{ time }}] {{ event }}\
{% if media %}\n{{ media.title }} ({{ media.id }}){% endif %}\
{% if collection %}\ncollection: {{ collection.title }}{% endif %}\
{% if rule_group %}\nrule group: {{ rule_group.name }}{% endif %}\
{% if action %}\naction: {{ action }}{% endif %}\
{% if reason %}\nreason: {{ reason }}{% endif %}\
{% if error %}\nerror: {{ error }}{% endif %}";

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    /// Event type name, e.g. `"CollectionMedia_Added"`.
    pub event: String,
    /// Emission time in RFC 3339.
    pub time: String,
    pub collection: Option<CollectionContext>,
    pub media: Option<MediaContext>,
    pub rule_group: Option<RuleGroupContext>,
    pub action: Option<String>,
    pub reason: Option<String>,
    pub error: Option<String>,
    /// Render time in RFC 3339.
    pub now: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionContext {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MediaContext {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleGroupContext {
    pub id: i64,
    pub name: String,
}

impl TemplateContext {
    /// Flatten an event into template variables.
    pub fn from_event(event: &Event, now: DateTime<Utc>) -> Self {
        let mut ctx = Self {
            event: event.event_type().as_str().to_string(),
            time: event.time.to_rfc3339(),
            collection: None,
            media: None,
            rule_group: None,
            action: None,
            reason: None,
            error: None,
            now: now.to_rfc3339(),
        };

        if let Some(change) = event.payload.media_change() {
            ctx.collection = Some(CollectionContext {
                id: change.collection_id,
                title: change.collection_title.clone(),
            });
            ctx.media = Some(MediaContext {
                id: change.media_id.clone(),
                title: change.title.clone(),
            });
            if let (Some(id), Some(name)) = (change.rule_group_id, &change.rule_group_name) {
                ctx.rule_group = Some(RuleGroupContext {
                    id,
                    name: name.clone(),
                });
            }
            ctx.action = change.action.map(|a| a.as_str().to_string());
            ctx.reason = change.reason.clone();
        }

        if let Some(failure) = event.payload.failure() {
            ctx.error = Some(failure.error.clone());
            match (&event.payload, failure.rule_group_id, failure.collection_id) {
                (EventPayload::RuleHandlerFailed(_), Some(id), _) => {
                    ctx.rule_group = Some(RuleGroupContext {
                        id,
                        name: failure.name.clone(),
                    });
                }
                (_, _, Some(id)) => {
                    ctx.collection = Some(CollectionContext {
                        id,
                        title: failure.name.clone(),
                    });
                }
                _ => {}
            }
        }

        ctx
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env.add_filter("json", json_filter);

        env.add_function("env", env_function);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: serde::Serialize>(
        &self,
        template_str: &str,
        ctx: &S,
    ) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Custom filter: a value as a JSON literal, for templates that produce
/// JSON documents. Undefined and none render as `null`.
fn json_filter(value: minijinja::Value) -> Result<String, minijinja::Error> {
    if value.is_undefined() || value.is_none() {
        return Ok("null".to_string());
    }
    serde_json::to_string(&value).map_err(|e| {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
    })
}

/// Global function: read an environment variable by name. Missing
/// variables render as an empty string.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Failure, MediaChange};
    use chrono::TimeZone;
    use culler_core::ArrAction;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn handled_event() -> Event {
        Event {
            time: now(),
            payload: EventPayload::CollectionMediaHandled(MediaChange {
                collection_id: 4,
                collection_title: "Leaving Soon".to_string(),
                media_id: "1234".to_string(),
                title: "Heat".to_string(),
                rule_group_id: Some(2),
                rule_group_name: Some("Unwatched movies".to_string()),
                action: Some(ArrAction::Delete),
                reason: None,
            }),
        }
    }

    #[test]
    fn render_media_event() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        let result = renderer
            .render("{{ media.title }} left {{ collection.title }} ({{ action }})", &ctx)
            .unwrap();
        assert_eq!(result, "Heat left Leaving Soon (delete)");
    }

    #[test]
    fn default_subject_includes_collection_and_media() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        let subject = renderer.render(DEFAULT_SUBJECT_TEMPLATE, &ctx).unwrap();
        assert_eq!(subject, "CollectionMedia_Handled: Leaving Soon / Heat");
    }

    #[test]
    fn failure_event_exposes_error_and_group() {
        let event = Event {
            time: now(),
            payload: EventPayload::RuleHandlerFailed(Failure {
                rule_group_id: Some(7),
                collection_id: None,
                name: "Old shows".to_string(),
                error: "sonarr unreachable".to_string(),
            }),
        };
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&event, now());
        let body = renderer
            .render("{{ rule_group.name }}: {{ error | upper }}", &ctx)
            .unwrap();
        assert_eq!(body, "Old shows: SONARR UNREACHABLE");
        assert!(ctx.media.is_none());
    }

    #[test]
    fn default_body_renders_for_unit_events() {
        let event = Event {
            time: now(),
            payload: EventPayload::RuleHandlerStarted,
        };
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&event, now());
        let body = renderer.render(DEFAULT_BODY_TEMPLATE, &ctx).unwrap();
        assert_eq!(body, "[2024-05-01T12:00:00+00:00] RuleHandler_Started");
    }

    #[test]
    fn render_round_filter() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        let result = renderer.render("{{ 93.456 | round(1) }}", &ctx).unwrap();
        assert_eq!(result, "93.5");
    }

    #[test]
    fn json_filter_quotes_and_nulls() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        let result = renderer
            .render(
                "[{{ media.title | json }}, {{ error | json }}, {{ collection.id | json }}]",
                &ctx,
            )
            .unwrap();
        assert_eq!(result, r#"["Heat", null, 4]"#);

        let quoted = renderer
            .render("{{ v | json }}", &serde_json::json!({ "v": "say \"hi\"" }))
            .unwrap();
        assert_eq!(quoted, r#""say \"hi\"""#);
    }

    #[test]
    fn render_env_missing_returns_empty() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        let result = renderer
            .render("[{{ env('CULLER_DEFINITELY_NOT_SET_XYZ') }}]", &ctx)
            .unwrap();
        assert_eq!(result, "[]");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        let ctx = TemplateContext::from_event(&handled_event(), now());
        match renderer.render("{{ unclosed", &ctx) {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
        assert!(renderer.validate("{{ unclosed").is_err());
        assert!(renderer.validate(DEFAULT_BODY_TEMPLATE).is_ok());
    }
}
