//! Payload shape checks.
//!
//! ```text
//! payload not an object                         → Block("payload is not an object")
//! context.attrs["action"] has a rule:
//!   a required field missing or of another kind → Block("<action>: field `x` ...")
//!   none of an any-of group present             → Block("<action>: needs one of ...")
//! ```
//!
//! Opt-in: not part of the default pipeline. Subscription dispatches and
//! replays pass through.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::value::Value;

/// Context attribute naming the action a payload carries.
pub const ACTION_ATTR: &str = "action";

/// Expected kind of a required field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Present and not null.
    Any,
    /// A number.
    Number,
    /// A non-empty string.
    Text,
    /// A boolean.
    Bool,
    /// An object.
    Object,
    /// An array.
    Array,
}

impl FieldKind {
    fn accepts(&self, v: &Value) -> bool {
        match self {
            FieldKind::Any => !v.is_null(),
            FieldKind::Number => matches!(v, Value::Number(_)),
            FieldKind::Text => v.as_str().is_some_and(|s| !s.is_empty()),
            FieldKind::Bool => matches!(v, Value::Bool(_)),
            FieldKind::Object => matches!(v, Value::Object(_)),
            FieldKind::Array => matches!(v, Value::Array(_)),
        }
    }

    fn as_label(&self) -> &'static str {
        match self {
            FieldKind::Any => "present",
            FieldKind::Number => "a number",
            FieldKind::Text => "a non-empty string",
            FieldKind::Bool => "a boolean",
            FieldKind::Object => "an object",
            FieldKind::Array => "an array",
        }
    }
}

/// Field requirements of one action.
#[derive(Clone, Debug, Default)]
pub struct ActionRule {
    required: Vec<(String, FieldKind)>,
    any_of: Vec<Vec<String>>,
}

impl ActionRule {
    /// Empty rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// `field` must be present with the given kind.
    pub fn require(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.required.push((field.into(), kind));
        self
    }

    /// At least one of `fields` must be present and not null.
    pub fn any_of<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of.push(fields.into_iter().map(Into::into).collect());
        self
    }

    fn check(&self, data: &Value) -> Result<(), String> {
        for (field, kind) in &self.required {
            if !data.get(field).is_some_and(|v| kind.accepts(v)) {
                return Err(format!("field `{field}` must be {}", kind.as_label()));
            }
        }
        for group in &self.any_of {
            if !group.iter().any(|f| data.get(f).is_some_and(|v| !v.is_null())) {
                return Err(format!("needs one of {}", group.join(", ")));
            }
        }
        Ok(())
    }
}

/// Payload validation middleware.
#[derive(Debug, Default)]
pub struct PayloadValidation {
    actions: HashMap<String, ActionRule>,
}

impl PayloadValidation {
    /// Requires object payloads; no per-action rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the rule for payloads whose context names `action`.
    pub fn action(mut self, action: impl Into<String>, rule: ActionRule) -> Self {
        self.actions.insert(action.into(), rule);
        self
    }

    fn verdict(&self, data: &Value, action: Option<&str>) -> Result<(), String> {
        let root = match data {
            Value::Shared(node) => node.get(),
            other => other.clone(),
        };
        if !matches!(root, Value::Object(_)) {
            return Err("payload is not an object".into());
        }
        match action.and_then(|a| self.actions.get(a).map(|rule| (a, rule))) {
            Some((name, rule)) => rule.check(&root).map_err(|e| format!("{name}: {e}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Middleware for PayloadValidation {
    fn name(&self) -> &'static str {
        "payload-validation"
    }

    fn priority(&self) -> i32 {
        priority::PAYLOAD
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() || ctx.context.is_replay() {
            return Flow::Continue;
        }
        let action = ctx.context.attrs.get(ACTION_ATTR).and_then(|v| v.as_str());
        match self.verdict(&ctx.data, action) {
            Ok(()) => Flow::Continue,
            Err(reason) => {
                tracing::warn!(event = %ctx.event, subscriber = %ctx.subscriber.id(), %reason, "invalid payload");
                Flow::Block { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager, SubscriberOptions};
    use crate::config::BusConfig;
    use crate::error::HandlerError;

    fn extraction_rules() -> PayloadValidation {
        PayloadValidation::new()
            .action("contentExtracted", ActionRule::new().any_of(["content", "metadata"]))
            .action(
                "extractionProgress",
                ActionRule::new()
                    .require("progress", FieldKind::Number)
                    .require("status", FieldKind::Text),
            )
    }

    fn action(name: &str) -> EmitContext {
        EmitContext::new().attr(ACTION_ATTR, json!(name))
    }

    #[test]
    fn action_rules() {
        let v = extraction_rules();
        let ok = Value::from(json!({"metadata": {"title": "t"}}));
        assert!(v.verdict(&ok, Some("contentExtracted")).is_ok());

        let empty = Value::from(json!({"content": null}));
        let err = v.verdict(&empty, Some("contentExtracted")).unwrap_err();
        assert_eq!(err, "contentExtracted: needs one of content, metadata");

        let progress = Value::from(json!({"progress": "half", "status": "running"}));
        let err = v.verdict(&progress, Some("extractionProgress")).unwrap_err();
        assert_eq!(err, "extractionProgress: field `progress` must be a number");

        let unknown = Value::from(json!({}));
        assert!(v.verdict(&unknown, Some("other")).is_ok());
        assert!(v.verdict(&unknown, None).is_ok());
    }

    #[tokio::test]
    async fn blocks_scalars_and_incomplete_actions() {
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(extraction_rules()))
            .build();
        let h = HandlerFn::arc("sink", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        mgr.subscribe("progress", h, SubscriberOptions::new()).await.unwrap();

        let report = mgr.emit("progress", Value::from("50%"), EmitContext::new()).await;
        assert_eq!(report.blocked_count, 1);

        let bad = Value::from(json!({"progress": 0.5}));
        let report = mgr.emit("progress", bad, action("extractionProgress")).await;
        assert_eq!(report.blocked_count, 1);

        let good = Value::from(json!({"progress": 0.5, "status": "running"}));
        let report = mgr.emit("progress", good, action("extractionProgress")).await;
        assert_eq!(report.success_count, 1);
    }
}
