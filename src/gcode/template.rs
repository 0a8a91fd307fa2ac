//! Template-driven values.
//!
//! An evaluator renders a template to text and pushes the result into a
//! single-slot mailbox. The subscriber drains the slot on its own schedule,
//! so the evaluator never calls back into it.

use std::collections::HashMap;
use tokio::sync::watch;

use super::{GCodeCommand, GCodeError};

/// Sending half of a template mailbox, held by the evaluator.
#[derive(Debug, Clone)]
pub struct TemplateSink {
    tx: watch::Sender<Option<String>>,
}

impl TemplateSink {
    /// Replace the pending rendering. Returns `false` once the subscriber
    /// has gone away.
    pub fn publish(&self, text: impl Into<String>) -> bool {
        self.tx.send(Some(text.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a template mailbox, held by the subscriber.
#[derive(Debug)]
pub struct TemplateMailbox {
    rx: watch::Receiver<Option<String>>,
}

impl TemplateMailbox {
    /// Take the latest rendering if one arrived since the last call.
    pub fn take(&mut self) -> Option<String> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }
}

pub fn template_channel() -> (TemplateSink, TemplateMailbox) {
    let (tx, rx) = watch::channel(None);
    (TemplateSink { tx }, TemplateMailbox { rx })
}

/// Renders templates named by a command and keeps subscribers updated.
pub trait TemplateEvaluator {
    /// Subscribe `sink` to the template described by `gcmd` (its `TEMPLATE`
    /// parameter and any template variables it carries).
    fn set_template(&mut self, gcmd: &GCodeCommand, sink: TemplateSink) -> Result<(), GCodeError>;
}

#[derive(Debug)]
struct Subscription {
    template: String,
    params: HashMap<String, String>,
    sink: TemplateSink,
}

/// Evaluator that treats the template as literal text with `{NAME}`
/// placeholders. Placeholders resolve against the subscribing command's
/// parameters first, then against variables set through
/// [`LiteralTemplateEvaluator::set_variable`]; unknown names render empty.
#[derive(Debug, Default)]
pub struct LiteralTemplateEvaluator {
    variables: HashMap<String, String>,
    subscriptions: Vec<Subscription>,
}

impl LiteralTemplateEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update a template input and re-render every live subscription.
    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_ascii_uppercase(), value.into());
        self.refresh();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn refresh(&mut self) {
        let variables = &self.variables;
        self.subscriptions.retain(|sub| {
            let text = render(&sub.template, &sub.params, variables);
            sub.sink.publish(text)
        });
    }
}

impl TemplateEvaluator for LiteralTemplateEvaluator {
    fn set_template(&mut self, gcmd: &GCodeCommand, sink: TemplateSink) -> Result<(), GCodeError> {
        let template = gcmd
            .get("TEMPLATE")
            .ok_or_else(|| GCodeError::Usage("TEMPLATE must be specified".to_string()))?
            .to_string();
        let sub = Subscription {
            template,
            params: gcmd.parameters.clone(),
            sink,
        };
        let text = render(&sub.template, &sub.params, &self.variables);
        tracing::debug!("Template '{}' rendered '{}'", sub.template, text);
        if sub.sink.publish(text) {
            self.subscriptions.push(sub);
        }
        Ok(())
    }
}

fn render(
    template: &str,
    params: &HashMap<String, String>,
    variables: &HashMap<String, String>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = rest[start + 1..start + len].trim().to_ascii_uppercase();
        if let Some(value) = params.get(&name).or_else(|| variables.get(&name)) {
            out.push_str(value);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_keeps_only_latest() {
        let (sink, mut mailbox) = template_channel();
        assert_eq!(mailbox.take(), None);
        assert!(sink.publish("0.1"));
        assert!(sink.publish("0.2"));
        assert_eq!(mailbox.take().as_deref(), Some("0.2"));
        assert_eq!(mailbox.take(), None);
        drop(mailbox);
        assert!(!sink.publish("0.3"));
        assert!(sink.is_closed());
    }

    #[test]
    fn test_render_placeholders() {
        let params = HashMap::from([("SPEED".to_string(), "0.4".to_string())]);
        let variables = HashMap::from([("TEMP".to_string(), "25".to_string())]);
        assert_eq!(render("{speed}", &params, &variables), "0.4");
        assert_eq!(render("t={TEMP} x={NOPE}", &params, &variables), "t=25 x=");
        assert_eq!(render("open {brace", &params, &variables), "open {brace");
    }

    #[test]
    fn test_variables_rerender_and_drop_closed_subscribers() {
        let mut evaluator = LiteralTemplateEvaluator::new();
        let gcmd = GCodeCommand::parse("SET_VIRTUAL_PIN PIN=fan TEMPLATE={LEVEL}").unwrap();
        let (sink, mut mailbox) = template_channel();
        evaluator.set_template(&gcmd, sink).unwrap();
        assert_eq!(mailbox.take().as_deref(), Some(""));

        evaluator.set_variable("level", "0.75");
        assert_eq!(mailbox.take().as_deref(), Some("0.75"));

        drop(mailbox);
        evaluator.set_variable("level", "0.5");
        assert_eq!(evaluator.subscription_count(), 0);
    }

    #[test]
    fn test_missing_template_parameter() {
        let mut evaluator = LiteralTemplateEvaluator::new();
        let gcmd = GCodeCommand::parse("SET_VIRTUAL_PIN PIN=fan").unwrap();
        let (sink, _mailbox) = template_channel();
        assert!(matches!(evaluator.set_template(&gcmd, sink), Err(GCodeError::Usage(_))));
    }
}
