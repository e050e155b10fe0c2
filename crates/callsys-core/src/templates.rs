//! Message templates rendered with `minijinja`.
//!
//! Every message kind has a built-in template; configuration may replace
//! any of them. Templates see the fields of [`MessageContext`].

use minijinja::Environment;
use serde::Serialize;

use crate::config::TemplateConfig;
use crate::notifier::NotifyError;

const APPROACH: &str = "[{{ line_name }}] {{ prefix }}{{ number }} is coming up: \
{{ ahead }} more to go (now serving {{ prefix }}{{ current }}). Please get ready.";
const ARRIVAL: &str =
    "[{{ line_name }}] It's your turn! Now serving {{ prefix }}{{ number }}.";
const SUBSCRIBED: &str = "[{{ line_name }}] You will be notified for {{ prefix }}{{ number }} \
(now serving {{ prefix }}{{ current }}, {{ ahead }} ahead of you).";
const CANCELLED: &str = "[{{ line_name }}] Notification for {{ prefix }}{{ number }} cancelled.";

/// The kinds of message sent to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The current number is getting close to the target.
    Approach,
    /// The target number is being served.
    Arrival,
    /// Confirmation of a new subscription.
    Subscribed,
    /// Confirmation of a cancelled subscription.
    Cancelled,
}

impl MessageKind {
    const ALL: [Self; 4] = [Self::Approach, Self::Arrival, Self::Subscribed, Self::Cancelled];

    const fn name(self) -> &'static str {
        match self {
            Self::Approach => "approach",
            Self::Arrival => "arrival",
            Self::Subscribed => "subscribed",
            Self::Cancelled => "cancelled",
        }
    }

    const fn builtin(self) -> &'static str {
        match self {
            Self::Approach => APPROACH,
            Self::Arrival => ARRIVAL,
            Self::Subscribed => SUBSCRIBED,
            Self::Cancelled => CANCELLED,
        }
    }

    fn configured(self, config: &TemplateConfig) -> Option<&String> {
        match self {
            Self::Approach => config.approach.as_ref(),
            Self::Arrival => config.arrival.as_ref(),
            Self::Subscribed => config.subscribed.as_ref(),
            Self::Cancelled => config.cancelled.as_ref(),
        }
    }
}

/// Values available to every template.
#[derive(Debug, Clone, Serialize)]
pub struct MessageContext {
    /// Display name of the line.
    pub line_name: String,
    /// Line prefix, printed before numbers.
    pub prefix: String,
    /// The subscriber's number.
    pub number: u64,
    /// Number currently being served.
    pub current: u64,
    /// How many numbers are still ahead.
    pub ahead: u64,
}

/// Compiled message templates.
pub struct MessageTemplates {
    env: Environment<'static>,
}

impl MessageTemplates {
    /// Compile the built-in templates with configured overrides applied.
    pub fn new(config: &TemplateConfig) -> Result<Self, NotifyError> {
        let mut env = Environment::new();
        for kind in MessageKind::ALL {
            let source = kind
                .configured(config)
                .cloned()
                .unwrap_or_else(|| kind.builtin().to_owned());
            env.add_template_owned(kind.name(), source).map_err(|e| {
                NotifyError::Template(format!("failed to add {} template: {e}", kind.name()))
            })?;
        }
        Ok(Self { env })
    }

    /// Render one message.
    pub fn render(&self, kind: MessageKind, ctx: &MessageContext) -> Result<String, NotifyError> {
        self.env
            .get_template(kind.name())
            .map_err(|e| NotifyError::Template(format!("missing {} template: {e}", kind.name())))?
            .render(ctx)
            .map_err(|e| NotifyError::Template(format!("{} render failed: {e}", kind.name())))
    }
}

impl std::fmt::Debug for MessageTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTemplates").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx() -> MessageContext {
        MessageContext {
            line_name: "General".to_owned(),
            prefix: "A".to_owned(),
            number: 12,
            current: 7,
            ahead: 5,
        }
    }

    #[test]
    fn builtin_templates_render() {
        let templates = MessageTemplates::new(&TemplateConfig::default()).unwrap();
        let text = templates.render(MessageKind::Arrival, &ctx()).unwrap();
        assert!(text.contains("A12"));
        let text = templates.render(MessageKind::Approach, &ctx()).unwrap();
        assert!(text.contains("5 more"));
    }

    #[test]
    fn configured_template_overrides_builtin() {
        let config = TemplateConfig {
            arrival: Some("Go to counter {{ line_name }} ({{ number }})".to_owned()),
            ..TemplateConfig::default()
        };
        let templates = MessageTemplates::new(&config).unwrap();
        assert_eq!(
            templates.render(MessageKind::Arrival, &ctx()).unwrap(),
            "Go to counter General (12)"
        );
    }

    #[test]
    fn broken_template_is_rejected_at_startup() {
        let config = TemplateConfig {
            cancelled: Some("{{ unclosed".to_owned()),
            ..TemplateConfig::default()
        };
        assert!(matches!(
            MessageTemplates::new(&config),
            Err(NotifyError::Template(_))
        ));
    }
}
