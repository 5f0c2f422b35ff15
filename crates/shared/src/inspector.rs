//! Wire types for the element inspector injected into the previewed page.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `source` tag carried by every message the injected script posts
pub const INSPECTOR_SOURCE: &str = "navi-inspector";

/// Commands posted into the preview frame. Serialized as bare `{ "type": ... }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectorCommand {
    Ping,
    EnableInspect,
    DisableInspect,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AncestorInfo {
    pub tag: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
}

/// Element picked by the user inside the preview
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementDescriptor {
    pub tag: String,
    pub selector: String,
    pub html: String,
    pub text: Option<String>,
    pub attributes: HashMap<String, String>,
    pub ancestors: Vec<AncestorInfo>,
    pub rect: ElementRect,
    pub styles: HashMap<String, String>,
    pub page_url: Option<String>,
    pub page_title: Option<String>,
}

/// A message posted by the injected script, after envelope checks
#[derive(Clone, Debug, PartialEq)]
pub enum InspectorMessage {
    Ready,
    Pong,
    ElementSelected(ElementDescriptor),
    InspectorDisabled,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    source: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl InspectorMessage {
    /// Decode a posted message. Anything without the inspector `source` tag,
    /// with an unknown `type`, or an `element_selected` without usable `data`
    /// yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let envelope = Envelope::deserialize(value).ok()?;
        if envelope.source.as_deref() != Some(INSPECTOR_SOURCE) {
            return None;
        }
        match envelope.kind.as_deref()? {
            "ready" => Some(InspectorMessage::Ready),
            "pong" => Some(InspectorMessage::Pong),
            "inspector_disabled" => Some(InspectorMessage::InspectorDisabled),
            "element_selected" => {
                let data = envelope.data.filter(|d| !d.is_null())?;
                match serde_json::from_value::<ElementDescriptor>(data) {
                    Ok(element) => Some(InspectorMessage::ElementSelected(element)),
                    Err(e) => {
                        tracing::warn!("ignoring malformed element_selected payload: {}", e);
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        assert_eq!(
            serde_json::to_value(InspectorCommand::Ping).unwrap(),
            json!({"type": "ping"})
        );
        assert_eq!(
            serde_json::to_value(InspectorCommand::EnableInspect).unwrap(),
            json!({"type": "enable_inspect"})
        );
        assert_eq!(
            serde_json::to_value(InspectorCommand::DisableInspect).unwrap(),
            json!({"type": "disable_inspect"})
        );
    }

    #[test]
    fn test_rejects_foreign_source() {
        assert_eq!(
            InspectorMessage::from_value(&json!({"source": "react-devtools", "type": "ready"})),
            None
        );
        assert_eq!(InspectorMessage::from_value(&json!({"type": "ready"})), None);
        assert_eq!(InspectorMessage::from_value(&json!("ready")), None);
    }

    #[test]
    fn test_parses_element_selected() {
        let msg = InspectorMessage::from_value(&json!({
            "source": INSPECTOR_SOURCE,
            "type": "element_selected",
            "data": {
                "tag": "button",
                "selector": "main > button.primary",
                "html": "<button class=\"primary\">Save</button>",
                "attributes": {"class": "primary"},
                "ancestors": [{"tag": "main"}],
                "rect": {"x": 10.0, "y": 20.0, "width": 80.0, "height": 32.0},
                "styles": {"color": "rgb(0, 0, 0)"},
                "pageUrl": "/api/preview/proxy/3000/",
                "pageTitle": "Demo"
            }
        }));
        match msg {
            Some(InspectorMessage::ElementSelected(el)) => {
                assert_eq!(el.tag, "button");
                assert_eq!(el.ancestors.len(), 1);
                assert_eq!(el.rect.width, 80.0);
                assert_eq!(el.page_title.as_deref(), Some("Demo"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_element_selected_requires_data() {
        assert_eq!(
            InspectorMessage::from_value(&json!({
                "source": INSPECTOR_SOURCE,
                "type": "element_selected"
            })),
            None
        );
    }
}
