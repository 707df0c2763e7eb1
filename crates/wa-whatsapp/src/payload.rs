//! WhatsApp Business webhook payload

use serde::Deserialize;

use wa_core::InboundMessage;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

impl WebhookPayload {
    /// Text messages in delivery order; status updates and media are skipped
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        let mut inbound = Vec::new();

        for change in self.entry.iter().flat_map(|e| &e.changes) {
            if change.field != "messages" {
                continue;
            }

            for message in &change.value.messages {
                let Some(text) = &message.text else {
                    continue;
                };
                if text.body.trim().is_empty() {
                    continue;
                }

                let display_name = change
                    .value
                    .contacts
                    .iter()
                    .find(|c| c.wa_id == message.from)
                    .and_then(|c| c.profile.as_ref())
                    .and_then(|p| p.name.clone());

                inbound.push(InboundMessage {
                    user_id: message.from.clone(),
                    text: text.body.clone(),
                    display_name,
                });
            }
        }

        inbound
    }
}
