use uuid::Uuid;

/// Payload handed to the notification dispatcher.
///
/// `data` rides along as opaque key/value context for the mobile clients
/// (deep links, booking ids), mirroring what push providers accept.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_booking(mut self, booking_id: Uuid) -> Self {
        self.data = serde_json::json!({ "booking_id": booking_id });
        self
    }
}
