use async_trait::async_trait;

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

/// Default transport: log the message. Real delivery (WhatsApp, push) is an
/// external collaborator; only the trigger and content contract live here.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(%phone, %message, "outbound notification");
        Ok(())
    }
}

/// Strip whitespace and leading zeros, then ensure an international prefix.
/// Numbers without one get `country_code` prepended.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = compact.trim_start_matches('0');
    if trimmed.starts_with('+') {
        return trimmed.to_string();
    }
    if trimmed.starts_with(country_code) {
        return format!("+{trimmed}");
    }
    format!("+{country_code}{trimmed}")
}

// ── Message content contract ─────────────────────────────────────

pub fn confirmation_message(
    client_name: &str,
    service_name: &str,
    date: &str,
    time: &str,
    shop_name: &str,
) -> String {
    format!(
        "Appointment confirmed\n\nHi {client_name}, you're booked:\n\nService: {service_name}\nDate: {date}\nTime: {time}\n{shop_name}\n\nSee you there!"
    )
}

/// Sent to the barber when a client books.
pub fn barber_alert_message(client_name: &str, service_name: &str, date: &str, time: &str) -> String {
    format!(
        "New appointment\n\nClient: {client_name}\nService: {service_name}\nDate: {date}\nTime: {time}"
    )
}

/// Sent to the barber when an appointment is cancelled.
pub fn cancellation_alert_message(
    client_name: &str,
    service_name: &str,
    date: &str,
    time: &str,
) -> String {
    format!(
        "Appointment cancelled\n\nClient: {client_name}\nService: {service_name}\nDate: {date}\nTime: {time}\n\nThe slot is open again."
    )
}

/// Sent to waiting clients under the notify-only cancellation policy.
pub fn slot_freed_message(client_name: &str, date: &str, shop_name: &str) -> String {
    format!(
        "A slot just opened up\n\nHi {client_name}, a booking for {date} was cancelled at {shop_name}. Book now before it's gone!"
    )
}

/// Sent to a waitlisted client who was auto-booked into a freed slot.
pub fn promotion_message(
    client_name: &str,
    service_name: &str,
    date: &str,
    time: &str,
    shop_name: &str,
) -> String {
    format!(
        "Good news, {client_name}!\n\nA slot freed up and we booked you automatically:\n\nService: {service_name}\nDate: {date}\nTime: {time}\n{shop_name}\n\nSee you there!"
    )
}
