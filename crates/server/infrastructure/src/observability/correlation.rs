//! Correlation ids travel with outbox messages both as a column and as a
//! header, so publishers that only forward headers still carry them.

use esign_server_domain::outbox::{NewOutboxMessage, OutboxMessage};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Set the correlation id on both the message and its headers. Blank ids
/// are ignored.
pub fn propagate_correlation(message: NewOutboxMessage, correlation_id: &str) -> NewOutboxMessage {
    let correlation_id = correlation_id.trim();
    if correlation_id.is_empty() {
        return message;
    }
    message
        .with_correlation_id(correlation_id)
        .with_header(CORRELATION_ID_HEADER, correlation_id)
}

/// The stored correlation id, falling back to the header.
pub fn correlation_id_of(message: &OutboxMessage) -> Option<&str> {
    Some(message.correlation_id.as_str())
        .filter(|id| !id.is_empty())
        .or_else(|| {
            message
                .headers
                .get(CORRELATION_ID_HEADER)
                .map(String::as_str)
                .filter(|id| !id.is_empty())
        })
}
