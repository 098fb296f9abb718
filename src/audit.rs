use std::fmt;
use std::sync::Mutex;

/// Terminal branch taken by the gate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Credential valid, request forwarded.
    Proxy,
    /// No submission; fresh challenge page.
    Challenge,
    /// Solution verified, cookie issued.
    Accepted,
    /// Solution wrong or stale.
    Wrong,
    /// Form could not be parsed.
    Malformed,
    /// Submission field present with zero or several values.
    FormValues,
    /// Submission longer than the base64 bound.
    TooLong,
    /// Submission is not valid base64.
    Base64,
}

impl Outcome {
    pub const fn tag(self) -> &'static str {
        match self {
            Outcome::Proxy => "PROXY",
            Outcome::Challenge => "CHALLENGE",
            Outcome::Accepted => "ACCEPTED",
            Outcome::Wrong => "WRONG",
            Outcome::Malformed => "MALFORMED",
            Outcome::FormValues => "FORM_VALUES",
            Outcome::TooLong => "TOO_LONG",
            Outcome::Base64 => "BASE64",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One audit record per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub outcome: Outcome,
    pub client: String,
    pub target: String,
    pub user_agent: String,
}

/// Destination for audit events.
///
/// Sinks must not fail or block the caller: the response is the same
/// whether or not the event made it anywhere.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits each event as a `tracing` record on the `powgate::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "powgate::audit",
            outcome = %event.outcome,
            client = %event.client,
            request = %event.target,
            user_agent = %event.user_agent,
            "request"
        );
    }
}

/// Keeps events in memory. Intended for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.events().into_iter().map(|e| e.outcome).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        // A poisoned lock drops the event rather than the request.
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: Outcome) -> AuditEvent {
        AuditEvent {
            outcome,
            client: "192.0.2.1".into(),
            target: "/index.html".into(),
            user_agent: "curl/8.5.0".into(),
        }
    }

    #[test]
    fn tags_are_stable() {
        assert_eq!(Outcome::Proxy.to_string(), "PROXY");
        assert_eq!(Outcome::FormValues.tag(), "FORM_VALUES");
        assert_eq!(Outcome::TooLong.tag(), "TOO_LONG");
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(event(Outcome::Challenge));
        sink.record(event(Outcome::Accepted));
        assert_eq!(sink.outcomes(), [Outcome::Challenge, Outcome::Accepted]);
        assert_eq!(sink.events()[0].target, "/index.html");
    }

    #[test]
    fn tracing_sink_without_subscriber_is_a_no_op() {
        TracingAuditSink.record(event(Outcome::Proxy));
    }
}
