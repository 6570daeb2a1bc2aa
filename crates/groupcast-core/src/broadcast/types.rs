use std::{fmt, time::Duration};

use crate::{broadcast::port::DeliveryError, domain::ChatId};

/// Queue-assigned identity of a submitted task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One message bound for one destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryTask {
    pub destination: ChatId,
    pub payload: String,
}

impl DeliveryTask {
    pub fn new(destination: ChatId, payload: impl Into<String>) -> Self {
        Self {
            destination,
            payload: payload.into(),
        }
    }
}

/// Terminal result of delivering a task, retries included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub destination: ChatId,
    pub success: bool,
    pub error_code: Option<i32>,
    pub error_description: Option<String>,
    /// How many times the delivery client was invoked.
    pub attempts: u32,
}

impl DeliveryOutcome {
    pub fn delivered(destination: ChatId, attempts: u32) -> Self {
        Self {
            destination,
            success: true,
            error_code: None,
            error_description: None,
            attempts,
        }
    }

    pub fn failed(destination: ChatId, err: DeliveryError, attempts: u32) -> Self {
        Self {
            destination,
            success: false,
            error_code: err.code,
            error_description: Some(err.description),
            attempts,
        }
    }

    /// Human-readable failure reason for reports.
    pub fn reason(&self) -> String {
        match (&self.error_description, self.error_code) {
            (Some(desc), _) if !desc.trim().is_empty() => desc.clone(),
            (_, Some(code)) => format!("error code {code}"),
            _ => "unknown error".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedDestination {
    pub destination: ChatId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Every destination reached a terminal outcome.
    Completed,
    /// The cool-down window has not elapsed yet.
    Blocked { retry_after: Duration },
    /// The store returned no eligible destinations.
    NoDestinations,
}

/// Aggregated result of one broadcast campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignReport {
    pub status: CampaignStatus,
    pub total_destinations: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDestination>,
}

impl CampaignReport {
    pub fn blocked(retry_after: Duration) -> Self {
        Self {
            status: CampaignStatus::Blocked { retry_after },
            total_destinations: 0,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    pub fn no_destinations() -> Self {
        Self {
            status: CampaignStatus::NoDestinations,
            total_destinations: 0,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    pub(crate) fn collecting(total_destinations: usize) -> Self {
        Self {
            status: CampaignStatus::Completed,
            total_destinations,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: &DeliveryOutcome) {
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed.push(FailedDestination {
                destination: outcome.destination,
                reason: outcome.reason(),
            });
        }
    }

    /// Number of destinations with a terminal outcome so far.
    pub fn settled(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.settled() == self.total_destinations
    }

    /// Plain-text summary shown to the operator.
    pub fn render(&self) -> String {
        match &self.status {
            CampaignStatus::Blocked { retry_after } => format!(
                "Broadcast message blocked: Message frequency limit exceeded. Try again later.\n\
                 Next broadcast possible in {}.",
                format_wait(*retry_after)
            ),
            CampaignStatus::NoDestinations => {
                "No groups found where the bot is an admin.".to_string()
            }
            CampaignStatus::Completed if self.failed.is_empty() => format!(
                "Broadcast successfully sent to all {} groups.",
                self.succeeded
            ),
            CampaignStatus::Completed => {
                let lines = self
                    .failed
                    .iter()
                    .map(|f| format!("Group {}: {}", f.destination, f.reason))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "Broadcast completed.\nSuccessful: {}\nFailed: {}\n\nFailed groups:\n{lines}",
                    self.succeeded,
                    self.failed.len()
                )
            }
        }
    }
}

fn format_wait(d: Duration) -> String {
    // Round up so "0s" is never shown while still blocked.
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    let mins = secs / 60;
    let secs = secs % 60;
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_all_succeeded() {
        let mut report = CampaignReport::collecting(2);
        report.record(&DeliveryOutcome::delivered(ChatId(-1), 1));
        report.record(&DeliveryOutcome::delivered(ChatId(-2), 1));
        assert!(report.is_complete());
        assert_eq!(
            report.render(),
            "Broadcast successfully sent to all 2 groups."
        );
    }

    #[test]
    fn render_lists_failed_groups_with_reason() {
        let mut report = CampaignReport::collecting(2);
        report.record(&DeliveryOutcome::delivered(ChatId(-1), 1));
        report.record(&DeliveryOutcome::failed(
            ChatId(-100),
            DeliveryError::new(Some(403), "Forbidden: bot was kicked"),
            1,
        ));

        let text = report.render();
        assert!(text.starts_with("Broadcast completed.\nSuccessful: 1\nFailed: 1"));
        assert!(text.ends_with("Failed groups:\nGroup -100: Forbidden: bot was kicked"));
    }

    #[test]
    fn reason_falls_back_to_code() {
        let outcome = DeliveryOutcome::failed(ChatId(5), DeliveryError::new(Some(400), " "), 1);
        assert_eq!(outcome.reason(), "error code 400");
    }

    #[test]
    fn blocked_report_mentions_remaining_time() {
        let report = CampaignReport::blocked(Duration::from_millis(290_500));
        let text = report.render();
        assert!(text.contains("frequency limit exceeded"));
        assert!(text.contains("4m 51s"), "{text}");
        assert_eq!(report.total_destinations, 0);
    }

    #[test]
    fn empty_report_is_explicit() {
        let report = CampaignReport::no_destinations();
        assert_eq!(report.total_destinations, 0);
        assert!(report.is_complete());
        assert_eq!(
            report.render(),
            "No groups found where the bot is an admin."
        );
    }
}
