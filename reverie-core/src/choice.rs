//! Choice events — the append-only history affinity state is derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::affinity::{AffinityDeltas, ChoiceType};
use crate::error::{ReverieError, Result};
use crate::types::{EventId, SessionId, UserId};

/// Raw choice as submitted by the chat controller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSubmission {
    /// Narrative identifier of the choice (matched by `specific_choices`).
    pub choice_id: String,
    /// `"demon"`, `"angel"` or `"neutral"`.
    pub choice_type: String,
    /// What the user chose, as displayed.
    pub content: String,
    /// Affinity changes this choice carries.
    #[serde(default)]
    pub deltas: AffinityDeltas,
    /// Caller-chosen key that becomes the event id. Resubmitting with the
    /// same key is applied once; without a key every submission is new.
    #[serde(default)]
    pub idempotency_key: Option<EventId>,
}

/// One recorded choice. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceEvent {
    /// Unique event identifier.
    pub event_id: EventId,
    /// Who made the choice.
    pub user_id: UserId,
    /// Session it was made in.
    pub session_id: SessionId,
    /// Narrative identifier of the choice.
    pub choice_id: String,
    /// Alignment of the choice.
    pub choice_type: ChoiceType,
    /// What the user chose, as displayed.
    pub content: String,
    /// Affinity changes applied.
    pub deltas: AffinityDeltas,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl ChoiceEvent {
    /// Validate a submission's shape and turn it into an event.
    ///
    /// Delta magnitudes are checked separately by the tracker.
    ///
    /// # Errors
    /// Returns `ReverieError::Validation` for an unknown choice type or a
    /// blank choice identifier.
    pub fn from_submission(
        user_id: UserId,
        session_id: SessionId,
        submission: ChoiceSubmission,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        let choice_type = submission.choice_type.parse::<ChoiceType>()?;
        let choice_id = submission.choice_id.trim().to_string();
        if choice_id.is_empty() {
            return Err(ReverieError::Validation(
                "choice_id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            event_id: submission.idempotency_key.unwrap_or_default(),
            user_id,
            session_id,
            choice_id,
            choice_type,
            content: submission.content,
            deltas: submission.deltas,
            occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(choice_type: &str, choice_id: &str) -> ChoiceSubmission {
        ChoiceSubmission {
            choice_id: choice_id.to_string(),
            choice_type: choice_type.to_string(),
            content: "Take the offered hand".to_string(),
            deltas: AffinityDeltas::default(),
            idempotency_key: None,
        }
    }

    #[test]
    fn valid_submission_becomes_event() {
        let event = ChoiceEvent::from_submission(
            UserId::new(),
            SessionId::new(),
            submission("demon", " accept_pact "),
            Utc::now(),
        )
        .expect("valid");
        assert_eq!(event.choice_type, ChoiceType::Demon);
        assert_eq!(event.choice_id, "accept_pact");
    }

    #[test]
    fn idempotency_key_becomes_event_id() {
        let key = EventId::new();
        let keyed = ChoiceSubmission {
            idempotency_key: Some(key),
            ..submission("angel", "shelter")
        };
        let first = ChoiceEvent::from_submission(UserId::new(), SessionId::new(), keyed.clone(), Utc::now())
            .expect("valid");
        let again = ChoiceEvent::from_submission(UserId::new(), SessionId::new(), keyed, Utc::now())
            .expect("valid");
        assert_eq!(first.event_id, key);
        assert_eq!(again.event_id, key);

        let unkeyed = ChoiceEvent::from_submission(UserId::new(), SessionId::new(), submission("angel", "shelter"), Utc::now())
            .expect("valid");
        assert_ne!(unkeyed.event_id, key);
    }

    #[test]
    fn bad_type_or_blank_id_rejected() {
        let user = UserId::new();
        let session = SessionId::new();
        assert!(matches!(
            ChoiceEvent::from_submission(user, session, submission("grey", "x"), Utc::now()),
            Err(ReverieError::Validation(_))
        ));
        assert!(matches!(
            ChoiceEvent::from_submission(user, session, submission("angel", "  "), Utc::now()),
            Err(ReverieError::Validation(_))
        ));
    }
}
