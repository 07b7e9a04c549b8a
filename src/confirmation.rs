// Confirmation service
//
// A single-slot request/response channel between the code that wants a
// decision ("save or discard your changes?") and whatever renders the
// dialog. The caller awaits `open`; the responder picks the request up with
// `wait_for_request` and answers with `respond` or `cancel`.
//
// There is no queue. A second `open` while a request is pending replaces it,
// and the replaced caller settles as Cancelled.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

// ============================================================================
// TYPES
// ============================================================================

/// Which dialog the service drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmVariant {
    /// Save / discard, with an optional cascade checkbox
    Save,
    /// Keep / discard a single form edit. Never offers cascade.
    Discard,
}

/// What the user chose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Save,
    SaveCascade,
    Discard,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Save => "save",
            Decision::SaveCascade => "saveCascade",
            Decision::Discard => "discard",
        }
    }

    pub fn is_save(&self) -> bool {
        matches!(self, Decision::Save | Decision::SaveCascade)
    }
}

/// What the dialog says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// "You have unsaved changes"
    Generic,
    /// "These records have changed", with display names
    Associated(Vec<String>),
}

impl ConfirmPrompt {
    /// An empty list falls back to the generic prompt
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            ConfirmPrompt::Generic
        } else {
            ConfirmPrompt::Associated(names)
        }
    }

    pub fn message(&self, variant: ConfirmVariant) -> String {
        let question = match variant {
            ConfirmVariant::Save => "Do you want to save them?",
            ConfirmVariant::Discard => "Do you want to keep them?",
        };
        match self {
            ConfirmPrompt::Generic => format!("You have unsaved changes. {}", question),
            ConfirmPrompt::Associated(names) => {
                format!("The following records have unsaved changes: {}. {}", names.join(", "), question)
            }
        }
    }
}

/// A request as seen by the responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub variant: ConfirmVariant,
    pub prompt: ConfirmPrompt,
    /// Show the "apply to child properties" checkbox
    pub cascade_offered: bool,
}

/// The responder's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Save { cascade: bool },
    Discard,
}

/// The dialog was dismissed, or replaced by a newer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("confirmation cancelled")]
pub struct Cancelled;

struct Pending {
    request: ConfirmationRequest,
    reply: oneshot::Sender<Decision>,
}

struct Inner {
    variant: ConfirmVariant,
    slot: Mutex<Option<Pending>>,
    wake: Notify,
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Clone)]
pub struct ConfirmationService {
    inner: Arc<Inner>,
}

impl ConfirmationService {
    pub fn new(variant: ConfirmVariant) -> Self {
        ConfirmationService {
            inner: Arc::new(Inner {
                variant,
                slot: Mutex::new(None),
                wake: Notify::new(),
            }),
        }
    }

    pub fn variant(&self) -> ConfirmVariant {
        self.inner.variant
    }

    /// Ask the user. Resolves exactly once: with a decision, or Cancelled.
    pub async fn open(&self, prompt: ConfirmPrompt, cascade_offered: bool) -> Result<Decision, Cancelled> {
        let prompt = match prompt {
            ConfirmPrompt::Associated(names) => ConfirmPrompt::from_names(names),
            generic => generic,
        };
        let request = ConfirmationRequest {
            id: Uuid::new_v4(),
            variant: self.inner.variant,
            prompt,
            cascade_offered: cascade_offered && self.inner.variant == ConfirmVariant::Save,
        };
        let (reply, decision) = oneshot::channel();

        tracing::debug!(request = %request.id, variant = ?request.variant, "Confirmation opened");
        let replaced = self.inner.slot.lock().replace(Pending { request, reply });
        if let Some(old) = replaced {
            // Dropping the sender settles the old caller as Cancelled
            tracing::warn!(request = %old.request.id, "Pending confirmation replaced by a newer one");
        }
        self.inner.wake.notify_one();

        decision.await.map_err(|_| Cancelled)
    }

    /// The request awaiting an answer, if its caller is still listening
    pub fn current_request(&self) -> Option<ConfirmationRequest> {
        let mut slot = self.inner.slot.lock();
        if slot.as_ref().is_some_and(|p| p.reply.is_closed()) {
            *slot = None;
        }
        slot.as_ref().map(|p| p.request.clone())
    }

    pub fn is_open(&self) -> bool {
        self.current_request().is_some()
    }

    /// Wait until a request is pending
    pub async fn wait_for_request(&self) -> ConfirmationRequest {
        loop {
            let notified = self.inner.wake.notified();
            if let Some(request) = self.current_request() {
                return request;
            }
            notified.await;
        }
    }

    /// Answer the pending request. Returns false when nothing was pending or
    /// its caller had gone away.
    pub fn respond(&self, choice: Choice) -> bool {
        let pending = match self.inner.slot.lock().take() {
            Some(pending) => pending,
            None => return false,
        };

        let decision = match choice {
            Choice::Save { cascade: true } if pending.request.cascade_offered => Decision::SaveCascade,
            Choice::Save { .. } => Decision::Save,
            Choice::Discard => Decision::Discard,
        };
        tracing::debug!(request = %pending.request.id, decision = decision.as_str(), "Confirmation answered");
        pending.reply.send(decision).is_ok()
    }

    /// Dismiss the pending request; its caller settles as Cancelled
    pub fn cancel(&self) -> bool {
        match self.inner.slot.lock().take() {
            Some(pending) => {
                tracing::debug!(request = %pending.request.id, "Confirmation cancelled");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn answer(service: ConfirmationService, prompt: ConfirmPrompt, cascade: bool, choice: Choice) -> Result<Decision, Cancelled> {
        let caller = service.clone();
        let handle = tokio::spawn(async move { caller.open(prompt, cascade).await });
        service.wait_for_request().await;
        assert!(service.respond(choice));
        handle.await.unwrap()
    }

    #[tokio::test]
    async fn test_save_variant_tokens() {
        let save = ConfirmationService::new(ConfirmVariant::Save);

        let plain = answer(save.clone(), ConfirmPrompt::Generic, false, Choice::Save { cascade: false }).await;
        assert_eq!(plain, Ok(Decision::Save));

        let cascade = answer(save.clone(), ConfirmPrompt::Generic, true, Choice::Save { cascade: true }).await;
        assert_eq!(cascade, Ok(Decision::SaveCascade));

        // Checkbox ticked but never offered
        let unoffered = answer(save.clone(), ConfirmPrompt::Generic, false, Choice::Save { cascade: true }).await;
        assert_eq!(unoffered, Ok(Decision::Save));

        let discard = answer(save, ConfirmPrompt::Generic, true, Choice::Discard).await;
        assert_eq!(discard, Ok(Decision::Discard));
    }

    #[tokio::test]
    async fn test_discard_variant_never_cascades() {
        let keep = ConfirmationService::new(ConfirmVariant::Discard);

        let caller = keep.clone();
        let handle = tokio::spawn(async move { caller.open(ConfirmPrompt::Generic, true).await });
        let request = keep.wait_for_request().await;
        assert!(!request.cascade_offered);
        assert!(keep.respond(Choice::Save { cascade: true }));
        assert_eq!(handle.await.unwrap(), Ok(Decision::Save));

        let discard = answer(keep, ConfirmPrompt::Generic, false, Choice::Discard).await;
        assert_eq!(discard, Ok(Decision::Discard));
    }

    #[tokio::test]
    async fn test_cancel_rejects() {
        let service = ConfirmationService::new(ConfirmVariant::Save);
        let caller = service.clone();
        let handle = tokio::spawn(async move { caller.open(ConfirmPrompt::Generic, false).await });

        service.wait_for_request().await;
        assert!(service.cancel());
        assert_eq!(handle.await.unwrap(), Err(Cancelled));
        assert!(!service.is_open());
    }

    #[tokio::test]
    async fn test_settles_once() {
        let service = ConfirmationService::new(ConfirmVariant::Save);
        let caller = service.clone();
        let handle = tokio::spawn(async move { caller.open(ConfirmPrompt::Generic, false).await });

        service.wait_for_request().await;
        assert!(service.respond(Choice::Discard));
        assert!(!service.respond(Choice::Save { cascade: false }));
        assert!(!service.cancel());
        assert_eq!(handle.await.unwrap(), Ok(Decision::Discard));
    }

    #[tokio::test]
    async fn test_second_open_cancels_first() {
        let service = ConfirmationService::new(ConfirmVariant::Save);

        let caller = service.clone();
        let first = tokio::spawn(async move { caller.open(ConfirmPrompt::Generic, false).await });
        let first_request = service.wait_for_request().await;

        let caller = service.clone();
        let names = vec!["descriptor".to_string()];
        let second = tokio::spawn(async move { caller.open(ConfirmPrompt::Associated(names), false).await });

        let second_request = loop {
            let request = service.wait_for_request().await;
            if request.id != first_request.id {
                break request;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(second_request.prompt, ConfirmPrompt::Associated(vec!["descriptor".to_string()]));
        assert_eq!(first.await.unwrap(), Err(Cancelled));

        assert!(service.respond(Choice::Save { cascade: false }));
        assert_eq!(second.await.unwrap(), Ok(Decision::Save));
    }

    #[tokio::test]
    async fn test_empty_association_is_generic() {
        let service = ConfirmationService::new(ConfirmVariant::Save);
        let caller = service.clone();
        let handle = tokio::spawn(async move { caller.open(ConfirmPrompt::Associated(Vec::new()), false).await });

        let request = service.wait_for_request().await;
        assert_eq!(request.prompt, ConfirmPrompt::Generic);
        service.cancel();
        assert_eq!(handle.await.unwrap(), Err(Cancelled));
    }

    #[test]
    fn test_prompt_messages() {
        let names = ConfirmPrompt::from_names(vec!["descriptor".to_string(), "ESU".to_string()]);
        assert_eq!(
            names.message(ConfirmVariant::Save),
            "The following records have unsaved changes: descriptor, ESU. Do you want to save them?"
        );
        assert_eq!(
            ConfirmPrompt::Generic.message(ConfirmVariant::Discard),
            "You have unsaved changes. Do you want to keep them?"
        );
    }
}
