// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Do-not-contact enforcement.
//!
//! [`classify_keyword`] decides whether an inbound text carries a clear
//! opt-out or opt-in intent; [`ComplianceGate`] applies the resulting
//! transition to the stored [`ContactComplianceFlag`] and sends the single
//! confirmation message the transition requires.
//!
//! [`ContactComplianceFlag`]: courier_core::types::ContactComplianceFlag

use std::sync::Arc;
use std::time::Duration;

use courier_config::model::ComplianceConfig;
use courier_core::types::{
    Alert, AlertKind, KeywordIntent, NewRetryEntry, OptOutResult, OutboundMessage, RetryItemType,
};
use courier_core::{format_ts, AlertSink, Clock, CourierError, MessagingProvider, StorageAdapter};
use tracing::{debug, error, info, warn};

use crate::identity::contact_key;
use crate::retry::RetryScheduler;
use crate::send::send_with_timeout;

const OPT_OUT_KEYWORDS: &[&str] = &["stop", "stopall", "unsubscribe", "cancel", "end", "quit"];
const OPT_IN_KEYWORDS: &[&str] = &["start", "unstop"];

/// Words that may accompany a keyword without diluting its intent.
const FILLER_WORDS: &[&str] = &[
    "please", "pls", "plz", "now", "all", "me", "texting", "text", "texts", "messaging",
    "messages", "message", "msgs", "sending", "thanks", "thank", "you", "it", "this", "ok",
];

/// Longest message that can still be read as a bare keyword reply.
const MAX_KEYWORD_WORDS: usize = 5;

/// A keyword match with the word that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub intent: KeywordIntent,
    pub keyword: String,
}

/// Reads the compliance intent of an inbound text, if it has a clear one.
///
/// Matches when the message is a keyword alone, or a short message whose
/// other words are all filler. Keywords inside ordinary sentences and
/// messages mixing both intents never match.
pub fn classify_keyword(body: &str) -> Option<KeywordMatch> {
    let words: Vec<String> = body
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() || words.len() > MAX_KEYWORD_WORDS {
        return None;
    }

    let mut opt_out = None;
    let mut opt_in = None;
    for word in &words {
        if OPT_OUT_KEYWORDS.contains(&word.as_str()) {
            opt_out.get_or_insert_with(|| word.clone());
        } else if OPT_IN_KEYWORDS.contains(&word.as_str()) {
            opt_in.get_or_insert_with(|| word.clone());
        } else if !FILLER_WORDS.contains(&word.as_str()) {
            return None;
        }
    }

    match (opt_out, opt_in) {
        (Some(keyword), None) => Some(KeywordMatch {
            intent: KeywordIntent::OptOut,
            keyword,
        }),
        (None, Some(keyword)) => Some(KeywordMatch {
            intent: KeywordIntent::OptIn,
            keyword,
        }),
        _ => None,
    }
}

/// A confirmation message and the retry entry that backs it until sent.
struct PendingConfirmation {
    message: OutboundMessage,
    entry: NewRetryEntry,
}

/// Typed opt-out/consent flags per contact, read straight from the store.
///
/// Every contact is keyed by [`contact_key`], so a flag set from one
/// formatting of a number applies to every other formatting of it.
pub struct ComplianceGate {
    store: Arc<dyn StorageAdapter>,
    provider: Arc<dyn MessagingProvider>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    retries: RetryScheduler,
    config: ComplianceConfig,
    from_number: Option<String>,
    send_timeout: Duration,
}

impl ComplianceGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        provider: Arc<dyn MessagingProvider>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        retries: RetryScheduler,
        config: ComplianceConfig,
        from_number: Option<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            alerts,
            retries,
            config,
            from_number,
            send_timeout,
        }
    }

    /// Whether `contact` currently has an active opt-out.
    pub async fn check_opt_out(&self, contact: &str) -> Result<bool, CourierError> {
        let contact = contact_key(contact);
        Ok(self.store.get_active_opt_out(&contact).await?.is_some())
    }

    /// Applies the keyword intent of an inbound text, sending a confirmation
    /// on every actual transition.
    ///
    /// The confirmation's retry entry is committed together with the flag
    /// change, so a crash or failed send after the transition still leaves
    /// the confirmation queued.
    pub async fn process_inbound_text(
        &self,
        contact: &str,
        body: &str,
    ) -> Result<OptOutResult, CourierError> {
        let Some(matched) = classify_keyword(body) else {
            return Ok(OptOutResult::NoMatch);
        };
        let contact = contact_key(contact);
        debug!(contact, keyword = %matched.keyword, intent = %matched.intent, "compliance keyword matched");

        let body = match matched.intent {
            KeywordIntent::OptOut => self.config.opt_out_confirmation.clone(),
            KeywordIntent::OptIn => self.config.opt_in_confirmation.clone(),
        };
        let confirmation = self.confirmation(&contact, matched.intent, body)?;
        let follow_up = confirmation.as_ref().map(|c| &c.entry);

        let result = match matched.intent {
            KeywordIntent::OptOut => {
                let reason = format!("keyword:{}", matched.keyword);
                self.apply_opt_out(&contact, &reason, follow_up).await?
            }
            KeywordIntent::OptIn => self.apply_opt_in(&contact, follow_up).await?,
        };

        if matches!(result, OptOutResult::OptedOut | OptOutResult::OptedIn) {
            match confirmation {
                Some(confirmation) => self.send_confirmation(&contact, confirmation).await?,
                None => {
                    warn!(contact, "provider.from_number is not set, compliance confirmation not sent")
                }
            }
        }
        Ok(result)
    }

    /// Administrative opt-out. No confirmation is sent.
    pub async fn opt_out(&self, contact: &str, reason: &str) -> Result<OptOutResult, CourierError> {
        self.apply_opt_out(&contact_key(contact), reason, None).await
    }

    /// Administrative opt-in. No confirmation is sent.
    pub async fn opt_in(&self, contact: &str) -> Result<OptOutResult, CourierError> {
        self.apply_opt_in(&contact_key(contact), None).await
    }

    async fn apply_opt_out(
        &self,
        contact: &str,
        reason: &str,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<OptOutResult, CourierError> {
        let now = self.clock.now();
        if !self.store.insert_opt_out(contact, reason, now, follow_up).await? {
            return Ok(OptOutResult::Unchanged(KeywordIntent::OptOut));
        }
        let skipped = self.store.skip_pending_members_for_contact(contact).await?;
        courier_prometheus::record_compliance_transition("opt_out");
        info!(contact, reason, skipped_members = skipped, "contact opted out");
        Ok(OptOutResult::OptedOut)
    }

    async fn apply_opt_in(
        &self,
        contact: &str,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<OptOutResult, CourierError> {
        let now = self.clock.now();
        if !self.store.expire_opt_out(contact, now, follow_up).await? {
            return Ok(OptOutResult::Unchanged(KeywordIntent::OptIn));
        }
        courier_prometheus::record_compliance_transition("opt_in");
        info!(contact, "contact opted back in");
        Ok(OptOutResult::OptedIn)
    }

    /// The confirmation for a transition, or `None` without a sender number.
    fn confirmation(
        &self,
        contact: &str,
        intent: KeywordIntent,
        body: String,
    ) -> Result<Option<PendingConfirmation>, CourierError> {
        let Some(from) = self.from_number.clone() else {
            return Ok(None);
        };
        let message = OutboundMessage {
            from,
            to: contact.to_string(),
            body,
            media_urls: vec![],
        };
        let payload = serde_json::to_string(&message)
            .map_err(|e| CourierError::Internal(format!("failed to encode confirmation: {e}")))?;
        let item_ref = format!("{contact}:{intent}:{}", format_ts(self.clock.now()));
        let entry = self.retries.entry(
            RetryItemType::ConfirmationSend,
            &item_ref,
            Some(payload),
            None,
            "awaiting first send",
        );
        Ok(Some(PendingConfirmation { message, entry }))
    }

    /// Sends a confirmation whose retry entry is already open. Success closes
    /// the entry; a transient failure leaves it for the retry queue; a
    /// permanent one dead-letters it.
    async fn send_confirmation(
        &self,
        contact: &str,
        confirmation: PendingConfirmation,
    ) -> Result<(), CourierError> {
        let PendingConfirmation { message, entry } = confirmation;
        let open = self
            .store
            .find_open_retry(RetryItemType::ConfirmationSend, &entry.item_ref)
            .await?;

        match send_with_timeout(self.provider.as_ref(), &message, self.send_timeout).await {
            Ok(receipt) => {
                if let Some(open) = open {
                    self.store.delete_retry(open.id).await?;
                }
                courier_prometheus::record_send("confirmation", "sent");
                debug!(contact, external_id = %receipt.external_id, "confirmation sent");
                Ok(())
            }
            Err(e) if e.is_transient() => {
                courier_prometheus::record_send("confirmation", "deferred");
                let id = self
                    .retries
                    .enqueue(
                        RetryItemType::ConfirmationSend,
                        &entry.item_ref,
                        entry.payload.clone(),
                        None,
                        &e.to_string(),
                    )
                    .await?;
                warn!(contact, retry_id = id, error = %e, "confirmation send failed, queued for retry");
                Ok(())
            }
            Err(e) => {
                courier_prometheus::record_send("confirmation", "failed");
                let reason = e.to_string();
                let id = match open {
                    Some(open) => open.id,
                    None => self.store.upsert_retry(&entry).await?,
                };
                let now = self.clock.now();
                self.store.dead_letter_retry(id, 1, &reason, now).await?;
                courier_prometheus::record_retry(&RetryItemType::ConfirmationSend.to_string(), "dead_lettered");
                error!(contact, retry_id = id, error = %reason, "confirmation rejected by provider, dead-lettered");

                let alert = Alert {
                    kind: AlertKind::DeadLetter,
                    subject: format!("{} {} dead-lettered", RetryItemType::ConfirmationSend, entry.item_ref),
                    detail: format!("rejected by provider: {reason}"),
                    raised_at: now,
                };
                if let Err(e) = self.alerts.send_alert(&alert).await {
                    error!(retry_id = id, error = %e, "failed to deliver dead-letter alert");
                }
                Ok(())
            }
        }
    }

    /// Re-sends a queued confirmation.
    pub async fn resend_confirmation(&self, payload: &str) -> Result<(), CourierError> {
        let message: OutboundMessage = serde_json::from_str(payload)
            .map_err(|e| CourierError::Permanent(format!("invalid confirmation payload: {e}")))?;
        send_with_timeout(self.provider.as_ref(), &message, self.send_timeout).await?;
        courier_prometheus::record_send("confirmation", "sent");
        Ok(())
    }
}
