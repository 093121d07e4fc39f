use std::time::Duration;

use tracing::debug;

use crate::infrastructure::browser::AutomationContext;

const ALERT_ROLE_SELECTOR: &str = r#"[role="alert"]"#;

const ALERT_POLL: Duration = Duration::from_millis(100);

/// Messages the site surfaces when the action was already done for
/// this account, including localized variants seen in the wild.
const SUCCESS_PHRASES: &[&str] = &[
    "already followed",
    "already",
    "suivi",
    "followed",
    "已跟",
    "跟单",
    "已关注",
    "已跟随",
    "跟随",
];

/// Messages that reject the submitted identifier outright.
const FAILURE_PHRASES: &[&str] = &[
    "invalid",
    "not found",
    "error",
    "incorrect",
    "not exist",
    "invalide",
    "non trouvé",
    "erreur",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertClass {
    /// The action was already completed earlier; counts as success.
    SuccessInformational,
    /// The identifier itself is rejected; retrying cannot help.
    DefinitiveFailure,
    /// Unrecognized wording; failure with the raw text preserved.
    GenericFailure,
}

/// Classifies a free-text site message. Success phrases win over
/// failure phrases; anything unmatched is a generic failure.
pub fn classify(message: &str) -> AlertClass {
    let lowered = message.to_lowercase();
    if SUCCESS_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return AlertClass::SuccessInformational;
    }
    if FAILURE_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return AlertClass::DefinitiveFailure;
    }
    AlertClass::GenericFailure
}

/// Waits up to `window` for the first message from any alert source:
/// a page dialog, an element with the alert role, or the site's fixed
/// error locator, checked in that priority order each poll cycle.
/// `None` means the window elapsed quietly.
pub async fn first_alert(
    ctx: &dyn AutomationContext,
    error_selector: &str,
    window: Duration,
) -> Option<String> {
    let deadline = tokio::time::Instant::now() + window;
    tokio::time::timeout_at(deadline, async {
        loop {
            match ctx.next_dialog_message(ALERT_POLL).await {
                Ok(Some(message)) => return message,
                Ok(None) => {}
                Err(e) => debug!("dialog wait failed: {}", e),
            }
            for selector in [ALERT_ROLE_SELECTOR, error_selector] {
                match ctx.visible_text(selector).await {
                    Ok(Some(text)) => return text,
                    Ok(None) => {}
                    Err(e) => debug!("alert text read failed for {}: {}", selector, e),
                }
            }
        }
    })
    .await
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_followed_is_informational_success() {
        assert_eq!(
            classify("Already followed the order"),
            AlertClass::SuccessInformational
        );
    }

    #[test]
    fn test_localized_variants_are_informational_success() {
        assert_eq!(classify("已跟单"), AlertClass::SuccessInformational);
        assert_eq!(classify("Déjà suivi"), AlertClass::SuccessInformational);
    }

    #[test]
    fn test_invalid_parameter_is_definitive_failure() {
        assert_eq!(
            classify("Invalid parameter xyz"),
            AlertClass::DefinitiveFailure
        );
        assert_eq!(classify("Order not found"), AlertClass::DefinitiveFailure);
    }

    #[test]
    fn test_success_wins_over_failure_phrases() {
        // Both families match; the idempotent reading wins.
        assert_eq!(
            classify("Already followed, duplicate entry error"),
            AlertClass::SuccessInformational
        );
    }

    #[test]
    fn test_unknown_wording_is_generic_failure() {
        assert_eq!(
            classify("Quelque chose d'inattendu"),
            AlertClass::GenericFailure
        );
        assert_eq!(classify(""), AlertClass::GenericFailure);
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert_eq!(
            classify("ALREADY FOLLOWED THE ORDER"),
            AlertClass::SuccessInformational
        );
        assert_eq!(classify("INVALID PARAMETER"), AlertClass::DefinitiveFailure);
    }

    #[tokio::test]
    async fn test_first_alert_skips_hidden_and_empty_nodes() {
        use crate::infrastructure::browser::{AutomationSurface, ContextOptions, MockSurface};

        let surface = MockSurface::new();
        surface.add_text_node(ALERT_ROLE_SELECTOR, false, "stale toast");
        surface.add_text_node(ALERT_ROLE_SELECTOR, true, "   ");
        surface.add_text_node(ALERT_ROLE_SELECTOR, true, "Invalid parameter xyz");
        let ctx = surface
            .open_context(ContextOptions::default())
            .await
            .unwrap();

        let message = first_alert(ctx.as_ref(), "div.error", Duration::from_millis(300)).await;

        assert_eq!(message.as_deref(), Some("Invalid parameter xyz"));
    }
}
