/// Mention detection over message text
use crate::{
    error::SkeinResult,
    notifications::{CreateNotification, NotificationEngine, NotificationType},
};
use tracing::warn;

/// Extract `@handle` tokens from text: case-preserving, in order of first
/// appearance, de-duplicated case-insensitively. A handle consists of
/// ASCII alphanumerics, `_` and `.`; trailing dots are treated as sentence
/// punctuation rather than part of the handle.
pub fn detect_mentions(text: &str) -> Vec<String> {
    let mut handles = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'@' {
            i += 1;
            continue;
        }

        // Only at a word boundary: "user@host" is not a mention
        if i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len()
            && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
        {
            end += 1;
        }

        let mut handle = &text[start..end];
        handle = handle.trim_end_matches('.');

        if !handle.is_empty() {
            let key = handle.to_ascii_lowercase();
            if seen.insert(key) {
                handles.push(handle.to_string());
            }
        }

        i = end.max(i + 1);
    }

    handles
}

impl NotificationEngine {
    /// Create a `mention` notification for every resolvable mentioned user.
    ///
    /// Skips handles that resolve to nobody, self-mentions, and targets the
    /// author is not permitted to mention. A failure on one handle never
    /// aborts processing of the others. Returns the number of notifications
    /// created.
    pub async fn create_mention_notifications(
        &self,
        text: &str,
        author_id: &str,
        thread_id: Option<&str>,
        reply_id: Option<&str>,
    ) -> SkeinResult<usize> {
        let mut created = 0;

        for handle in detect_mentions(text) {
            let target = match self.users().find_by_username(&handle).await {
                Ok(Some(user)) => user,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Mention lookup for @{} failed: {}", handle, e);
                    continue;
                }
            };

            if target.id == author_id {
                continue;
            }

            match self.settings().can_mention_user(author_id, &target.id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Mention permission check for @{} failed: {}", handle, e);
                    continue;
                }
            }

            match self
                .create(CreateNotification {
                    notif_type: NotificationType::Mention,
                    recipient_id: target.id.clone(),
                    sender_id: author_id.to_string(),
                    thread_id: thread_id.map(str::to_string),
                    reply_id: reply_id.map(str::to_string),
                })
                .await
            {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(e) => warn!("Mention notification for @{} failed: {}", handle, e),
            }
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_handles_in_first_appearance_order() {
        let text = "hey @alice and @Bob, did @alice see this?";
        assert_eq!(detect_mentions(text), vec!["alice", "Bob"]);
    }

    #[test]
    fn dedup_is_case_insensitive_but_case_preserving() {
        assert_eq!(detect_mentions("@Carol @carol @CAROL"), vec!["Carol"]);
    }

    #[test]
    fn ignores_email_addresses() {
        assert_eq!(detect_mentions("mail me at bob@example.com"), Vec::<String>::new());
    }

    #[test]
    fn strips_trailing_punctuation() {
        assert_eq!(detect_mentions("thanks @dave."), vec!["dave"]);
        assert_eq!(detect_mentions("(@erin)"), vec!["erin"]);
    }

    #[test]
    fn keeps_inner_dots() {
        assert_eq!(detect_mentions("cc @bob.smith please"), vec!["bob.smith"]);
    }

    #[test]
    fn bare_at_sign_is_not_a_mention() {
        assert_eq!(detect_mentions("meet @ noon"), Vec::<String>::new());
    }
}
