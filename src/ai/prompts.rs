//! System prompts for AI features

/// System prompt for single-label inbox classification
pub const CLASSIFY_SYSTEM: &str = r#"You are an email triage assistant. Classify the email into exactly one of these categories:
Newsletter, Promotional, Social Notification, Spam, Personal, Work-Related, Transactional, Other.
Respond with the category name only. No punctuation, no explanation."#;

/// Longest completion we expect; category names are a few tokens.
pub const CLASSIFY_MAX_TOKENS: u32 = 10;

/// Build the user message for classification.
pub fn classification_request(
    from: &str,
    subject: &str,
    snippet: &str,
    body_excerpt: Option<&str>,
) -> String {
    let mut content = format!("From: {}\nSubject: {}\nSnippet: {}", from, subject, snippet);
    if let Some(body) = body_excerpt.filter(|b| !b.trim().is_empty()) {
        content.push_str("\nBody excerpt:\n");
        content.push_str(body);
    }
    content
}
