//! Reply classification heuristics.
//!
//! Everything in here is a pure function over text. The phrase sets are a
//! product decision rather than a protocol, so the session only ever talks
//! to [`classify_reply`] and [`is_modification_request`] and the patterns
//! can change without touching the state machine.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};

/// Opening tag of a build directive region
pub const DIRECTIVE_OPEN: &str = "<BUILD_PROJECT>";
/// Closing tag of a build directive region
pub const DIRECTIVE_CLOSE: &str = "</BUILD_PROJECT>";

/// Text shown instead of a reply that tried to build without presenting a plan
pub const POLICY_REFUSAL: &str = "I tried to start building without showing you a plan first, \
which I'm not allowed to do. Please ask again and I'll present the plan for your approval \
before generating anything.";

/// Phrases announcing a plan: bolded "plan", an emoji-prefixed project
/// announcement, "here's the/my plan" phrasing, or a markdown plan heading.
const PLAN_PATTERNS: &[&str] = &[
    r"(?i)\*\*[^*\n]*\bplan\b[^*\n]*\*\*",
    r"(?i)[🚀📋🛠🏗✨🎯📝💡🔨⚡📦][^\n]{0,60}\bproject\b",
    r"(?i)\bhere(?:'|’)?s\s+(?:the|my)\s+(?:\w+\s+)?plan\b",
    r"(?i)\bhere\s+is\s+(?:the|my)\s+(?:\w+\s+)?plan\b",
    r"(?im)^\s*#{1,4}\s+[^\n]*\bplan\b",
];

/// Phrases inviting the user to confirm
const CALL_TO_ACTION_PATTERNS: &[&str] = &[
    r"(?i)\b(?:shall|should|can|may)\s+i\s+(?:proceed|go\s+ahead|start|build|begin|create)\b",
    r"(?i)\b(?:want|would\s+you\s+like)\s+me\s+to\s+(?:proceed|go\s+ahead|start|build|create|begin)\b",
    r"(?i)\bready\s+(?:for\s+me\s+)?to\s+(?:build|proceed|start|begin)\b",
    r"(?i)\b(?:please\s+)?(?:confirm|approve)\b",
    r"(?i)\bproceed\s*\?",
    r"(?i)\bsounds?\s+good\s*\?",
    r"(?i)\blet\s+me\s+know\s+if\s+(?:you(?:'d|\s+would)?\s+)?(?:want|like|approve|agree)\b",
];

const MODIFICATION_PATTERN: &str = r"(?i)\b(?:update|modify|change|edit|fix|improve|refactor|replace|remove|rename|tweak|adjust|extend|existing|add\s+(?:a|an|the|some|more)\b)";

fn plan_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(PLAN_PATTERNS).expect("plan patterns are valid"))
}

fn call_to_action_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(CALL_TO_ACTION_PATTERNS).expect("call-to-action patterns are valid")
    })
}

fn modification_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MODIFICATION_PATTERN).expect("modification pattern is valid"))
}

/// How a finished reply should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Ordinary answer, no action needed
    Reply,
    /// A plan waiting for confirmation
    PlanProposal,
    /// A build directive without a plan in front of it
    PolicyViolation,
}

/// Result of classifying a complete reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedReply {
    pub kind: ReplyKind,
    /// Reply text with directive regions removed
    pub visible: String,
    /// Directive content, when present and non-empty
    pub directive: Option<String>,
}

/// Whether the text contains a build directive opening tag.
pub fn contains_build_directive(text: &str) -> bool {
    text.contains(DIRECTIVE_OPEN)
}

/// Extract the content of every directive region, joined by blank lines.
///
/// An unclosed region runs to the end of the text.
pub fn extract_build_directive(text: &str) -> Option<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(DIRECTIVE_OPEN) {
        let after = &rest[start + DIRECTIVE_OPEN.len()..];
        match after.find(DIRECTIVE_CLOSE) {
            Some(end) => {
                parts.push(after[..end].trim());
                rest = &after[end + DIRECTIVE_CLOSE.len()..];
            }
            None => {
                parts.push(after.trim());
                break;
            }
        }
    }

    let joined = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// The text a user should see: every directive region removed, including an
/// unclosed one.
pub fn visible_text(buffer: &str) -> String {
    strip_directives(buffer).trim().to_string()
}

/// Like [`visible_text`], but for a reply still being streamed: a trailing
/// prefix of the opening tag is held back until the next fragment shows
/// whether it is one.
pub fn streaming_text(buffer: &str) -> String {
    let mut out = strip_directives(buffer);
    let keep = out.len() - partial_tag_suffix(&out);
    out.truncate(keep);
    out.trim().to_string()
}

fn strip_directives(buffer: &str) -> String {
    let mut out = String::with_capacity(buffer.len());
    let mut rest = buffer;
    while let Some(start) = rest.find(DIRECTIVE_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + DIRECTIVE_OPEN.len()..];
        match after.find(DIRECTIVE_CLOSE) {
            Some(end) => rest = &after[end + DIRECTIVE_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

// Length of a trailing prefix of the opening tag (at least "<B").
fn partial_tag_suffix(text: &str) -> usize {
    (2..DIRECTIVE_OPEN.len())
        .rev()
        .find(|&n| text.ends_with(&DIRECTIVE_OPEN[..n]))
        .unwrap_or(0)
}

/// Whether the visible text announces a plan.
pub fn is_plan_announcement(text: &str) -> bool {
    plan_patterns().is_match(text)
}

/// Whether the visible text invites the user to confirm.
pub fn has_call_to_action(text: &str) -> bool {
    call_to_action_patterns().is_match(text)
}

/// Whether a plan describes changing an existing project rather than a
/// fresh build.
pub fn is_modification_request(plan: &str) -> bool {
    modification_pattern().is_match(plan)
}

/// Classify a complete reply buffer.
pub fn classify_reply(buffer: &str) -> ClassifiedReply {
    let visible = visible_text(buffer);
    let directive = extract_build_directive(buffer);

    let kind = if contains_build_directive(buffer) {
        if is_plan_announcement(&visible) {
            ReplyKind::PlanProposal
        } else {
            ReplyKind::PolicyViolation
        }
    } else if is_plan_announcement(&visible) && has_call_to_action(&visible) {
        ReplyKind::PlanProposal
    } else {
        ReplyKind::Reply
    };

    ClassifiedReply {
        kind,
        visible,
        directive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_strips_regions() {
        let text = "Before <BUILD_PROJECT>secret</BUILD_PROJECT> after";
        assert_eq!(visible_text(text), "Before  after");

        let text = "a<BUILD_PROJECT>x</BUILD_PROJECT>b<BUILD_PROJECT>y</BUILD_PROJECT>c";
        assert_eq!(visible_text(text), "abc");
    }

    #[test]
    fn test_visible_text_hides_unclosed_region() {
        assert_eq!(visible_text("Plan ready <BUILD_PROJECT>half of"), "Plan ready");
        assert_eq!(streaming_text("Plan ready <BUILD_PROJECT>half of"), "Plan ready");
        assert_eq!(streaming_text("Plan ready <BUILD_PR"), "Plan ready");
        assert_eq!(streaming_text("a < b"), "a < b");
    }

    #[test]
    fn test_finished_reply_keeps_trailing_tag_prefix() {
        assert_eq!(visible_text("Compare a<B"), "Compare a<B");
        assert_eq!(classify_reply("Use <BU").visible, "Use <BU");
        assert_eq!(classify_reply("Use <BU").kind, ReplyKind::Reply);
    }

    #[test]
    fn test_extract_build_directive() {
        let text = "x <BUILD_PROJECT>\n todo app \n</BUILD_PROJECT> y";
        assert_eq!(extract_build_directive(text), Some("todo app".to_string()));
        assert_eq!(extract_build_directive("no tags here"), None);
        assert_eq!(
            extract_build_directive("<BUILD_PROJECT></BUILD_PROJECT>"),
            None
        );
        assert_eq!(
            extract_build_directive("<BUILD_PROJECT>unclosed"),
            Some("unclosed".to_string())
        );
    }

    #[test]
    fn test_plan_announcement_phrases() {
        assert!(is_plan_announcement("**Here's my plan:**\n1. layout"));
        assert!(is_plan_announcement("**The Plan**"));
        assert!(is_plan_announcement("🚀 **Project: Todo App**"));
        assert!(is_plan_announcement("Here's the plan for your site"));
        assert!(is_plan_announcement("Here is my build plan"));
        assert!(is_plan_announcement("## Implementation Plan\n- step"));
        assert!(!is_plan_announcement("Sure, a todo app is a great idea."));
        assert!(!is_plan_announcement("I plan to help you"));
    }

    #[test]
    fn test_call_to_action_phrases() {
        assert!(has_call_to_action("Want me to proceed?"));
        assert!(has_call_to_action("Shall I go ahead?"));
        assert!(has_call_to_action("Would you like me to build this?"));
        assert!(has_call_to_action("Please confirm and I'll start."));
        assert!(has_call_to_action("Sounds good?"));
        assert!(!has_call_to_action("Here is some information about HTML."));
    }

    #[test]
    fn test_classify_plan_without_directive() {
        let reply = classify_reply("**Here's my plan:**\n1. ...\nWant me to proceed?");
        assert_eq!(reply.kind, ReplyKind::PlanProposal);
        assert!(reply.directive.is_none());
    }

    #[test]
    fn test_classify_plan_without_call_to_action_is_reply() {
        let reply = classify_reply("**Here's my plan:**\n1. header\n2. footer");
        assert_eq!(reply.kind, ReplyKind::Reply);
    }

    #[test]
    fn test_classify_plan_with_directive() {
        let reply = classify_reply(
            "🚀 **Project: Todo App**\nA simple list.\n<BUILD_PROJECT>todo app</BUILD_PROJECT>",
        );
        assert_eq!(reply.kind, ReplyKind::PlanProposal);
        assert_eq!(reply.directive.as_deref(), Some("todo app"));
        assert!(!reply.visible.contains("BUILD_PROJECT"));
    }

    #[test]
    fn test_classify_directive_without_plan_is_violation() {
        let reply = classify_reply("Building now! <BUILD_PROJECT>todo app</BUILD_PROJECT>");
        assert_eq!(reply.kind, ReplyKind::PolicyViolation);
    }

    #[test]
    fn test_classify_ordinary_reply() {
        let reply = classify_reply("HTML stands for HyperText Markup Language.");
        assert_eq!(reply.kind, ReplyKind::Reply);
        assert_eq!(reply.visible, "HTML stands for HyperText Markup Language.");
    }

    #[test]
    fn test_modification_request() {
        assert!(is_modification_request("Update the header color to blue"));
        assert!(is_modification_request("Add a contact form to the page"));
        assert!(is_modification_request("Fix the broken nav links"));
        assert!(!is_modification_request("A landing page for a bakery"));
    }
}
