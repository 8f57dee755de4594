use crate::protocol::ToolInvocation;

/// Detects a model requesting the same tool call over and over.
///
/// Calls are compared by name plus normalized arguments. Only consecutive tool
/// requests count; a different call resets the streak, plain messages do not.
#[derive(Debug, Clone)]
pub struct ToolCallRepetitionDetector {
    last_signature: Option<String>,
    consecutive: usize,
    threshold: usize,
}

impl ToolCallRepetitionDetector {
    /// `threshold`: how many identical calls in a row are tolerated.
    pub fn new(threshold: usize) -> Self {
        Self {
            last_signature: None,
            consecutive: 0,
            threshold,
        }
    }

    /// Comparison key for a call. Arguments are normalized and serialized with
    /// sorted keys.
    pub fn signature(invocation: &ToolInvocation) -> String {
        let mut normalized = invocation.clone();
        normalized.normalize();
        format!(
            "{}:{}",
            normalized.name,
            serde_json::Value::Object(normalized.arguments)
        )
    }

    /// Record a call; returns the length of the current identical streak.
    pub fn record(&mut self, invocation: &ToolInvocation) -> usize {
        let signature = Self::signature(invocation);
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.consecutive += 1;
        } else {
            self.last_signature = Some(signature);
            self.consecutive = 1;
        }
        self.consecutive
    }

    pub fn is_stuck(&self, consecutive: usize) -> bool {
        consecutive > self.threshold
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new(name, args.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_fourth_identical_call_is_stuck() {
        let mut detector = ToolCallRepetitionDetector::new(3);
        let c = call("list_tables", json!({"schema": "public"}));
        for expected in 1..=3 {
            let n = detector.record(&c);
            assert_eq!(n, expected);
            assert!(!detector.is_stuck(n));
        }
        let n = detector.record(&c);
        assert!(detector.is_stuck(n));
    }

    #[test]
    fn test_normalized_arguments_compare_equal() {
        let mut detector = ToolCallRepetitionDetector::new(3);
        detector.record(&call("list_tables", json!({"schema": "Public"})));
        assert_eq!(detector.record(&call("list_tables", json!({"schema": " public "}))), 2);
    }

    #[test]
    fn test_different_call_resets_streak() {
        let mut detector = ToolCallRepetitionDetector::new(3);
        let a = call("list_tables", json!({"schema": "public"}));
        let b = call("list_tables", json!({"schema": "sales"}));
        detector.record(&a);
        detector.record(&a);
        assert_eq!(detector.record(&b), 1);
        assert_eq!(detector.record(&a), 1);
    }
}
