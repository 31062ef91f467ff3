//! URL threat verdicts from an ordered substring rule table.
//!
//! This does no network access or content inspection. The first rule whose
//! pattern occurs in the raw URL decides the verdict, so the table order is
//! part of the contract.

use crate::db::{ThreatDetails, ThreatLevel};

/// One classification rule
#[derive(Debug, PartialEq, Eq)]
pub struct ThreatRule {
    /// Case-sensitive substring matched against the raw URL
    pub pattern: &'static str,
    pub threat_type: &'static str,
    pub description: &'static str,
    /// 0-100
    pub confidence: u8,
}

pub const RULES: &[ThreatRule] = &[
    ThreatRule {
        pattern: "eval(",
        threat_type: "Suspicious JavaScript",
        description: "URL contains JavaScript eval() which is often used to run obfuscated code",
        confidence: 92,
    },
    ThreatRule {
        pattern: "document.write",
        threat_type: "Script Injection",
        description: "URL attempts to write content into the page through document.write",
        confidence: 88,
    },
    ThreatRule {
        pattern: "innerHTML",
        threat_type: "Cross-Site Scripting",
        description: "URL manipulates innerHTML, a common cross-site scripting vector",
        confidence: 80,
    },
    ThreatRule {
        pattern: ".ru/",
        threat_type: "Suspicious Domain",
        description: "Domain belongs to a zone frequently used to host malicious content",
        confidence: 65,
    },
    ThreatRule {
        pattern: "bit.ly",
        threat_type: "URL Shortener",
        description: "Shortened link hides its real destination",
        confidence: 55,
    },
    ThreatRule {
        pattern: "malware",
        threat_type: "Potential Malware Detected",
        description: "URL references known malware keywords",
        confidence: 87,
    },
    ThreatRule {
        pattern: "phishing",
        threat_type: "Potential Malware Detected",
        description: "URL references known phishing keywords",
        confidence: 87,
    },
    ThreatRule {
        pattern: "virus",
        threat_type: "Potential Malware Detected",
        description: "URL references known virus keywords",
        confidence: 87,
    },
];

/// Outcome of classifying one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub level: ThreatLevel,
    /// The rule that fired, `None` for a safe URL
    pub rule: Option<&'static ThreatRule>,
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        self.level == ThreatLevel::Safe
    }

    pub fn details(&self) -> Option<ThreatDetails> {
        self.rule.map(|rule| ThreatDetails {
            threat_type: rule.threat_type.to_string(),
            description: rule.description.to_string(),
            confidence: format!("{}%", rule.confidence),
        })
    }
}

pub fn classify(url: &str) -> Verdict {
    match RULES.iter().find(|rule| url.contains(rule.pattern)) {
        Some(rule) => Verdict {
            level: ThreatLevel::Danger,
            rule: Some(rule),
        },
        None => Verdict {
            level: ThreatLevel::Safe,
            rule: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_is_suspicious_javascript() {
        for url in [
            "https://example.com/?q=eval(1)",
            "http://eval(.example.org",
            "https://a.b/c#eval(atob('x'))",
        ] {
            let verdict = classify(url);
            assert_eq!(verdict.level, ThreatLevel::Danger);
            let details = verdict.details().unwrap();
            assert_eq!(details.threat_type, "Suspicious JavaScript");
            assert_eq!(details.confidence, "92%");
        }
    }

    #[test]
    fn test_first_rule_wins() {
        let verdict = classify("https://bit.ly/abc?x=eval(1)");
        assert_eq!(verdict.details().unwrap().threat_type, "Suspicious JavaScript");

        let verdict = classify("https://evil.ru/innerHTML");
        assert_eq!(verdict.details().unwrap().threat_type, "Cross-Site Scripting");

        let verdict = classify("https://bit.ly/phishing");
        assert_eq!(verdict.details().unwrap().threat_type, "URL Shortener");
    }

    #[test]
    fn test_each_rule_fires_alone() {
        for rule in RULES {
            let url = format!("https://example.com/{}", rule.pattern);
            let verdict = classify(&url);
            assert_eq!(verdict.rule, Some(rule), "pattern {}", rule.pattern);
        }
    }

    #[test]
    fn test_clean_urls_are_safe() {
        for url in [
            "https://example.com/",
            "https://www.rust-lang.org/learn",
            "https://news.example.ru",
            "https://example.com/?q=EVAL(1)",
        ] {
            let verdict = classify(url);
            assert!(verdict.is_safe(), "{}", url);
            assert!(verdict.details().is_none());
        }
    }

    #[test]
    fn test_confidences_are_percentages() {
        assert!(RULES.iter().all(|rule| rule.confidence <= 100));
    }
}
