//! Per-subtask quality gate.
//!
//! Mechanical review of generated code across five dimensions (syntax,
//! logic, style, security, performance), optionally blended with a
//! delegated analyzer's overall score. Produces a score, issues, and a
//! revision verdict.

use super::session::Subtask;
use crate::config::{CollaborationConfig, QcDepth};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn score_delta(self) -> f64 {
        match self {
            Severity::Low => 5.0,
            Severity::Medium => 15.0,
            Severity::High => 25.0,
            Severity::Critical => 40.0,
        }
    }
}

/// Which review dimension flagged the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Syntax,
    Logic,
    Performance,
    Security,
    Style,
    Maintainability,
}

/// One review finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: IssueCategory,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Issue {
    fn new(
        severity: Severity,
        category: IssueCategory,
        description: impl Into<String>,
        suggestion: Option<&str>,
    ) -> Self {
        Self {
            severity,
            category,
            description: description.into(),
            suggestion: suggestion.map(str::to_string),
        }
    }
}

/// Verdict of a per-subtask review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReview {
    pub passed: bool,
    /// 0-100
    pub score: f64,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub requires_revision: bool,
}

/// Delegated review from a higher-tier analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerReview {
    /// 0-100
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Delegated reviewer contract (typically an LLM-backed critic).
#[async_trait]
pub trait ReviewAnalyzer: Send + Sync {
    async fn review(&self, subtask: &Subtask, code: &str) -> Option<AnalyzerReview>;
}

/// The mechanical quality gate.
pub struct QualityGate {
    config: CollaborationConfig,
    analyzer: Option<std::sync::Arc<dyn ReviewAnalyzer>>,
}

impl QualityGate {
    /// Create a gate with the given knobs.
    pub fn new(config: CollaborationConfig) -> Self {
        Self {
            config,
            analyzer: None,
        }
    }

    /// Attach a delegated analyzer, consulted at full depth only.
    pub fn with_analyzer(mut self, analyzer: std::sync::Arc<dyn ReviewAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Review a subtask's generated code.
    pub async fn review(&self, subtask: &Subtask, code: &str) -> QualityReview {
        let mut issues = Vec::new();

        let syntax = self.check_syntax(subtask, code, &mut issues);
        let logic = self.check_logic(subtask, code, &mut issues);
        let style = self.check_style(code, &mut issues);
        let security = self.check_security(code, &mut issues);
        let performance = self.check_performance(code, &mut issues);

        let mechanical = (syntax + logic + style + security + performance) / 5.0;

        let score = match (&self.analyzer, self.config.qc_depth) {
            (Some(analyzer), QcDepth::Full) => match analyzer.review(subtask, code).await {
                Some(review) => 0.6 * mechanical + 0.4 * review.overall_score.clamp(0.0, 100.0),
                None => mechanical,
            },
            _ => mechanical,
        };

        let critical_count = issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count();
        let severe_count = issues
            .iter()
            .filter(|i| i.severity >= Severity::High)
            .count();

        let requires_revision =
            critical_count > 0 || score < self.config.requires_review || severe_count >= 3;
        let passed = score >= self.config.min_score && !requires_revision;

        let suggestions = issues
            .iter()
            .filter_map(|i| i.suggestion.clone())
            .collect();

        tracing::debug!(
            subtask = %subtask.id,
            score,
            issues = issues.len(),
            requires_revision,
            passed,
            "quality gate verdict"
        );

        QualityReview {
            passed,
            score,
            issues,
            suggestions,
            requires_revision,
        }
    }

    fn check_syntax(&self, subtask: &Subtask, code: &str, issues: &mut Vec<Issue>) -> f64 {
        let mut score: f64 = 100.0;

        for (open, close, name) in [('(', ')', "parentheses"), ('[', ']', "brackets"), ('{', '}', "braces")] {
            let opens = code.chars().filter(|c| *c == open).count();
            let closes = code.chars().filter(|c| *c == close).count();
            if opens != closes {
                let issue = Issue::new(
                    Severity::Critical,
                    IssueCategory::Syntax,
                    format!("Unbalanced {} ({} open, {} close)", name, opens, closes),
                    Some("Check the block structure for a missing delimiter"),
                );
                score -= issue.severity.score_delta();
                issues.push(issue);
            }
        }

        if matches!(subtask.language.as_str(), "javascript" | "typescript") {
            let suspicious = code
                .lines()
                .map(str::trim)
                .filter(|line| {
                    (line.starts_with("const ")
                        || line.starts_with("let ")
                        || line.starts_with("var ")
                        || line.starts_with("return "))
                        && !line.ends_with(';')
                        && !line.ends_with('{')
                        && !line.ends_with(',')
                })
                .count();
            if suspicious > 0 {
                let issue = Issue::new(
                    Severity::Low,
                    IssueCategory::Syntax,
                    format!("{} statements appear to be missing semicolons", suspicious),
                    Some("Terminate statements consistently"),
                );
                score -= issue.severity.score_delta();
                issues.push(issue);
            }
        }

        score.max(0.0)
    }

    fn check_logic(&self, subtask: &Subtask, code: &str, issues: &mut Vec<Issue>) -> f64 {
        let mut score: f64 = 100.0;
        let code_lower = code.to_lowercase();

        // Requirement coverage: significant description words should surface
        // in the generated code.
        let words: Vec<&str> = subtask
            .description
            .split_whitespace()
            .filter(|w| w.len() > 4 && w.chars().all(char::is_alphanumeric))
            .collect();
        if !words.is_empty() {
            let matched = words
                .iter()
                .filter(|w| code_lower.contains(&w.to_lowercase()))
                .count();
            let coverage = matched as f64 / words.len() as f64;
            if coverage < 0.3 {
                let issue = Issue::new(
                    Severity::High,
                    IssueCategory::Logic,
                    format!(
                        "Code covers only {:.0}% of the requirement terms",
                        coverage * 100.0
                    ),
                    Some("Revisit the subtask description and address each element"),
                );
                score -= issue.severity.score_delta();
                issues.push(issue);
            }
        }

        // Error handling is expected around API, async, and database work.
        let description_lower = subtask.description.to_lowercase();
        let needs_error_handling = ["api", "async", "database", "fetch", "request", "endpoint"]
            .iter()
            .any(|cue| description_lower.contains(cue) || code_lower.contains(cue));
        let has_error_handling = ["try", "catch", ".catch", "except", "result<", "match ", "?;"]
            .iter()
            .any(|cue| code_lower.contains(cue));
        if needs_error_handling && !has_error_handling {
            let issue = Issue::new(
                Severity::Medium,
                IssueCategory::Logic,
                "No error handling around fallible operations",
                Some("Wrap fallible calls and surface failures explicitly"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        if subtask.language == "typescript" {
            let any_count = code.matches(": any").count();
            if any_count > 0 {
                let issue = Issue::new(
                    Severity::Medium,
                    IssueCategory::Logic,
                    format!("{} declarations typed as 'any'", any_count),
                    Some("Replace 'any' with concrete types"),
                );
                score -= issue.severity.score_delta();
                issues.push(issue);
            }
        }

        score.max(0.0)
    }

    fn check_style(&self, code: &str, issues: &mut Vec<Issue>) -> f64 {
        let mut score: f64 = 100.0;
        let line_count = code.lines().count();

        let has_comments = code.contains("//") || code.contains("/*") || code.contains('#');
        if line_count > 30 && !has_comments {
            let issue = Issue::new(
                Severity::Low,
                IssueCategory::Style,
                "Long code block with no comments",
                Some("Add a comment for each non-obvious section"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        if line_count > 120 {
            let issue = Issue::new(
                Severity::Medium,
                IssueCategory::Maintainability,
                format!("Single block of {} lines; likely doing too much", line_count),
                Some("Split the block into focused functions"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        let cryptic = code
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                ["const x ", "let x ", "var x ", "const y ", "let y ", "var y "]
                    .iter()
                    .any(|p| trimmed.starts_with(p))
            })
            .count();
        if cryptic > 2 {
            let issue = Issue::new(
                Severity::Low,
                IssueCategory::Style,
                "Several single-letter identifiers",
                Some("Name variables after what they hold"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        score.max(0.0)
    }

    fn check_security(&self, code: &str, issues: &mut Vec<Issue>) -> f64 {
        let mut score: f64 = 100.0;
        let lower = code.to_lowercase();

        let mut flag = |severity: Severity, description: &str, suggestion: &str, issues: &mut Vec<Issue>, score: &mut f64| {
            let issue = Issue::new(severity, IssueCategory::Security, description, Some(suggestion));
            *score -= issue.severity.score_delta();
            issues.push(issue);
        };

        if lower.contains("eval(") {
            flag(
                Severity::Critical,
                "eval() executes arbitrary strings",
                "Remove eval() and parse the input explicitly",
                issues,
                &mut score,
            );
        }
        if lower.contains("innerhtml") {
            flag(
                Severity::Medium,
                "innerHTML assignment risks DOM injection",
                "Use textContent or a sanitizer",
                issues,
                &mut score,
            );
        }
        if lower.contains("document.write") {
            flag(
                Severity::Medium,
                "document.write risks markup injection",
                "Build nodes through the DOM API",
                issues,
                &mut score,
            );
        }
        if hard_coded_secret(&lower) {
            flag(
                Severity::Critical,
                "Hard-coded credential literal",
                "Load secrets from configuration or the environment",
                issues,
                &mut score,
            );
        }
        if sql_interpolation(code) {
            flag(
                Severity::High,
                "SQL assembled from interpolated strings",
                "Use parameterized queries",
                issues,
                &mut score,
            );
        }

        score.max(0.0)
    }

    fn check_performance(&self, code: &str, issues: &mut Vec<Issue>) -> f64 {
        let mut score: f64 = 100.0;
        let lower = code.to_lowercase();

        let dom_in_loop = code.lines().any(|line| {
            let l = line.to_lowercase();
            (l.contains("for ") || l.contains("while ")) && l.contains("document.")
        }) || loop_wraps_dom_access(&lower);
        if dom_in_loop {
            let issue = Issue::new(
                Severity::Medium,
                IssueCategory::Performance,
                "DOM access inside a loop",
                Some("Hoist the lookup out of the loop"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        if lower.contains(".map(") && lower.matches(".map(").count() >= 2
            || lower.matches(".filter(").count() >= 2
        {
            let issue = Issue::new(
                Severity::Low,
                IssueCategory::Performance,
                "Chained redundant iterations over the same collection",
                Some("Fuse the passes into one traversal"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        let intervals = lower.matches("setinterval").count();
        let clears = lower.matches("clearinterval").count();
        if intervals > clears {
            let issue = Issue::new(
                Severity::Medium,
                IssueCategory::Performance,
                "setInterval without a matching clearInterval",
                Some("Clear timers when the component goes away"),
            );
            score -= issue.severity.score_delta();
            issues.push(issue);
        }

        score.max(0.0)
    }
}

fn hard_coded_secret(lower: &str) -> bool {
    ["password", "api_key", "apikey", "secret", "token"]
        .iter()
        .any(|name| {
            lower.contains(&format!("{} = \"", name))
                || lower.contains(&format!("{}=\"", name))
                || lower.contains(&format!("{} = '", name))
                || lower.contains(&format!("{}='", name))
        })
}

fn sql_interpolation(code: &str) -> bool {
    let has_sql_verb = ["SELECT ", "INSERT ", "UPDATE ", "DELETE "]
        .iter()
        .any(|verb| code.contains(verb));
    has_sql_verb && (code.contains("${") || code.contains("\" + ") || code.contains("+ \""))
}

fn loop_wraps_dom_access(lower: &str) -> bool {
    // Cheap scan: a document.* access lexically after a loop opener and
    // before the matching close is approximated by same-200-char proximity.
    if let Some(loop_pos) = lower.find("for (").or_else(|| lower.find("while (")) {
        if let Some(dom_pos) = lower[loop_pos..].find("document.") {
            return dom_pos < 200;
        }
    }
    false
}
