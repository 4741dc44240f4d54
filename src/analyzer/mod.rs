//! Query analyzer.
//!
//! Derives a multi-dimensional `QueryAnalysis` from a prompt and optional
//! conversation context. Pure with respect to external state and
//! deterministic for a given (prompt, context, config); never fails, and
//! reports its own uncertainty through `confidence`.

pub mod context;

pub use context::{ConversationContext, PreviousTurn};

use crate::config::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Overall complexity bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    #[default]
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl Complexity {
    fn from_level(level: usize) -> Self {
        match level {
            0 => Complexity::Trivial,
            1 => Complexity::Simple,
            2 => Complexity::Moderate,
            3 => Complexity::Complex,
            _ => Complexity::Expert,
        }
    }

    /// Output-token multiplier for this bucket.
    fn output_multiplier(self) -> f64 {
        match self {
            Complexity::Trivial => 0.5,
            Complexity::Simple => 1.0,
            Complexity::Moderate => 2.0,
            Complexity::Complex => 4.0,
            Complexity::Expert => 8.0,
        }
    }
}

/// How much chained reasoning the prompt demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    Shallow,
    Moderate,
    Deep,
}

/// Creative register of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativityLevel {
    Factual,
    Analytical,
    Creative,
    Innovative,
}

/// What the caller is fundamentally asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Question,
    Task,
    Creation,
    Analysis,
    Decision,
}

/// Required answer quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRequirement {
    Basic,
    Good,
    High,
    Exceptional,
}

/// Relative weight the caller puts on accuracy, speed, and cost.
/// Normalized so the three values sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityBalance {
    pub accuracy: f64,
    pub speed: f64,
    pub cost: f64,
}

impl PriorityBalance {
    fn normalized(accuracy: f64, speed: f64, cost: f64) -> Self {
        let floor = |v: f64| v.max(0.05);
        let (a, s, c) = (floor(accuracy), floor(speed), floor(cost));
        let sum = a + s + c;
        Self {
            accuracy: a / sum,
            speed: s / sum,
            cost: c / sum,
        }
    }
}

/// Token estimate for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub input: u32,
    pub output: u32,
}

/// The analyzer's verdict on a single prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub complexity: Complexity,
    pub reasoning_depth: ReasoningDepth,
    pub creativity_level: CreativityLevel,
    pub priority_balance: PriorityBalance,
    pub required_capabilities: BTreeSet<String>,
    pub domain: Vec<String>,
    pub intent_category: IntentCategory,
    pub quality_requirement: QualityRequirement,
    pub estimated_tokens: TokenEstimate,
    pub estimated_processing_seconds: f64,
    /// 0-1; grows with prompt length and unambiguous cues
    pub confidence: f64,
    /// Context multiplier (1.0 without context); past the configured bump
    /// threshold the caller raises the task type one level
    pub escalation_factor: f64,
    /// Context observations ("topic_shift", "model_performance:0.60", ...)
    pub context_factors: Vec<String>,
}

impl QueryAnalysis {
    /// Whether the prompt carries explicit strategic/critical urgency cues.
    pub fn has_strategic_cues(&self) -> bool {
        self.context_factors
            .iter()
            .any(|f| f == "strategic_cues")
    }
}

/// Technical-term families used for complexity and domain tagging.
const TECH_TERM_FAMILIES: &[(&str, &[&str])] = &[
    (
        "clustering",
        &[
            "cluster",
            "kubernetes",
            "k8s",
            "consensus",
            "replication",
            "failover",
            "datacenter",
            "distributed",
        ],
    ),
    (
        "database",
        &[
            "database", "sql", "postgres", "mysql", "redis", "index", "schema", "transaction",
        ],
    ),
    (
        "container",
        &["docker", "container", "image", "registry", "pod"],
    ),
    (
        "automation",
        &["automation", "pipeline", "ci/cd", "terraform", "ansible", "workflow"],
    ),
    (
        "networking",
        &[
            "network", "dns", "tcp", "http", "firewall", "load balancer", "proxy", "latency",
        ],
    ),
    (
        "sysadmin",
        &["linux", "systemd", "kernel", "disk", "server", "deployment"],
    ),
    (
        "machine-learning",
        &[
            "machine learning",
            "neural",
            "model training",
            "inference",
            "embedding",
            "llm",
        ],
    ),
    (
        "cryptography",
        &["encryption", "tls", "certificate", "signature", "cryptograph"],
    ),
    (
        "coding",
        &[
            "function", "class", "api", "code", "bug", "refactor", "implement", "compile",
            "unit test",
        ],
    ),
];

const WHY_PATTERNS: &[&str] = &["why", "reason", "cause", "explain why"];
const HOW_PATTERNS: &[&str] = &["how do", "how does", "how to", "how would", "step by step"];
const COMPARE_PATTERNS: &[&str] = &["compare", "versus", " vs ", "difference between", "trade-off", "tradeoff"];
const EVALUATE_PATTERNS: &[&str] = &["evaluate", "assess", "review", "critique", "pros and cons"];
const PREDICT_PATTERNS: &[&str] = &["predict", "forecast", "estimate", "what will", "what would happen"];

const CREATIVE_INDICATORS: &[&str] = &[
    "write a story",
    "poem",
    "imagine",
    "brainstorm",
    "invent",
    "design",
    "compose",
    "creative",
    "novel idea",
];
const ANALYTICAL_INDICATORS: &[&str] = &[
    "analyze",
    "analyse",
    "compare",
    "evaluate",
    "measure",
    "data",
    "statistics",
    "metrics",
    "assess",
];

const ACCURACY_CUES: &[&str] = &[
    "accurate",
    "correct",
    "precise",
    "exactly",
    "critical",
    "production",
    "carefully",
    "must not fail",
];
const SPEED_CUES: &[&str] = &["quick", "fast", "urgent", "asap", "briefly", "short answer", "right now"];
const COST_CUES: &[&str] = &["cheap", "budget", "cost-effective", "affordable", "free tier", "low cost"];

const STRATEGIC_CUES: &[&str] = &["strategic", "critical", "ultimate", "mission-critical", "enterprise-wide"];

const DIAGNOSTIC_CUES: &[&str] = &[
    "troubleshoot",
    "debug",
    "diagnose",
    "root cause",
    "not working",
    "crash",
    "error log",
];

const DECISION_CUES: &[&str] = &["should i", "should we", "choose", "decide", "recommend", "which one"];
const CREATION_CUES: &[&str] = &["write", "create", "compose", "draft", "generate", "design"];
const TASK_CUES: &[&str] = &["implement", "build", "fix", "deploy", "configure", "set up", "migrate", "refactor"];

const CONNECTORS: &[&str] = &[
    " and ", " or ", " if ", " then ", " while ", " unless ", " however ", " also ", " but ",
    " when ", " after ", " before ",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn count_matches(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}

/// The query analyzer.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer {
    config: AnalyzerConfig,
}

impl QueryAnalyzer {
    /// Create an analyzer with the given knobs.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze a prompt, optionally informed by conversation context.
    ///
    /// Best-effort: always returns a complete analysis, with `confidence`
    /// reflecting uncertainty.
    pub fn analyze(&self, prompt: &str, context: Option<&ConversationContext>) -> QueryAnalysis {
        let lower = prompt.to_lowercase();

        let domain = self.detect_domains(&lower);
        let complexity = self.score_complexity(&lower, domain.len());
        let reasoning_depth = self.score_reasoning(&lower);
        let creativity_level = self.score_creativity(&lower);
        let intent_category = self.detect_intent(&lower);
        let quality_requirement = self.score_quality(&lower, complexity);
        let priority_balance = self.score_priority(&lower);
        let required_capabilities = self.detect_capabilities(&lower, reasoning_depth);

        let estimated_tokens = self.estimate_tokens(prompt, complexity);
        let estimated_processing_seconds = 1.0 + f64::from(estimated_tokens.output) / 40.0;

        let mut context_factors = Vec::new();
        if contains_any(&lower, STRATEGIC_CUES) {
            context_factors.push("strategic_cues".to_string());
        }
        if contains_any(&lower, DIAGNOSTIC_CUES) {
            context_factors.push("diagnostic_cues".to_string());
        }

        let escalation_factor = match context {
            Some(ctx) => {
                let mut factor = ctx.escalation_factor();

                let continuity = !ctx.last_domains().is_empty()
                    && ctx.last_domains().iter().any(|d| domain.contains(d));
                if !ctx.last_domains().is_empty() && !continuity {
                    // A topic shift restarts the escalation ramp.
                    factor = 1.0 + (factor - 1.0) * 0.5;
                    context_factors.push("topic_shift".to_string());
                }

                let performance = ctx.model_performance_factor();
                context_factors.push(format!("model_performance:{:.2}", performance));
                context_factors.push(format!("turn_count:{}", ctx.turn_count));

                if factor > self.config.escalation_bump_factor {
                    context_factors.push("task_bump".to_string());
                }

                factor
            }
            None => 1.0,
        };

        let confidence = self.score_confidence(prompt, &lower, &domain);

        QueryAnalysis {
            complexity,
            reasoning_depth,
            creativity_level,
            priority_balance,
            required_capabilities,
            domain,
            intent_category,
            quality_requirement,
            estimated_tokens,
            estimated_processing_seconds,
            confidence,
            escalation_factor,
            context_factors,
        }
    }

    fn detect_domains(&self, lower: &str) -> Vec<String> {
        TECH_TERM_FAMILIES
            .iter()
            .filter(|(_, terms)| contains_any(lower, terms))
            .map(|(family, _)| (*family).to_string())
            .collect()
    }

    /// Complexity is the max of the length bucket and the technical-term
    /// bucket, nudged up by logical-connector density.
    fn score_complexity(&self, lower: &str, domain_count: usize) -> Complexity {
        let length_level = match lower.chars().count() {
            0..=40 => 0,
            41..=120 => 1,
            121..=400 => 2,
            401..=1200 => 3,
            _ => 4,
        };

        let tech_level = match domain_count {
            0 => 0,
            1 => 2,
            2 => 3,
            _ => 4,
        };

        let mut level = length_level.max(tech_level);

        let connectors = count_matches(lower, CONNECTORS);
        if connectors >= 4 {
            level += 1;
        }

        Complexity::from_level(level.min(4))
    }

    /// Counts how many reasoning pattern families appear.
    fn score_reasoning(&self, lower: &str) -> ReasoningDepth {
        let families = [
            WHY_PATTERNS,
            HOW_PATTERNS,
            COMPARE_PATTERNS,
            EVALUATE_PATTERNS,
            PREDICT_PATTERNS,
        ];
        let hits = families
            .iter()
            .filter(|family| contains_any(lower, family))
            .count();

        match hits {
            0 => ReasoningDepth::Shallow,
            1 | 2 => ReasoningDepth::Moderate,
            _ => ReasoningDepth::Deep,
        }
    }

    /// Two-axis lookup on creative and analytical indicator presence.
    fn score_creativity(&self, lower: &str) -> CreativityLevel {
        let creative = contains_any(lower, CREATIVE_INDICATORS);
        let analytical = contains_any(lower, ANALYTICAL_INDICATORS);
        match (creative, analytical) {
            (false, false) => CreativityLevel::Factual,
            (false, true) => CreativityLevel::Analytical,
            (true, false) => CreativityLevel::Creative,
            (true, true) => CreativityLevel::Innovative,
        }
    }

    fn detect_intent(&self, lower: &str) -> IntentCategory {
        if contains_any(lower, DECISION_CUES) {
            return IntentCategory::Decision;
        }
        if contains_any(lower, ANALYTICAL_INDICATORS) {
            return IntentCategory::Analysis;
        }
        if contains_any(lower, TASK_CUES) {
            return IntentCategory::Task;
        }
        if contains_any(lower, CREATION_CUES) {
            return IntentCategory::Creation;
        }
        if lower.contains('?')
            || lower.starts_with("who")
            || lower.starts_with("what")
            || lower.starts_with("when")
            || lower.starts_with("where")
            || lower.starts_with("why")
            || lower.starts_with("how")
        {
            return IntentCategory::Question;
        }
        IntentCategory::Task
    }

    fn score_quality(&self, lower: &str, complexity: Complexity) -> QualityRequirement {
        let cue_level = if contains_any(lower, STRATEGIC_CUES) || lower.contains("exceptional") {
            QualityRequirement::Exceptional
        } else if contains_any(lower, &["high quality", "robust", "thorough", "comprehensive"]) {
            QualityRequirement::High
        } else if contains_any(lower, &["good", "solid", "reliable"]) {
            QualityRequirement::Good
        } else {
            QualityRequirement::Basic
        };

        let complexity_level = match complexity {
            Complexity::Trivial | Complexity::Simple => QualityRequirement::Basic,
            Complexity::Moderate => QualityRequirement::Good,
            Complexity::Complex => QualityRequirement::High,
            Complexity::Expert => QualityRequirement::Exceptional,
        };

        cue_level.max(complexity_level)
    }

    /// Starts from an even (0.5, 0.5, 0.5) and shifts per cue family, then
    /// normalizes so the three weights sum to 1.
    fn score_priority(&self, lower: &str) -> PriorityBalance {
        let boost = self.config.priority_cue_boost;
        let damp = self.config.priority_cue_damp;

        let (mut accuracy, mut speed, mut cost) = (0.5, 0.5, 0.5);

        if contains_any(lower, ACCURACY_CUES) {
            accuracy += boost;
            speed -= damp;
            cost -= damp;
        }
        if contains_any(lower, SPEED_CUES) {
            speed += boost;
            accuracy -= damp;
            cost -= damp;
        }
        if contains_any(lower, COST_CUES) {
            cost += boost;
            accuracy -= damp;
            speed -= damp;
        }

        PriorityBalance::normalized(accuracy, speed, cost)
    }

    fn detect_capabilities(&self, lower: &str, depth: ReasoningDepth) -> BTreeSet<String> {
        let mut caps = BTreeSet::new();

        if contains_any(lower, &["code", "function", "implement", "refactor", "bug", "script", "api"]) {
            caps.insert("coding".to_string());
        }
        if contains_any(lower, &["search my", "knowledge base", "documentation search", "retrieve from"]) {
            caps.insert("rag_search".to_string());
        }
        if contains_any(lower, &["this file", "attached file", "uploaded", "csv", "spreadsheet"]) {
            caps.insert("file_search".to_string());
        }
        if contains_any(lower, &["run the code", "execute", "run this script", "calculate precisely"]) {
            caps.insert("code_interpreter".to_string());
        }
        if depth == ReasoningDepth::Deep {
            caps.insert("reasoning".to_string());
        }

        caps
    }

    fn estimate_tokens(&self, prompt: &str, complexity: Complexity) -> TokenEstimate {
        let input = (prompt.chars().count() as u32).div_ceil(4).max(1);
        let output = ((f64::from(input) * complexity.output_multiplier()) as u32)
            .clamp(1, self.config.max_output_tokens);
        TokenEstimate { input, output }
    }

    fn score_confidence(&self, prompt: &str, lower: &str, domain: &[String]) -> f64 {
        let mut confidence: f64 = 0.3;

        confidence += match prompt.chars().count() {
            0..=20 => 0.0,
            21..=100 => 0.15,
            101..=400 => 0.3,
            _ => 0.4,
        };

        if !domain.is_empty() {
            confidence += 0.1;
        }
        if contains_any(lower, ACCURACY_CUES)
            || contains_any(lower, SPEED_CUES)
            || contains_any(lower, COST_CUES)
        {
            confidence += 0.1;
        }
        if contains_any(lower, TASK_CUES) || contains_any(lower, DECISION_CUES) {
            confidence += 0.1;
        }

        confidence.min(1.0)
    }
}
