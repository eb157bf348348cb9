use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use forgeline_core::{ArtifactFormat, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult, Severity};
use forgeline_prompt::{CompletionRequest, PromptKind};
use regex::Regex;
use serde_json::{json, Value};

use crate::agent::{Agent, AgentInput, ModuleCode};
use crate::context::{AgentOutcome, RunContext};

/// Computes static source metrics locally, calls the LM once for a
/// qualitative excerpt, and assembles the quality report (§6 shape).
pub struct QualityAgent;

const INPUTS: &[ArtifactType] = &[ArtifactType::ModuleCode, ArtifactType::Tests];
const OUTPUTS: &[ArtifactType] = &[ArtifactType::Reports];

#[async_trait]
impl Agent for QualityAgent {
    fn id(&self) -> &'static str {
        "quality_agent"
    }

    fn declared_inputs(&self) -> &'static [ArtifactType] {
        INPUTS
    }

    fn declared_outputs(&self) -> &'static [ArtifactType] {
        OUTPUTS
    }

    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome> {
        let AgentInput::AllModules { modules, tests, expected_module_count } = input else {
            return Err(ForgeError::Internal(
                "quality_agent requires AgentInput::AllModules".to_string(),
            ));
        };

        let aggregate = aggregate_metrics(&modules);
        let mut issues = collect_issues(&modules, &aggregate, expected_module_count);

        let mut fields = HashMap::new();
        fields.insert("AGENT_ROLE".to_string(), self.id().to_string());
        fields.insert(
            "CODE_ARTIFACTS".to_string(),
            modules.iter().map(|m| m.module_id.clone()).collect::<Vec<_>>().join(", "),
        );
        fields.insert("MCU".to_string(), ctx.specification.mcu.clone());
        let template = ctx.prompts.load("quality", "v1").await?;
        let rendered = template.render(&fields);

        let llm_analysis_excerpt = ctx
            .lm
            .complete(CompletionRequest::new(rendered, PromptKind::Analysis))
            .await?;

        let overall_score = score_from_issues(&issues);

        let recommendations = recommendations_for(&issues);
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        let report = json!({
            "overall_score": overall_score,
            "report_type": "quality_analysis",
            "timestamp": Utc::now().to_rfc3339(),
            "metrics": metrics_json(&aggregate),
            "analysis_summary": {
                "modules_analyzed": modules.len(),
                "test_files_found": tests.len(),
                "total_lines": aggregate.loc,
                "llm_analysis_excerpt": llm_analysis_excerpt,
            },
            "issues": issues.iter().map(Issue::to_json).collect::<Vec<_>>(),
            "recommendations": recommendations,
        });

        let metadata = ArtifactMetadata::new(self.id(), ArtifactType::Reports, ArtifactFormat::Json);
        let path = ctx
            .store
            .write_report(&ctx.run_id, self.id(), metadata, canonical_bytes(&report)?.as_slice())
            .await?;

        Ok(AgentOutcome::single(path))
    }
}

fn canonical_bytes(value: &Value) -> ForgeResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[derive(Debug, Clone, Default)]
struct SourceMetrics {
    loc: usize,
    function_count: usize,
    function_line_total: usize,
    max_nesting: usize,
    magic_numbers: usize,
    banned_patterns: usize,
    comment_lines: usize,
    complexity: usize,
}

impl SourceMetrics {
    fn merge(&mut self, other: &SourceMetrics) {
        self.loc += other.loc;
        self.function_count += other.function_count;
        self.function_line_total += other.function_line_total;
        self.max_nesting = self.max_nesting.max(other.max_nesting);
        self.magic_numbers += other.magic_numbers;
        self.banned_patterns += other.banned_patterns;
        self.comment_lines += other.comment_lines;
        self.complexity += other.complexity;
    }
}

fn analyze_source(text: &str) -> SourceMetrics {
    let magic_number_re = Regex::new(r"\b\d+\b").expect("valid regex");
    let decision_re = Regex::new(r"\b(if|for|while|case)\b|&&|\|\|").expect("valid regex");
    let function_re = Regex::new(r"\b\w+\s+\w+\s*\([^;{]*\)\s*\{").expect("valid regex");

    let mut metrics = SourceMetrics::default();
    let mut nesting = 0usize;
    let mut in_function = false;
    let mut function_lines = 0usize;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        metrics.loc += 1;

        if line.starts_with("//") || line.starts_with('*') || line.starts_with("/*") {
            metrics.comment_lines += 1;
        }

        if function_re.is_match(line) {
            metrics.function_count += 1;
            in_function = true;
            function_lines = 0;
        }
        if in_function {
            function_lines += 1;
        }

        let opens = line.matches('{').count();
        let closes = line.matches('}').count();
        if opens > closes {
            nesting += opens - closes;
            metrics.max_nesting = metrics.max_nesting.max(nesting);
        } else if closes > opens {
            nesting = nesting.saturating_sub(closes - opens);
            if nesting == 0 && in_function {
                metrics.function_line_total += function_lines;
                in_function = false;
            }
        }

        metrics.magic_numbers += magic_number_re
            .find_iter(line)
            .filter(|m| m.as_str() != "0" && m.as_str() != "1")
            .count();

        metrics.complexity += decision_re.find_iter(line).count();

        if line.contains("malloc") || line.contains("calloc") || line.contains("realloc") || line.contains("free(") {
            metrics.banned_patterns += 1;
        }
        if line.contains("goto ") {
            metrics.banned_patterns += 1;
        }
        if line.contains("while (1)") || line.contains("while(1)") || line.contains("for (;;)") || line.contains("for(;;)") {
            metrics.banned_patterns += 1;
        }
    }

    metrics.complexity += 1;
    metrics
}

fn aggregate_metrics(modules: &[ModuleCode]) -> SourceMetrics {
    let mut aggregate = SourceMetrics::default();
    for module in modules {
        let header_metrics = analyze_source(&module.header);
        let source_metrics = analyze_source(&module.source);
        aggregate.merge(&header_metrics);
        aggregate.merge(&source_metrics);
    }
    aggregate
}

#[derive(Debug, Clone)]
struct Issue {
    severity: Severity,
    issue_type: String,
    message: String,
    location: Option<String>,
}

impl Issue {
    fn to_json(&self) -> Value {
        let mut value = json!({
            "severity": severity_str(self.severity),
            "type": self.issue_type,
            "message": self.message,
        });
        if let Some(location) = &self.location {
            value["location"] = json!(location);
        }
        value
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}

fn collect_issues(modules: &[ModuleCode], aggregate: &SourceMetrics, expected_module_count: usize) -> Vec<Issue> {
    let mut issues = Vec::new();

    for module in modules {
        if module.source.trim().is_empty() {
            issues.push(Issue {
                severity: Severity::High,
                issue_type: "empty_module".to_string(),
                message: format!("module '{}' has empty generated source", module.module_id),
                location: Some(module.module_id.clone()),
            });
        }
    }

    if modules.len() < expected_module_count {
        issues.push(Issue {
            severity: Severity::High,
            issue_type: "missing_module".to_string(),
            message: format!(
                "expected {expected_module_count} modules but only {} produced code",
                modules.len()
            ),
            location: None,
        });
    }

    if aggregate.banned_patterns > 0 {
        issues.push(Issue {
            severity: Severity::High,
            issue_type: "banned_pattern".to_string(),
            message: format!("{} occurrence(s) of dynamic allocation, goto, or unbounded loops", aggregate.banned_patterns),
            location: None,
        });
    }

    if aggregate.max_nesting > 4 {
        issues.push(Issue {
            severity: Severity::Medium,
            issue_type: "deep_nesting".to_string(),
            message: format!("maximum nesting depth of {} exceeds the recommended 4", aggregate.max_nesting),
            location: None,
        });
    }

    if aggregate.magic_numbers > 5 {
        issues.push(Issue {
            severity: Severity::Medium,
            issue_type: "magic_numbers".to_string(),
            message: format!("{} magic number literal(s) found; prefer named constants", aggregate.magic_numbers),
            location: None,
        });
    }

    if aggregate.comment_density() < 0.05 && aggregate.loc > 20 {
        issues.push(Issue {
            severity: Severity::Low,
            issue_type: "low_comment_density".to_string(),
            message: "comment density is below 5% of lines of code".to_string(),
            location: None,
        });
    }

    issues
}

impl SourceMetrics {
    fn comment_density(&self) -> f64 {
        if self.loc == 0 {
            0.0
        } else {
            self.comment_lines as f64 / self.loc as f64
        }
    }

    fn avg_function_length(&self) -> f64 {
        if self.function_count == 0 {
            0.0
        } else {
            self.function_line_total as f64 / self.function_count as f64
        }
    }
}

fn score_from_issues(issues: &[Issue]) -> u32 {
    let penalty: u32 = issues.iter().map(|i| i.severity.score_penalty()).sum();
    100u32.saturating_sub(penalty).clamp(0, 100)
}

fn recommendations_for(issues: &[Issue]) -> Vec<String> {
    let mut recs = Vec::new();
    for issue in issues {
        let rec = match issue.issue_type.as_str() {
            "empty_module" => "Regenerate the empty module; inspect the LM prompt for truncation".to_string(),
            "missing_module" => "Re-run the failed module's code stage before proceeding to build".to_string(),
            "banned_pattern" => "Replace dynamic allocation, goto, and unbounded loops with bounded, static alternatives".to_string(),
            "deep_nesting" => "Refactor deeply nested blocks into smaller functions".to_string(),
            "magic_numbers" => "Extract numeric literals into named constants".to_string(),
            "low_comment_density" => "Add explanatory comments for non-obvious logic".to_string(),
            _ => continue,
        };
        if !recs.contains(&rec) {
            recs.push(rec);
        }
    }
    recs
}

fn metrics_json(aggregate: &SourceMetrics) -> Value {
    json!({
        "total_loc": metric_entry(aggregate.loc as f64, None, None, status_for_max(aggregate.loc as f64, 2000.0)),
        "avg_function_length": metric_entry(aggregate.avg_function_length(), None, Some(30.0), status_for_max(aggregate.avg_function_length(), 30.0)),
        "max_nesting": metric_entry(aggregate.max_nesting as f64, None, Some(4.0), status_for_max(aggregate.max_nesting as f64, 4.0)),
        "magic_number_count": metric_entry(aggregate.magic_numbers as f64, None, Some(5.0), status_for_max(aggregate.magic_numbers as f64, 5.0)),
        "banned_pattern_count": metric_entry(aggregate.banned_patterns as f64, None, Some(0.0), status_for_max(aggregate.banned_patterns as f64, 0.0)),
        "comment_density": metric_entry(aggregate.comment_density(), Some("ratio"), Some(0.05), status_for_min(aggregate.comment_density(), 0.05)),
        "cyclomatic_complexity": metric_entry(aggregate.complexity as f64, None, Some(50.0), status_for_max(aggregate.complexity as f64, 50.0)),
    })
}

fn metric_entry(value: f64, unit: Option<&str>, target: Option<f64>, status: &str) -> Value {
    let mut entry = json!({ "value": value, "status": status });
    if let Some(unit) = unit {
        entry["unit"] = json!(unit);
    }
    if let Some(target) = target {
        entry["target"] = json!(target);
    }
    entry
}

fn status_for_max(value: f64, target: f64) -> &'static str {
    if value <= target {
        "pass"
    } else if value <= target * 1.5 {
        "warning"
    } else {
        "fail"
    }
}

fn status_for_min(value: f64, target: f64) -> &'static str {
    if value >= target {
        "pass"
    } else if value >= target * 0.5 {
        "warning"
    } else {
        "fail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::{ModuleKind, ModuleSpec, OptimizationGoal, Specification};
    use forgeline_mcp::CapabilityMatrix;
    use forgeline_prompt::{MockLmClient, PromptLoader};
    use forgeline_retrieval::RetrievalEngine;
    use forgeline_store::ArtifactStore;
    use std::sync::Arc;

    fn spec() -> Specification {
        Specification {
            project_name: "P".into(),
            mcu: "ESP32".into(),
            description: String::new(),
            modules: vec![ModuleSpec {
                id: Some("uart0".into()),
                name: "UART0".into(),
                kind: ModuleKind::Uart,
                description: None,
                parameters: Default::default(),
                requirements: vec![],
            }],
            requirements: vec![],
            constraints: Default::default(),
            safety_critical: false,
            optimization_goal: OptimizationGoal::Balanced,
        }
    }

    async fn context(dir: &std::path::Path) -> RunContext {
        let prompts_dir = dir.join("prompts");
        tokio::fs::create_dir_all(&prompts_dir).await.expect("mkdir");
        tokio::fs::write(prompts_dir.join("quality_prompt_v1.md"), "Review: <<CODE_ARTIFACTS>>")
            .await
            .expect("write template");

        RunContext {
            run_id: "run1".to_string(),
            store: Arc::new(ArtifactStore::new(dir.join("output"), Arc::new(CapabilityMatrix::canonical()))),
            retrieval: Arc::new(RetrievalEngine::empty()),
            prompts: Arc::new(PromptLoader::new(prompts_dir)),
            lm: Arc::new(MockLmClient::new()),
            specification: Arc::new(spec()),
        }
    }

    #[test]
    fn analyze_source_detects_banned_patterns() {
        let metrics = analyze_source("void f(void) {\n    int *p = malloc(4);\n    free(p);\n}\n");
        assert!(metrics.banned_patterns >= 2);
    }

    #[test]
    fn analyze_source_counts_magic_numbers_excluding_zero_and_one() {
        let metrics = analyze_source("int x = 42;\nint y = 0;\nint z = 1;\nint w = 100;\n");
        assert_eq!(metrics.magic_numbers, 2);
    }

    #[test]
    fn score_subtracts_weighted_penalties_and_clamps() {
        let many_critical: Vec<Issue> = (0..10)
            .map(|_| Issue {
                severity: Severity::Critical,
                issue_type: "x".into(),
                message: "x".into(),
                location: None,
            })
            .collect();
        assert_eq!(score_from_issues(&many_critical), 0);
    }

    #[tokio::test]
    async fn missing_module_produces_high_severity_issue_and_failed_score_component() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path()).await;
        let agent = QualityAgent;

        let input = AgentInput::AllModules {
            modules: vec![],
            tests: vec![],
            expected_module_count: 1,
        };

        let outcome = agent.execute(&ctx, input).await.expect("should succeed");
        assert_eq!(outcome.artifacts_written.len(), 1);
        let bytes = tokio::fs::read(&outcome.artifacts_written[0]).await.expect("read report");
        let report: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert!(report["overall_score"].as_u64().expect("score") < 100);
        let issues = report["issues"].as_array().expect("issues array");
        assert!(issues.iter().any(|i| i["type"] == "missing_module"));
    }
}
