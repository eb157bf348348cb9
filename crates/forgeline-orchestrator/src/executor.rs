use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgeline_agents::{
    Agent, AgentInput, AgentOutcome, ModuleCode, ModuleTest, RunContext,
};
use forgeline_core::{
    ArtifactType, ForgeError, ForgeResult, ModelProvider, ModuleSpec, RunDescriptor, RunOptions,
    RunStatus, Specification,
};
use forgeline_mcp::CapabilityMatrix;
use forgeline_prompt::{MockLmClient, PromptLoader, RealLmClient};
use forgeline_retrieval::RetrievalEngine;
use forgeline_store::ArtifactStore;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dag::Dag;
use crate::registry::RunRegistry;

const DEFAULT_MOCK_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_REAL_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_MODULE_WORKERS: usize = 4;

/// The five concrete agents the orchestrator drives. Constructed once at
/// process startup and shared across every run.
#[derive(Clone)]
pub struct AgentSet {
    pub architecture: Arc<dyn Agent>,
    pub code: Arc<dyn Agent>,
    pub test: Arc<dyn Agent>,
    pub quality: Arc<dyn Agent>,
    pub build: Arc<dyn Agent>,
}

/// Connection details for the real LM provider, resolved once at startup
/// from configuration/environment and handed to every run that asks for
/// `model_provider = real`.
#[derive(Clone, Default)]
pub struct RealLmConfig {
    pub base_url: String,
    pub default_model: String,
}

/// Drives the architecture -> code[i] -> test[i] -> {quality, build} DAG
/// for every submitted run. Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct Orchestrator {
    mcp: Arc<CapabilityMatrix>,
    store: Arc<ArtifactStore>,
    retrieval: Arc<RetrievalEngine>,
    prompts: Arc<PromptLoader>,
    agents: AgentSet,
    registry: RunRegistry,
    real_lm: RealLmConfig,
}

impl Orchestrator {
    pub fn new(
        mcp: Arc<CapabilityMatrix>,
        store: Arc<ArtifactStore>,
        retrieval: Arc<RetrievalEngine>,
        prompts: Arc<PromptLoader>,
        agents: AgentSet,
        real_lm: RealLmConfig,
    ) -> Self {
        Self {
            mcp,
            store,
            retrieval,
            prompts,
            agents,
            registry: RunRegistry::new(),
            real_lm,
        }
    }

    pub fn run_state(&self, run_id: &str) -> Option<forgeline_core::RunState> {
        self.registry.snapshot(run_id)
    }

    pub fn list_runs(&self) -> Vec<forgeline_core::RunState> {
        self.registry.snapshot_all()
    }

    pub fn cancel(&self, run_id: &str) {
        self.registry.request_cancel(run_id);
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn retrieval(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    /// Validate the specification, allocate a run id, record the
    /// descriptor, and enqueue execution on the Tokio runtime. Returns as
    /// soon as the run is registered; the DAG runs in the background.
    pub async fn submit(
        &self,
        specification: Specification,
        options: RunOptions,
    ) -> ForgeResult<String> {
        let specification = specification.normalize()?;
        let run_id = Uuid::new_v4().to_string();

        let descriptor = RunDescriptor {
            run_id: run_id.clone(),
            specification: specification.clone(),
            options: options.clone(),
            output_dir: self.store.output_dir_for(&run_id),
            created_at: Utc::now(),
        };

        self.registry.register(run_id.clone());
        info!(run_id, project = %specification.project_name, "run submitted");

        let lm: Arc<dyn forgeline_prompt::LmClient> = match options.model_provider {
            ModelProvider::Mock => Arc::new(MockLmClient::new()),
            ModelProvider::Real => {
                let model = options
                    .model_name
                    .clone()
                    .unwrap_or_else(|| self.real_lm.default_model.clone());
                let api_key = options.api_key.clone().unwrap_or_default();
                Arc::new(RealLmClient::new(self.real_lm.base_url.clone(), model, api_key))
            }
        };

        let ctx = RunContext {
            run_id: run_id.clone(),
            store: self.store.clone(),
            retrieval: self.retrieval.clone(),
            prompts: self.prompts.clone(),
            lm,
            specification: Arc::new(specification),
        };

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive(descriptor, ctx).await;
        });

        Ok(run_id)
    }

    fn agent_timeout(&self, provider: ModelProvider) -> Duration {
        match provider {
            ModelProvider::Mock => DEFAULT_MOCK_TIMEOUT,
            ModelProvider::Real => DEFAULT_REAL_TIMEOUT,
        }
    }

    async fn invoke(
        &self,
        agent: &Arc<dyn Agent>,
        ctx: &RunContext,
        input: AgentInput,
        timeout: Duration,
    ) -> ForgeResult<AgentOutcome> {
        self.mcp.check_run(agent.id())?;
        match tokio::time::timeout(timeout, agent.execute(ctx, input)).await {
            Ok(result) => result,
            Err(_) => Err(ForgeError::Timeout(agent.id().to_string())),
        }
    }

    /// Runs the full DAG for one submitted run, updating the registry as
    /// each stage completes. Never panics out: agent/task failures are
    /// converted into `RunState.errors`/`warnings` and a terminal status.
    async fn drive(&self, descriptor: RunDescriptor, ctx: RunContext) {
        let run_id = descriptor.run_id.clone();
        let options = descriptor.options.clone();
        let specification = &descriptor.specification;
        let timeout = self.agent_timeout(options.model_provider);

        self.registry.update(&run_id, |state| {
            state.status = RunStatus::Running;
            state.started_at = Some(Utc::now());
            state.current_stage = "architecture".to_string();
        });

        let architecture_text = match self
            .invoke(&self.agents.architecture, &ctx, AgentInput::Specification, timeout)
            .await
        {
            Ok(outcome) => {
                self.bump_counts(&run_id, &outcome);
                match read_first(&outcome).await {
                    Ok(text) => text,
                    Err(err) => {
                        self.fail(&run_id, err.to_string());
                        return;
                    }
                }
            }
            Err(err) => {
                self.fail(&run_id, err.to_string());
                return;
            }
        };

        self.registry.update(&run_id, |state| {
            state.advance_progress(forgeline_core::stage_weight::ARCHITECTURE);
        });

        if options.architecture_only {
            self.finish(&run_id);
            return;
        }

        if self.registry.is_cancelled(&run_id) {
            self.fail(&run_id, "cancelled".to_string());
            return;
        }

        let total_modules = specification.modules.len();
        if total_modules == 0 {
            self.registry.update(&run_id, |state| {
                state.record_warning(
                    "no modules requested; quality and build skipped".to_string(),
                );
            });
            self.finish(&run_id);
            return;
        }

        if let Err(err) = assert_acyclic(&specification.modules) {
            self.fail(&run_id, err.to_string());
            return;
        }

        self.registry.update(&run_id, |state| {
            state.current_stage = "code".to_string();
        });

        let include_tests = options.include_tests;
        let permit_count = total_modules.min(MAX_MODULE_WORKERS);
        let semaphore = Arc::new(Semaphore::new(permit_count));

        let mut handles = Vec::with_capacity(total_modules);
        for module in specification.modules.clone() {
            let orchestrator = self.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let architecture_text = architecture_text.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("module worker semaphore closed");
                orchestrator
                    .run_module(&ctx, module, architecture_text, include_tests, timeout)
                    .await
            }));
        }

        let mut modules = Vec::new();
        let mut tests = Vec::new();
        let mut any_module_failed = false;
        for handle in handles {
            match handle.await {
                Ok(Ok((code, test))) => {
                    modules.push(code);
                    if let Some(test) = test {
                        tests.push(test);
                    }
                }
                Ok(Err((module_id, err))) => {
                    any_module_failed = true;
                    self.registry.update(&run_id, |state| {
                        state.record_warning(format!("module {module_id} failed: {err}"));
                    });
                }
                Err(join_err) => {
                    any_module_failed = true;
                    self.registry.update(&run_id, |state| {
                        state.record_warning(format!("module task panicked: {join_err}"));
                    });
                }
            }
        }

        let successful_modules = modules.len();
        for _ in 0..successful_modules {
            self.registry
                .update(&run_id, |state| state.bump_artifact_count(ArtifactType::ModuleCode));
        }
        for _ in 0..tests.len() {
            self.registry
                .update(&run_id, |state| state.bump_artifact_count(ArtifactType::Tests));
        }

        self.registry.update(&run_id, |state| {
            state.advance_progress(forgeline_core::stage_weight::CODE);
            state.advance_progress(forgeline_core::stage_weight::TEST);
        });

        if specification.safety_critical && any_module_failed {
            self.fail(
                &run_id,
                "safety-critical run aborted after a module code failure".to_string(),
            );
            return;
        }

        if self.registry.is_cancelled(&run_id) {
            self.fail(&run_id, "cancelled".to_string());
            return;
        }

        self.registry.update(&run_id, |state| {
            state.current_stage = "quality".to_string();
        });

        let quality_result = if options.run_quality_checks {
            let quality_input = AgentInput::AllModules {
                modules: modules.clone(),
                tests: tests.clone(),
                expected_module_count: total_modules,
            };
            self.invoke(&self.agents.quality, &ctx, quality_input, timeout)
                .await
        } else {
            self.registry.update(&run_id, |state| {
                state.record_warning("quality checks disabled for this run".to_string());
            });
            Ok(AgentOutcome::default())
        };

        self.registry.update(&run_id, |state| {
            state.current_stage = "build".to_string();
        });

        let build_input = AgentInput::AllModules {
            modules,
            tests,
            expected_module_count: total_modules,
        };
        let build_result = self
            .invoke(&self.agents.build, &ctx, build_input, timeout)
            .await;

        let mut terminal_error = None;
        match quality_result {
            Ok(outcome) => self.bump_counts(&run_id, &outcome),
            Err(err) => terminal_error = Some(format!("quality stage failed: {err}")),
        }
        match build_result {
            Ok(outcome) => self.bump_counts(&run_id, &outcome),
            Err(err) => {
                let message = format!("build stage failed: {err}");
                terminal_error = Some(terminal_error.map_or(message.clone(), |existing| {
                    format!("{existing}; {message}")
                }));
            }
        }

        if let Some(message) = terminal_error {
            self.fail(&run_id, message);
            return;
        }

        if successful_modules < total_modules {
            self.fail(
                &run_id,
                format!(
                    "build_log module count ({successful_modules}) does not match specification ({total_modules})"
                ),
            );
            return;
        }

        self.registry.update(&run_id, |state| {
            state.advance_progress(forgeline_core::stage_weight::QUALITY);
            state.advance_progress(forgeline_core::stage_weight::BUILD);
        });

        self.finish(&run_id);
    }

    async fn run_module(
        &self,
        ctx: &RunContext,
        module: ModuleSpec,
        architecture_text: String,
        include_tests: bool,
        timeout: Duration,
    ) -> Result<(ModuleCode, Option<ModuleTest>), (String, String)> {
        let module_id = module.id.clone().unwrap_or_default();

        let code_outcome = self
            .invoke(
                &self.agents.code,
                ctx,
                AgentInput::Module {
                    architecture_text,
                    module,
                },
                timeout,
            )
            .await
            .map_err(|err| (module_id.clone(), err.to_string()))?;

        if code_outcome.artifacts_written.len() < 2 {
            return Err((module_id, "code agent wrote fewer than 2 files".to_string()));
        }
        let header = read_path(&code_outcome.artifacts_written[0])
            .await
            .map_err(|err| (module_id.clone(), err.to_string()))?;
        let source = read_path(&code_outcome.artifacts_written[1])
            .await
            .map_err(|err| (module_id.clone(), err.to_string()))?;

        let module_code = ModuleCode {
            module_id: module_id.clone(),
            header,
            source,
        };

        if !include_tests {
            return Ok((module_code, None));
        }

        let test_outcome = self
            .invoke(
                &self.agents.test,
                ctx,
                AgentInput::ModuleCode(module_code.clone()),
                timeout,
            )
            .await;

        let module_test = match test_outcome {
            Ok(outcome) => match outcome.artifacts_written.first() {
                Some(path) => read_path(path).await.ok().map(|source| ModuleTest {
                    module_id: module_id.clone(),
                    source,
                }),
                None => None,
            },
            Err(err) => {
                warn!(module_id, error = %err, "test agent failed for module");
                None
            }
        };

        Ok((module_code, module_test))
    }

    fn bump_counts(&self, run_id: &str, outcome: &AgentOutcome) {
        self.registry.update(run_id, |state| {
            for warning in &outcome.warnings {
                state.record_warning(warning.clone());
            }
        });
        for path in &outcome.artifacts_written {
            if let Some(artifact_type) = artifact_type_from_path(path) {
                self.registry
                    .update(run_id, |state| state.bump_artifact_count(artifact_type));
            }
        }
    }

    fn fail(&self, run_id: &str, message: String) {
        error!(run_id, error = %message, "run failed");
        self.registry.update(run_id, |state| {
            state.status = RunStatus::Failed;
            state.record_error(message);
            state.completed_at = Some(Utc::now());
        });
    }

    fn finish(&self, run_id: &str) {
        self.registry.update(run_id, |state| {
            state.status = RunStatus::Completed;
            state.progress = 100;
            state.current_stage = "done".to_string();
            state.completed_at = Some(Utc::now());
        });
        info!(run_id, "run completed");
    }
}

async fn read_first(outcome: &AgentOutcome) -> ForgeResult<String> {
    let path = outcome
        .artifacts_written
        .first()
        .ok_or_else(|| ForgeError::Internal("agent produced no artifacts".to_string()))?;
    read_path(path).await
}

async fn read_path(path: &PathBuf) -> ForgeResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ForgeError::IoFailure(format!("reading {}: {e}", path.display())))
}

/// Builds the run's `architecture -> code[i] -> test[i] -> {quality,
/// build}` graph and checks it for cycles before any agent runs. The
/// shape is constructed fresh from the module list every run, so a cycle
/// would mean the construction below is broken, not the data; this is
/// the runtime half of the "no cycles in the DAG" invariant, the static
/// half being that `Dag::add_node` can only reference already-existing
/// node ids.
fn assert_acyclic(modules: &[ModuleSpec]) -> ForgeResult<()> {
    let mut dag = Dag::new();
    let root = dag.add_node("architecture", vec![]);
    let mut fan_in = Vec::with_capacity(modules.len() * 2);
    for module in modules {
        let id = module.id.clone().unwrap_or_default();
        let code = dag.add_node(format!("code:{id}"), vec![root]);
        let test = dag.add_node(format!("test:{id}"), vec![code]);
        fan_in.push(code);
        fan_in.push(test);
    }
    dag.add_node("quality", fan_in.clone());
    dag.add_node("build", fan_in);

    if dag.has_cycle() {
        return Err(ForgeError::Internal(
            "constructed run DAG contains a cycle".to_string(),
        ));
    }
    Ok(())
}


/// Best-effort mapping from a written artifact's path back to its
/// category, for artifact-count bookkeeping. Matches the directory names
/// `ArtifactStore` uses; the category directory always sits above the
/// filename (and, for multi-file artifacts, the module directory), so a
/// reverse scan finds it without needing the run root.
fn artifact_type_from_path(path: &std::path::Path) -> Option<ArtifactType> {
    path.components()
        .rev()
        .find_map(|c| c.as_os_str().to_str().and_then(ArtifactType::parse_base))
}
