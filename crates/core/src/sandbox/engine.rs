//! The embedded snippet interpreter.
//!
//! A fresh [`rhai::Engine`] is built for every run. Only the functions
//! backing granted capabilities are registered; there is no module
//! resolver, no `eval`, and the operation budget and size limits from
//! [`SandboxConfig`] apply. The run is synchronous: callers drive it from a
//! blocking worker and pass a runtime handle so async collaborators can be
//! reached.

use std::sync::{Arc, Mutex, PoisonError};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Position, Scope};
use serde_json::Value;
use tokio::runtime::Handle;

use super::capability::{Capabilities, Capability};
use super::error::SnippetError;
use super::SandboxConfig;
use crate::execution::ExecutionResult;
use crate::job::LogLevel;
use crate::output::OutputCapture;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

fn script_err(e: impl ToString) -> Box<EvalAltResult> {
    e.to_string().into()
}

#[derive(Debug, Clone)]
pub struct SnippetEngine {
    config: SandboxConfig,
}

impl SnippetEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `source` once. Never fails: every error ends up in `stderr`.
    pub fn run(
        &self,
        source: &str,
        caps: &Capabilities,
        capture: &OutputCapture,
        rt: &Handle,
    ) -> ExecutionResult {
        let stderr = Arc::new(Mutex::new(String::new()));
        let engine = self.build(caps, capture, &stderr, rt);

        let mut scope = Scope::new();
        if caps.allows(Capability::RequestData) {
            let data = rhai::serde::to_dynamic(caps.request_data()).unwrap_or(Dynamic::UNIT);
            scope.push_constant("request_data", data);
        }
        scope.push("value", Dynamic::UNIT);

        let outcome = engine.eval_with_scope::<Dynamic>(&mut scope, source);
        let assigned = scope
            .get_value::<Dynamic>("value")
            .filter(|v| !v.is_unit());
        let (produced, failure) = match outcome {
            Ok(last) => (assigned.or_else(|| (!last.is_unit()).then_some(last)), None),
            Err(err) => (assigned, Some(SnippetError::from_eval(&err))),
        };

        let mut stderr_text = stderr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(err) = &failure {
            stderr_text.push_str(&err.render());
        }

        ExecutionResult::assemble(
            produced.map(to_json),
            capture.snapshot(),
            stderr_text,
            failure.is_some(),
            self.config.success_policy,
        )
    }

    fn build(
        &self,
        caps: &Capabilities,
        capture: &OutputCapture,
        stderr: &Arc<Mutex<String>>,
        rt: &Handle,
    ) -> Engine {
        let mut engine = Engine::new();
        engine
            .set_max_operations(self.config.max_operations)
            .set_max_call_levels(self.config.max_call_levels)
            .set_max_string_size(self.config.max_string_size)
            .set_max_array_size(self.config.max_array_size)
            .set_max_map_size(self.config.max_map_size)
            .set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        let stdout = capture.cell();
        let print_allowed = caps.allows(Capability::Print);
        engine.on_print(move |text: &str| {
            if print_allowed {
                stdout.append(text);
            }
        });

        if caps.allows(Capability::Diagnostics) {
            let sink = Arc::clone(stderr);
            engine.register_fn("eprint", move |text: Dynamic| {
                let mut err = sink.lock().unwrap_or_else(PoisonError::into_inner);
                err.push_str(&text.to_string());
                if !err.ends_with('\n') {
                    err.push('\n');
                }
            });
            engine.on_debug(|text: &str, source: Option<&str>, pos: Position| {
                tracing::debug!(source = source.unwrap_or("snippet"), %pos, "{text}");
            });
        } else {
            engine.on_debug(|_: &str, _: Option<&str>, _: Position| {});
        }

        if let Some(token) = caps.cancel_token().cloned() {
            engine.on_progress(move |_ops: u64| {
                token.is_cancelled().then(|| Dynamic::from("cancelled"))
            });
        }

        if let Some(control) = caps.job_control().cloned() {
            let (handle, starter) = (rt.clone(), Arc::clone(&control));
            engine.register_fn(
                "start_job",
                move |job_type: ImmutableString, source: ImmutableString| -> FnResult<Dynamic> {
                    let outcome =
                        handle.block_on(starter.start_job(job_type.as_str(), source.as_str()));
                    rhai::serde::to_dynamic(&outcome)
                },
            );
            let handle = rt.clone();
            engine.register_fn(
                "is_running",
                move |job_type: ImmutableString| -> FnResult<bool> {
                    handle
                        .block_on(control.is_running(job_type.as_str()))
                        .map_err(script_err)
                },
            );
        }

        if let Some(job) = caps.job().cloned() {
            let (handle, logger) = (rt.clone(), job.logger.clone());
            engine.register_fn("log", move |message: ImmutableString| -> FnResult<()> {
                handle
                    .block_on(logger.info(message.as_str()))
                    .map_err(script_err)
            });

            let (handle, logger) = (rt.clone(), job.logger.clone());
            engine.register_fn(
                "log",
                move |level: ImmutableString, message: ImmutableString| -> FnResult<()> {
                    let level: LogLevel = level.parse().map_err(script_err)?;
                    handle
                        .block_on(logger.write(level, message.as_str(), None))
                        .map(|_| ())
                        .map_err(script_err)
                },
            );

            let (handle, logger) = (rt.clone(), job.logger.clone());
            engine.register_fn(
                "step",
                move |step: i64, message: ImmutableString| -> FnResult<()> {
                    let step = i32::try_from(step).map_err(|_| script_err("step out of range"))?;
                    handle
                        .block_on(logger.step(step, message.as_str()))
                        .map_err(script_err)
                },
            );

            let token = job.cancel.clone();
            engine.register_fn("is_cancelled", move || token.is_cancelled());
            let job_id = job.logger.job_id();
            engine.register_fn("job_id", move || job_id);
        }

        if let Some(http) = caps.http().cloned() {
            let handle = rt.clone();
            engine.register_fn("http_get", move |url: ImmutableString| -> FnResult<Dynamic> {
                let target = http.check(url.as_str()).map_err(script_err)?;
                let (status, body) = handle
                    .block_on(async {
                        let response = http.client().get(target).send().await?;
                        let status = response.status().as_u16();
                        Ok::<_, reqwest::Error>((status, response.text().await?))
                    })
                    .map_err(script_err)?;
                let mut map = rhai::Map::new();
                map.insert("status".into(), Dynamic::from(i64::from(status)));
                map.insert("body".into(), Dynamic::from(body));
                Ok(Dynamic::from_map(map))
            });
        }

        engine
    }
}

fn to_json(value: Dynamic) -> Value {
    rhai::serde::from_dynamic::<Value>(&value).unwrap_or_else(|_| Value::String(value.to_string()))
}
