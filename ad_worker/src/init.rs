//! Environment loading and logging setup.

use std::sync::{Once, OnceLock};

use apexdata::config::PipelineConfig;
use apexdata::riot::{single_attempt_api, RiotUpstream};
use riven::RiotApi;
use secrecy::SecretString;
use web_sys::console;
use worker::{console_error, console_log, Env, Error, Result};

use crate::d1::D1Store;

/// D1 binding holding every collection.
pub const BINDING_D1_DB: &str = "BINDING_D1_DB";
/// Queue binding for [`crate::webjob::Task`]s.
pub const BINDING_QUEUE_WEBJOB: &str = "BINDING_QUEUE_WEBJOB";

/// Initialize [`log`] logging into Cloudflare's [`console`] logging system, if not already
/// initialized. The level comes from `LOG_LEVEL`, default `info`.
pub fn init_logging(env: &Env) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        {
            fn hook(info: &std::panic::PanicInfo) {
                console_error!("{}", info);
            }
            std::panic::set_hook(Box::new(hook));
            console_log!("[panic hook set]");
        }
        {
            struct ConsoleLog;
            static LOG: ConsoleLog = ConsoleLog;
            impl log::Log for ConsoleLog {
                fn enabled(&self, metadata: &log::Metadata) -> bool {
                    metadata.level() <= log::max_level()
                }

                fn log(&self, record: &log::Record) {
                    if !self.enabled(record.metadata()) {
                        return;
                    }
                    let method = match record.level() {
                        log::Level::Error => console::error_1,
                        log::Level::Warn => console::warn_1,
                        log::Level::Info => console::info_1,
                        log::Level::Debug => console::debug_1,
                        log::Level::Trace => console::trace_1,
                    };
                    (method)(
                        &format!(
                            "[{} {}] {}",
                            record.level(),
                            record.module_path().unwrap_or("?"),
                            record.args()
                        )
                        .into(),
                    );
                }

                fn flush(&self) {}
            }
            let level = envvar(env, "LOG_LEVEL")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info);
            if log::set_logger(&LOG).is_ok() {
                log::set_max_level(level);
            }

            log::info!("logger set, level `{}`", level);
        }
    });
}

/// Everything a task needs, built from the environment for each event.
pub struct AppState {
    /// Pipeline settings.
    pub config: PipelineConfig,
    /// Document store.
    pub store: D1Store,
    /// Riot API client.
    pub upstream: RiotUpstream<'static>,
}

impl AppState {
    /// Load config, bindings and secrets.
    pub fn from_env(env: &Env) -> Result<Self> {
        let config = PipelineConfig::from_vars(|name| envvar(env, name).ok())
            .map_err(to_worker_error)?;
        let store = D1Store::new(env.d1(BINDING_D1_DB)?);
        let upstream = RiotUpstream::new(get_rgapi(env)?, &config);
        log::info!("Loaded config: {:?}", config);
        Ok(Self {
            config,
            store,
            upstream,
        })
    }
}

/// Initialize and return the [`RiotApi`] instance, if not already initialized. Kept across
/// events so riven's rate limit state carries over.
pub fn get_rgapi(env: &Env) -> Result<&'static RiotApi> {
    static ONCE: OnceLock<RiotApi> = OnceLock::new();
    if let Some(rgapi) = ONCE.get() {
        return Ok(rgapi);
    }
    let rgapi = single_attempt_api(&secret(env, "RGAPI_KEY")?);
    log::info!("rgapi initialized");
    Ok(ONCE.get_or_init(|| rgapi))
}

/// Convert a pipeline error at the worker boundary.
pub fn to_worker_error(error: apexdata::Error) -> Error {
    Error::RustError(error.to_string())
}

/// Get an env var.
pub fn envvar(env: &Env, name: &str) -> Result<String> {
    env.var(name).map(|v| v.to_string())
}
/// Get an env secret.
pub fn secret(env: &Env, name: &str) -> Result<SecretString> {
    env.secret(name).map(|v| v.to_string().into())
}
