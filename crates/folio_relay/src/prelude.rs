use config_file::FromConfigFile;
use serde_json::Value;

pub use crate::args::Args;
pub use crate::config::{Config, RelayConfig};
pub use crate::conversation::SystemPolicy;
pub use crate::error::{Error, RelayError};
pub use crate::server::{create_router, run_server};
pub use crate::state::AppState;

pub type Result<T> = std::result::Result<T, Error>;

/// Merges two JSON objects defined as `serde_json::Value`.
pub fn merge(a: &mut Value, b: Value) {
    if let Value::Object(a) = a {
        if let Value::Object(b) = b {
            for (k, v) in b {
                if v.is_null() {
                    a.remove(&k);
                } else {
                    merge(a.entry(k).or_insert(Value::Null), v);
                }
            }

            return;
        }
        return;
    }

    *a = b;
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{home}{rest}"),
        _ => path.to_string(),
    }
}

/// Reads the configuration file named by `--config-file`, if any. Without one every option
/// falls back to its default.
pub fn build_config(mut args: Args) -> Result<(Args, Config)> {
    let Some(config_file) = args.config_file.as_deref().map(expand_home) else {
        return Ok((args, Config::new()));
    };

    log::info!("config_file: {}", &config_file);

    if !std::path::Path::new(&config_file).exists() {
        return Err(Error::ConfigNotFound(config_file));
    }

    let config = Config::from_config_file(&config_file).map_err(|e| Error::Config(e.to_string()))?;

    args.config_file = Some(config_file);

    Ok((args, config))
}

/// Builds the arguments struct based on a combination of the following inputs,
/// in this order.
///
/// 1. CLI options/Environment variables.
/// 2. Config file options.
/// 3. Config file defaults.
pub fn merge_args_and_config(mut args: Args, config: Config) -> Result<Args> {
    if args.host.is_none() {
        args.host = config.host;
    }
    if args.port.is_none() {
        args.port = config.port;
    }
    if args.secret.is_none() {
        args.secret = config.secret;
    }
    if args.allowed_origin.is_none() {
        args.allowed_origin = config.allowed_origin;
    }
    if args.api_key.is_none() {
        args.api_key = config.key;
    }
    if args.api_base_url.is_none() {
        args.api_base_url = config.base_url;
    }
    if args.site_url.is_none() {
        args.site_url = config.site_url;
    }
    if args.site_name.is_none() {
        args.site_name = config.site_name;
    }
    if args.model.is_none() {
        args.model = config.model;
    }
    if args.max_tokens.is_none() {
        args.max_tokens = config.max_tokens;
    }
    if args.temperature.is_none() {
        args.temperature = config.temperature;
    }
    if args.top_p.is_none() {
        args.top_p = config.top_p;
    }
    if args.system_policy.is_none() {
        args.system_policy = config.system_policy;
    }

    // An inline or file template given on the command line replaces both config entries.
    if args.system.is_none() && args.system_file.is_none() {
        args.system = config.system;
        args.system_file = config.system_file.as_deref().map(expand_home);
    }

    args.vars = match (config.vars, args.vars.take()) {
        (Some(mut vars), Some(overrides)) => {
            merge(&mut vars, overrides);
            Some(vars)
        }
        (vars, overrides) => overrides.or(vars),
    };

    Ok(args)
}
