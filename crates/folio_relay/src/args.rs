use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::SystemPolicy;

/// Custom parser function for JSON values
fn parse_json(s: &str) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(s)
}

#[derive(Default, Clone, Debug, Parser, PartialEq, Serialize, Deserialize)]
#[command(name = "folio-relay", version = "0.1.0")]
#[command(about = "Relay portfolio chat conversations to an LLM as Server-Sent Events")]
#[command(
    long_about = "Accepts a conversation on POST /functions/v1/chat, prepends the site's system
instruction and forwards it to an OpenAI-compatible chat completion API (OpenRouter by
default) with streaming enabled. The upstream event stream is relayed back to the caller
frame by frame and always ends with `data: [DONE]` or a single `{\"error\": ...}` frame.

Every option can be set on the command line, through its environment variable, or in a
TOML config file passed with --config-file. Command line values win over the file."
)]
pub struct Args {
    /// Interface to listen on.
    #[clap(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on.
    #[clap(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// The api key used for the upstream chat completion API.
    #[clap(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// The api base url.
    #[clap(long, env = "OPENROUTER_BASE_URL")]
    pub api_base_url: Option<String>,

    /// The LLM Model to use
    #[clap(short, long, env = "OPENROUTER_MODEL")]
    pub model: Option<String>,

    /// The maximum amount of tokens to return.
    #[clap(long)]
    pub max_tokens: Option<u32>,

    /// Temperature value.
    #[clap(long)]
    pub temperature: Option<f32>,

    /// Top-P value.
    #[clap(long)]
    pub top_p: Option<f32>,

    /// Shared secret callers must send as `Authorization: Bearer <secret>`. Unset or empty
    /// disables the check.
    #[clap(long, env = "API_SECRET_KEY", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// CORS allowed origin. `*` or a comma separated list of origins.
    #[clap(long, env = "ALLOWED_ORIGIN")]
    pub allowed_origin: Option<String>,

    /// Site url, sent upstream as `HTTP-Referer`.
    #[clap(long, env = "SITE_URL")]
    pub site_url: Option<String>,

    /// Site name, sent upstream as `X-Title`.
    #[clap(long, env = "SITE_NAME")]
    pub site_name: Option<String>,

    /// System instruction template. Replaces the built-in one.
    #[clap(long)]
    pub system: Option<String>,

    /// File holding the system instruction template.
    #[clap(long)]
    pub system_file: Option<String>,

    /// What to do with `system` turns sent by callers.
    #[clap(long, value_enum)]
    pub system_policy: Option<SystemPolicy>,

    /// Config file in TOML format.
    #[clap(long, env = "FOLIO_CONFIG")]
    #[serde(skip_serializing)]
    pub config_file: Option<String>,

    /// Prints the rendered system instruction and exits.
    #[clap(long, default_value = "false")]
    #[serde(skip_serializing, default)]
    pub print_system: bool,

    /// Prints the merged configuration, secrets excluded, and exits.
    #[clap(long, default_value = "false")]
    #[serde(skip_serializing, default)]
    pub print_config: bool,

    /// Template variables in JSON format (`owner`, `profile`, ...).
    #[clap(long, value_parser = parse_json)]
    pub vars: Option<Value>,
}
