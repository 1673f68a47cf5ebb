use serde::{Deserialize, Serialize};
use serde_json::Value;

use folio_stream::openai::{self, Auth, Message, MessageBody};

use crate::args::Args;
use crate::conversation::SystemPolicy;
use crate::error::Error;
use crate::prompt::{render_system, DEFAULT_SYSTEM_TEMPLATE};

/// Contents of the optional TOML config file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    // Server
    #[serde(default = "default_host")]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: Option<u16>,
    pub secret: Option<String>,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: Option<String>,

    // Api
    pub key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: Option<String>,
    pub site_url: Option<String>,
    pub site_name: Option<String>,

    // Model
    #[serde(default = "default_model")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,

    // System instruction
    pub system: Option<String>,
    pub system_file: Option<String>,
    #[serde(default = "default_system_policy")]
    pub system_policy: Option<SystemPolicy>,
    pub vars: Option<Value>,
}

impl Config {
    /// A config with every default filled in, as if read from an empty file.
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: default_allowed_origin(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_policy: default_system_policy(),
            ..Default::default()
        }
    }
}

fn default_host() -> Option<String> {
    Some("0.0.0.0".to_string())
}

fn default_port() -> Option<u16> {
    Some(3001)
}

fn default_allowed_origin() -> Option<String> {
    Some("*".to_string())
}

fn default_base_url() -> Option<String> {
    Some(openai::DEFAULT_URL.to_string())
}

fn default_model() -> Option<String> {
    Some(openai::DEFAULT_MODEL.to_string())
}

fn default_max_tokens() -> Option<u32> {
    Some(1024)
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_system_policy() -> Option<SystemPolicy> {
    Some(SystemPolicy::Strip)
}

/// Settings the running relay works from, resolved once at startup.
#[derive(Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub secret: Option<String>,
    pub allowed_origin: String,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
    /// The rendered system instruction.
    pub system: String,
    pub system_policy: SystemPolicy,
}

impl RelayConfig {
    /// Resolves merged arguments. Fails without an api key, or when the system template
    /// can't be read or rendered.
    pub fn from_args(args: &Args) -> Result<Self, Error> {
        let api_key = args
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingApiKey)?;

        let template = match (&args.system, &args.system_file) {
            (Some(system), _) => system.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => DEFAULT_SYSTEM_TEMPLATE.to_string(),
        };

        let vars = args.vars.clone().unwrap_or(Value::Null);

        Ok(Self {
            host: args.host.clone().or_else(default_host).unwrap_or_default(),
            port: args.port.or_else(default_port).unwrap_or_default(),
            api_key,
            api_base_url: args
                .api_base_url
                .clone()
                .or_else(default_base_url)
                .unwrap_or_default(),
            model: args.model.clone().or_else(default_model).unwrap_or_default(),
            max_tokens: args.max_tokens,
            temperature: args.temperature,
            top_p: args.top_p,
            secret: args.secret.clone().filter(|secret| !secret.is_empty()),
            allowed_origin: args
                .allowed_origin
                .clone()
                .or_else(default_allowed_origin)
                .unwrap_or_default(),
            site_url: args.site_url.clone(),
            site_name: args.site_name.clone(),
            system: render_system(&template, &vars)?,
            system_policy: args
                .system_policy
                .or_else(default_system_policy)
                .unwrap_or_default(),
        })
    }

    /// Upstream client carrying the api key and attribution headers.
    pub fn upstream(&self) -> openai::Client {
        openai::Client::new(Auth::new(self.api_key.clone()), self.api_base_url.clone())
            .with_referer(self.site_url.clone())
            .with_title(self.site_name.clone())
    }

    /// Streaming request body for a prepared turn list.
    pub fn message_body(&self, messages: Vec<Message>) -> MessageBody {
        let mut body = MessageBody::new(&self.model, messages);
        body.max_tokens = self.max_tokens;
        body.temperature = self.temperature;
        body.top_p = self.top_p;
        body
    }
}
