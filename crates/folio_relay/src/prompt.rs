//! The system instruction injected in front of every conversation.
//!
//! The instruction is a Tera template rendered once at startup. `owner` and `profile` are
//! always defined; anything passed with `--vars` or the config file's `[vars]` table is
//! merged on top.

use serde_json::{json, Value};

use crate::error::Error;
use crate::prelude::merge;

const SYSTEM_TEMPLATE: &str = "system";

pub const DEFAULT_SYSTEM_TEMPLATE: &str = r#"You are an AI assistant embedded in {{ owner }}'s personal portfolio website.
Your job is to answer questions about {{ owner }} in a friendly, professional, and concise way.
Never make up information. If you don't know something, say so politely.
{% if profile %}
====== ABOUT {{ owner | upper }} ======

{{ profile }}

====== END ======
{% endif %}"#;

fn default_vars() -> Value {
    json!({
        "owner": "the site owner",
        "profile": "",
    })
}

/// Renders `template` with the default variables overridden by `vars`.
pub fn render_system(template: &str, vars: &Value) -> Result<String, Error> {
    let mut value = default_vars();
    if vars.is_object() {
        merge(&mut value, vars.clone());
    }

    let context = tera::Context::from_value(value)?;

    let mut tera = tera::Tera::default();
    tera.add_raw_template(SYSTEM_TEMPLATE, template)?;

    Ok(tera.render(SYSTEM_TEMPLATE, &context)?.trim().to_string())
}
