//! `{{placeholder}}` rendering for scenario templates
//!
//! Placeholders resolve, in order, to:
//! - `rand`: a random suffix fixed for the whole scenario
//! - `env.NAME`: the environment variable `NAME`
//! - any variable defined in the scenario's `vars`

use std::collections::HashMap;

use crate::common::{Error, Result};

/// Variables available to templates of one scenario
#[derive(Debug, Clone)]
pub struct RenderContext {
    rand: String,
    vars: HashMap<String, String>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext {
    /// New context with a fresh random suffix
    pub fn new() -> Self {
        let rand = uuid::Uuid::new_v4().simple().to_string();
        Self::with_rand(&rand[..5])
    }

    /// New context with a fixed suffix
    pub fn with_rand(rand: &str) -> Self {
        Self {
            rand: rand.to_string(),
            vars: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if key == "rand" {
            return Some(self.rand.clone());
        }
        if let Some(var) = key.strip_prefix("env.") {
            return std::env::var(var).ok();
        }
        self.vars.get(key).cloned()
    }

    /// Substitute every placeholder; unknown names are an error
    pub fn render(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::Template(format!("unclosed placeholder in '{}'", template)))?;
            let key = after[..end].trim();
            let value = self
                .lookup(key)
                .ok_or_else(|| Error::Template(format!("unknown placeholder '{{{{{}}}}}'", key)))?;
            out.push_str(&value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }
}
