//! The extension record: one installable unit of functionality.

use serde::{Deserialize, Serialize};

/// Container-name prefix shared by every supervised extension.
pub const CONTAINER_PREFIX: &str = "extension-";

/// One installable extension: a container image plus stored configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extension {
    /// Opaque catalog key (source registry/repository identity).
    pub identifier: String,
    /// Logical name; unique across the desired list and the basis of the
    /// container name.
    pub name: String,
    /// Image version selector.
    pub tag: String,
    /// Opaque engine-level configuration blob (ports, volumes, env). Merged
    /// into the create-container payload without interpretation.
    #[serde(default)]
    pub permissions: serde_json::Value,
    /// Whether reconciliation should keep this extension running.
    pub enabled: bool,
}

impl Extension {
    /// Image reference for this extension.
    pub fn fullname(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Container name: the shared prefix plus the logical name with every
    /// non-alphanumeric character stripped.
    pub fn container_name(&self) -> String {
        format!("{}{}", CONTAINER_PREFIX, sanitize(&self.name))
    }

    /// Engine create payload: the permissions blob with the image set.
    pub(crate) fn container_config(&self) -> serde_json::Value {
        let mut config = match &self.permissions {
            serde_json::Value::Object(map) => serde_json::Value::Object(map.clone()),
            // A non-object blob (including null) contributes nothing.
            _ => serde_json::json!({}),
        };
        config["Image"] = serde_json::Value::String(self.fullname());
        config
    }
}

/// Normalize an extension name into its container-name-prefix form, as used
/// for uninstall resolution.
pub fn expected_container_name(extension_name: &str) -> String {
    format!("{}{}", CONTAINER_PREFIX, sanitize(extension_name))
}

fn sanitize(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ext(name: &str, tag: &str) -> Extension {
        Extension {
            identifier: format!("acme/{name}"),
            name: name.to_string(),
            tag: tag.to_string(),
            permissions: serde_json::Value::Null,
            enabled: true,
        }
    }

    #[test]
    fn fullname_joins_name_and_tag() {
        assert_eq!(ext("sidecar", "v1").fullname(), "sidecar:v1");
    }

    #[test]
    fn container_name_strips_non_alphanumerics() {
        assert_eq!(
            ext("my-cool.ext_2", "v1").container_name(),
            "extension-mycoolext2"
        );
        assert_eq!(expected_container_name("my-cool.ext_2"), "extension-mycoolext2");
    }

    #[test]
    fn container_config_sets_image_over_permissions() {
        let mut e = ext("sidecar", "v2");
        e.permissions = serde_json::json!({
            "Env": ["A=1"],
            "Image": "should-be-overridden"
        });
        let config = e.container_config();
        assert_eq!(config["Image"], "sidecar:v2");
        assert_eq!(config["Env"][0], "A=1");
    }

    #[test]
    fn null_permissions_still_produce_an_image() {
        let config = ext("sidecar", "v1").container_config();
        assert_eq!(config, serde_json::json!({"Image": "sidecar:v1"}));
    }
}
