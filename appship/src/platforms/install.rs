//! Shared config installation steps

use config_eval::{evaluate, parse_template, NormalizedConfig, Property, Schema, SchemaNode};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::{field_errors_to_string, ReleaseError};
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::platforms::ConfigOverrides;
use crate::storage::layout::ConfigInfo;

/// Full three-part dotted version at the start of a version name
const VERSION_NAME_PATTERN: &str = r"^(\d+)\.(\d+)\.(\d+)";

/// Names a platform's manifest uses for the default fields
#[derive(Debug, Clone, Copy)]
pub struct ManifestKeys {
    pub name: &'static str,
    pub version: &'static str,
    pub version_name: &'static str,
    pub bundle_id: &'static str,
}

impl ManifestKeys {
    fn fields(&self) -> [(&'static str, &'static str); 4] {
        [
            ("name", self.name),
            ("version", self.version),
            ("versionName", self.version_name),
            ("bundleId", self.bundle_id),
        ]
    }
}

/// Schema of the default fields every environment may set
pub fn default_fields_schema(keys: &ManifestKeys) -> Schema {
    keys.fields()
        .into_iter()
        .fold(Schema::new(), |schema, (field, key)| {
            schema.field(field, Property::string().optional().keyed(key))
        })
}

/// Overlay a template on the default fields.
///
/// Default fields the template redefines keep their manifest key unless the
/// template gives one.
pub fn merge_template(keys: &ManifestKeys, template: Schema) -> Schema {
    let mut schema = default_fields_schema(keys).merge(template);
    for (field, key) in keys.fields() {
        if let Some(SchemaNode::Leaf(property)) = schema.get(field) {
            if property.external_key().is_none() {
                let keyed = property.clone().keyed(key);
                schema.insert(field, SchemaNode::Leaf(keyed));
            }
        }
    }
    schema
}

/// Derive `"<major>.<minor>.<patch>"` from a dotted version name
pub fn derive_version(version_name: &str) -> Result<Option<String>, ReleaseError> {
    let re = Regex::new(VERSION_NAME_PATTERN).map_err(|e| ReleaseError::Internal(e.to_string()))?;
    let Some(caps) = re.captures(version_name.trim()) else {
        return Ok(None);
    };

    let mut parts = Vec::with_capacity(3);
    for index in 1..=3 {
        let part: u64 = caps[index]
            .parse()
            .map_err(|_| ReleaseError::InstallError(format!("Version part too large in '{}'", version_name)))?;
        parts.push(part.to_string());
    }
    Ok(Some(parts.join(".")))
}

/// Apply caller overrides, then fill a missing version from the version name
pub fn apply_overrides(raw: &mut Map<String, Value>, overrides: &ConfigOverrides) -> Result<(), ReleaseError> {
    if let Some(version) = &overrides.version {
        raw.insert("version".to_string(), Value::String(version.clone()));
    }

    let has_version = raw
        .get("version")
        .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
    if !has_version {
        if let Some(version) = raw
            .get("versionName")
            .and_then(Value::as_str)
            .map(derive_version)
            .transpose()?
            .flatten()
        {
            debug!("Derived version {} from version name", version);
            raw.insert("version".to_string(), Value::String(version));
        }
    }
    Ok(())
}

/// Read the environment's config and the project template, merge, and evaluate
pub async fn prepare_config(
    info: &ConfigInfo,
    overrides: &ConfigOverrides,
    keys: &ManifestKeys,
) -> Result<NormalizedConfig, ReleaseError> {
    let config_file = File::new(info.config_file());
    let raw: Value = config_file
        .read_json()
        .await
        .map_err(|e| ReleaseError::install(config_file.path().display(), e))?;
    let Value::Object(mut raw) = raw else {
        return Err(ReleaseError::install(
            config_file.path().display(),
            "expected a JSON object",
        ));
    };

    let template_file = File::new(&info.template_path);
    let template = if template_file.exists().await {
        let template: Value = template_file
            .read_json()
            .await
            .map_err(|e| ReleaseError::install(template_file.path().display(), e))?;
        parse_template(&template).map_err(|e| ReleaseError::install(template_file.path().display(), e))?
    } else {
        debug!("No config template at {}", template_file.path().display());
        Schema::new()
    };

    apply_overrides(&mut raw, overrides)?;
    let schema = merge_template(keys, template);
    evaluate(&schema, &Value::Object(raw), &info.config_name)
        .into_result()
        .map_err(|errors| {
            ReleaseError::install(config_file.path().display(), field_errors_to_string(&errors))
        })
}

/// Every keyed scalar value, in schema order
pub fn manifest_entries(config: &NormalizedConfig) -> Vec<(String, Value)> {
    config
        .leaves()
        .into_iter()
        .filter_map(|(_, leaf)| match &leaf.value {
            Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
                Some((leaf.key.clone(), value.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Copy the environment's resource bundle over the project's, if it has one
pub async fn copy_resources(info: &ConfigInfo) -> Result<(), ReleaseError> {
    let source = Dir::new(&info.config_resources_path);
    if !source.exists().await {
        return Ok(());
    }

    let target = Dir::new(&info.project_resources_path);
    let copied = source
        .copy_into(&target)
        .await
        .map_err(|e| ReleaseError::install(source.path().display(), e))?;
    info!(
        "Copied {} resource file(s) into {}",
        copied,
        target.path().display()
    );
    Ok(())
}
