//! Evaluation integration tests

use config_eval::{evaluate, parse_template, Property, Schema};
use serde_json::json;

fn app_schema() -> Schema {
    Schema::new()
        .field("name", Property::string().optional().keyed("CFBundleDisplayName"))
        .field("versionName", Property::string().regex(r"^\d+\.\d+\.\d+$"))
        .field("debug", Property::boolean().default(false))
        .group(
            "api",
            Schema::new()
                .field("url", Property::string().named("API endpoint"))
                .field("timeout", Property::number().default(30)),
        )
}

#[test]
fn test_evaluation_is_idempotent() {
    let raw = json!({
        "versionName": "1.4.0",
        "api": { "url": "https://staging.example.com" }
    });

    let first = evaluate(&app_schema(), &raw, "");
    assert!(first.is_valid);

    let second = evaluate(&app_schema(), &first.normalized.to_value(), "");
    assert!(second.is_valid);
    assert!(second.errors.is_empty());
    assert_eq!(first.normalized, second.normalized);
}

#[test]
fn test_errors_from_all_levels_are_merged() {
    let raw = json!({ "versionName": "one", "api": { "timeout": "slow" } });

    let result = evaluate(&app_schema(), &raw, "staging");
    assert!(!result.is_valid);

    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["staging.versionName", "staging.api.url", "staging.api.timeout"]
    );
}

#[test]
fn test_template_schema_evaluates_like_built_schema() {
    let template = json!({
        "versionName": { "type": "string", "regex": "^\\d+\\.\\d+\\.\\d+$" },
        "api": { "url": { "type": "string", "name": "API endpoint" } }
    });
    let schema = parse_template(&template).unwrap();

    let result = evaluate(&schema, &json!({ "versionName": "2.0.1", "api": { "url": "x" } }), "");
    assert!(result.is_valid);

    let leaves: Vec<String> = result.normalized.leaves().into_iter().map(|(p, _)| p).collect();
    assert!(leaves.contains(&"api.url".to_string()));
    assert_eq!(
        result.normalized.value("api.url").and_then(|v| v.name.clone()),
        Some("API endpoint".to_string())
    );
}

#[test]
fn test_into_result() {
    let schema = Schema::new().field("required", Property::string());

    let errors = evaluate(&schema, &json!({}), "").into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "required: field is required");
}

#[test]
fn test_expression_template_end_to_end() {
    let template = json!({
        "app": {
            "name": "string.optional().named('Application Name')",
            "version": "string.regex(/(\\d+)/).optional().keyed('CFBundleVersion').named('Application Version')",
            "bundleId": "string.optional().named('Application Bundle Identifier')"
        },
        "config": {
            "apiUrl": "string.regex(/^https:\\/\\//).keyed('ApiUrl')",
            "resourcesPath": "string.default('Resources')"
        }
    });
    let schema = parse_template(&template).unwrap();

    let raw = json!({
        "app": { "name": "Example", "version": "42" },
        "config": { "apiUrl": "https://api.example.com" }
    });
    let result = evaluate(&schema, &raw, "staging");
    assert!(result.is_valid, "{:?}", result.errors);

    let version = result.normalized.value("app.version").unwrap();
    assert_eq!(version.key, "CFBundleVersion");
    assert_eq!(version.name.as_deref(), Some("Application Version"));
    assert_eq!(result.normalized.str("config.resourcesPath"), Some("Resources"));
    assert_eq!(result.normalized.value("app.bundleId").unwrap().value, None);

    let raw = json!({ "app": { "version": "beta" }, "config": { "apiUrl": "http://insecure" } });
    let paths: Vec<String> = evaluate(&schema, &raw, "staging")
        .errors
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(paths, vec!["staging.app.version", "staging.config.apiUrl"]);
}
